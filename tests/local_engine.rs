//! Local engine transport against an in-process fake engine.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use photon::engine::{EngineConfig, EngineState, LocalEngine};
use photon::prelude::*;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

#[derive(Clone, Default)]
struct FakeEngine {
    bodies: Arc<Mutex<Vec<JsonValue>>>,
    status: Arc<Mutex<String>>,
}

impl FakeEngine {
    fn ready() -> Self {
        let fake = Self::default();
        *fake.status.lock() = "ok".into();
        fake
    }

    fn queries(&self) -> Vec<String> {
        self.bodies
            .lock()
            .iter()
            .filter_map(|b| b["query"].as_str().map(str::to_string))
            .collect()
    }
}

fn answer(query: &str) -> JsonValue {
    if query.contains("findUniqueUser") && query.contains("\"u1\"") {
        json!({"data": {"result": {"id": "u1", "email": "a@example.com"}}})
    } else if query.contains("findUniqueUser") {
        json!({"data": {"result": null}})
    } else if query.contains("deleteOneUser") {
        json!({"errors": [{
            "error": "Error occurred during query execution",
            "user_facing_error": {
                "is_panic": false,
                "message": "An operation failed because it depends on one or more records that were required but not found. Record to delete does not exist.",
                "error_code": "P2025"
            }
        }]})
    } else if query.contains("createOneUser") {
        json!({"errors": [{
            "error": "Unique constraint failed",
            "user_facing_error": {
                "is_panic": false,
                "message": "Unique constraint failed on the fields: (`email`)",
                "meta": {"target": ["email"]},
                "error_code": "P2002"
            }
        }]})
    } else if query.contains("executeRaw") {
        json!({"data": {"result": 3}})
    } else if query.contains("queryRaw") {
        json!({"data": {"result": {
            "columns": ["id", "views"],
            "types": ["string", "bigint"],
            "rows": [["p1", "12"], ["p2", "40"]]
        }}})
    } else {
        json!({"errors": [{"error": format!("unexpected query: {}", query)}]})
    }
}

async fn status(State(fake): State<FakeEngine>) -> Json<JsonValue> {
    Json(json!({"status": fake.status.lock().clone()}))
}

async fn graphql(
    State(fake): State<FakeEngine>,
    Json(body): Json<JsonValue>,
) -> ([(&'static str, &'static str); 1], Json<JsonValue>) {
    fake.bodies.lock().push(body.clone());
    let response = match body["batch"].as_array() {
        Some(batch) => {
            let results: Vec<JsonValue> = batch
                .iter()
                .map(|r| answer(r["query"].as_str().unwrap_or_default()))
                .collect();
            json!({"batchResult": results})
        }
        None => answer(body["query"].as_str().unwrap_or_default()),
    };
    ([("x-elapsed", "850")], Json(response))
}

async fn serve(fake: FakeEngine) -> String {
    serve_on(fake, 0).await
}

async fn serve_on(fake: FakeEngine, port: u16) -> String {
    let app = Router::new()
        .route("/status", get(status))
        .route("/", post(graphql))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(url: &str) -> EngineConfig {
    EngineConfig::builder("model User { id String @id }")
        .engine_url(url)
        .health_check(20, Duration::from_millis(10))
        .build()
        .unwrap()
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: String,
    email: String,
}

fn find_user(client: &PhotonClient, id: &str) -> Query {
    client
        .query("findUnique", "User")
        .arg(Field::object("where", vec![Field::value("id", id)]))
        .select(Selection::scalars(["id", "email"]))
}

#[tokio::test]
async fn test_query_round_trip() {
    let fake = FakeEngine::ready();
    let url = serve(fake.clone()).await;
    let client = PhotonClient::local(config(&url)).unwrap();
    client.connect().await.unwrap();

    let user: User = find_user(&client, "u1").exec().await.unwrap();
    assert_eq!(user, User { id: "u1".into(), email: "a@example.com".into() });

    let missing: Option<User> = find_user(&client, "nobody").exec().await.unwrap();
    assert_eq!(missing, None);

    assert_eq!(
        fake.queries()[0],
        r#"query findUniqueUser{result: findUniqueUser(where:{id:"u1"}) {id email}}"#
    );
    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_engine_errors_are_classified() {
    let url = serve(FakeEngine::ready()).await;
    let client = PhotonClient::local(config(&url)).unwrap();
    client.connect().await.unwrap();

    let err = client
        .mutation("deleteOne", "User")
        .arg(Field::object("where", vec![Field::value("id", "gone")]))
        .select(Selection::scalars(["id"]))
        .exec::<JsonValue>()
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = client
        .mutation("createOne", "User")
        .arg(Field::object("data", vec![Field::value("email", "a@example.com")]))
        .select(Selection::scalars(["id"]))
        .exec::<JsonValue>()
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(err.engine_code(), Some("P2002"));
}

#[tokio::test]
async fn test_raw_queries() {
    let fake = FakeEngine::ready();
    let url = serve(fake.clone()).await;
    let client = PhotonClient::local(config(&url)).unwrap();
    client.connect().await.unwrap();

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: String,
        views: BigInt,
    }

    let rows: Vec<Row> = client
        .raw()
        .query_raw("SELECT id, views FROM posts WHERE views > $1", vec![Value::from(10)])
        .exec()
        .await
        .unwrap();
    assert_eq!(
        rows,
        vec![
            Row { id: "p1".into(), views: BigInt(12) },
            Row { id: "p2".into(), views: BigInt(40) },
        ]
    );

    let affected = client
        .raw()
        .execute_raw("UPDATE posts SET views = 0", vec![])
        .exec()
        .await
        .unwrap();
    assert_eq!(affected, BatchResult { count: 3 });

    let sent = fake.queries();
    assert!(sent[0].starts_with("mutation queryRaw{result: queryRaw(query:"));
    assert!(sent[1].contains("executeRaw"));
}

#[tokio::test]
async fn test_transaction_batch() {
    let fake = FakeEngine::ready();
    let url = serve(fake.clone()).await;
    let client = PhotonClient::local(config(&url)).unwrap();
    client.connect().await.unwrap();

    let first = find_user(&client, "u1").tx::<User>();
    let second = find_user(&client, "nobody").tx::<Option<User>>();
    client.transaction().add(&first).add(&second).exec().await.unwrap();

    assert_eq!(first.result().unwrap().id, "u1");
    assert_eq!(second.result().unwrap(), None);

    let bodies = fake.bodies.lock();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["transaction"], json!(true));
    assert_eq!(bodies[0]["batch"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_connection_states() {
    let fake = FakeEngine::ready();
    let url = serve(fake.clone()).await;
    let engine = Arc::new(LocalEngine::new(config(&url)).unwrap());
    let client = PhotonClient::with_engine(engine.clone());

    let err = find_user(&client, "u1").exec::<User>().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotConnected);
    assert_eq!(client.disconnect().await.unwrap_err().code, ErrorCode::NotConnected);

    client.connect().await.unwrap();
    client.connect().await.unwrap();
    assert_eq!(engine.state(), EngineState::Connected);
    assert_eq!(engine.base_url().as_deref(), Some(url.as_str()));

    client.disconnect().await.unwrap();
    assert_eq!(engine.state(), EngineState::Disconnected);

    let err = find_user(&client, "u1").exec::<User>().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AlreadyDisconnected);
    assert_eq!(client.disconnect().await.unwrap_err().code, ErrorCode::AlreadyDisconnected);

    // state checks never reach the engine
    assert!(fake.bodies.lock().is_empty());

    client.connect().await.unwrap();
    assert_eq!(engine.state(), EngineState::Connected);
}

#[tokio::test]
async fn test_health_check_gives_up() {
    let fake = FakeEngine::default();
    *fake.status.lock() = "starting".into();
    let url = serve(fake).await;

    let engine = LocalEngine::new(
        EngineConfig::builder("model A { id Int @id }")
            .engine_url(&url)
            .health_check(3, Duration::from_millis(5))
            .build()
            .unwrap(),
    )
    .unwrap();

    let err: QueryError = engine.connect().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::EngineStartup);
    assert!(err.message.contains("3 attempts"));
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn test_caller_deadline() {
    let url = serve(FakeEngine::ready()).await;
    let client = PhotonClient::local(config(&url)).unwrap();
    client.connect().await.unwrap();

    let user: User = find_user(&client, "u1")
        .exec_timeout(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(user.id, "u1");

    let err = find_user(&client, "u1")
        .exec_timeout::<User>(Duration::ZERO)
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_engine() {
    let fake = FakeEngine::ready();
    let url = serve(fake.clone()).await;
    let client = PhotonClient::local(config(&url)).unwrap();
    client.connect().await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let id = if i % 2 == 0 { "u1" } else { "nobody" };
                find_user(&client, id).exec::<Option<User>>().await
            })
        })
        .collect();

    let mut found = 0;
    for task in tasks {
        if task.await.unwrap().unwrap().is_some() {
            found += 1;
        }
    }
    assert_eq!(found, 8);
    assert_eq!(fake.bodies.lock().len(), 16);

    client.disconnect().await.unwrap();
}

#[cfg(unix)]
mod spawned {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("query-engine");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn spawn_config(binary: PathBuf) -> EngineConfig {
        EngineConfig::builder("model A { id Int @id }")
            .binary(binary)
            .health_check(100, Duration::from_millis(20))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_startup_error_from_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(
            dir.path(),
            r#"echo '{"is_panic":false,"message":"Can not reach database server"}' >&2
sleep 5"#,
        );

        let engine = LocalEngine::new(spawn_config(binary)).unwrap();
        let err: QueryError = engine.connect().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EngineStartup);
        assert!(err.message.contains("Can not reach database server"));
        assert_eq!(engine.last_engine_error().as_deref(), Some("Can not reach database server"));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_engine_exit_during_startup() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "exit 1");

        let engine = LocalEngine::new(spawn_config(binary)).unwrap();
        let err: QueryError = engine.connect().await.unwrap_err();
        assert!(err.message.contains("exited during startup"));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    /// Waits for the engine script to report its port, then serves on it.
    async fn serve_when_started(fake: FakeEngine, port_file: PathBuf) {
        for _ in 0..200 {
            if let Ok(port) = std::fs::read_to_string(&port_file) {
                if let Ok(port) = port.trim().parse::<u16>() {
                    serve_on(fake, port).await;
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine script never started");
    }

    #[tokio::test]
    async fn test_spawned_engine_stops_on_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let port_file = dir.path().join("port");
        let binary = script(
            dir.path(),
            &format!(
                "trap 'echo interrupted > {}; exit 0' INT\necho \"$2\" > {}\nwhile true; do sleep 0.05; done",
                dir.path().join("signal").display(),
                port_file.display()
            ),
        );

        let fake = FakeEngine::ready();
        let engine = Arc::new(LocalEngine::new(spawn_config(binary)).unwrap());
        let (connected, ()) = tokio::join!(engine.connect(), serve_when_started(fake.clone(), port_file));
        connected.unwrap();
        assert_eq!(engine.state(), EngineState::Connected);

        let client = PhotonClient::with_engine(engine.clone());
        let user: User = find_user(&client, "u1").exec().await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(fake.queries().len(), 1);

        client.disconnect().await.unwrap();
        assert_eq!(engine.state(), EngineState::Disconnected);
        assert_eq!(engine.base_url(), None);
        let signal = std::fs::read_to_string(dir.path().join("signal")).unwrap();
        assert_eq!(signal.trim(), "interrupted");
    }

    #[tokio::test]
    async fn test_missing_override() {
        let engine = LocalEngine::new(spawn_config(PathBuf::from("/does/not/exist"))).unwrap();
        let err: QueryError = engine.connect().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BinaryNotFound);
    }
}
