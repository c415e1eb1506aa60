//! Shell-script stand-ins for engine executables.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script with `body` into `dir`.
pub fn fake_engine(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-engine");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
