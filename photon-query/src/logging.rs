//! Logging setup for Photon.
//!
//! Photon logs through `tracing`. Output is off unless requested:
//!
//! - `PHOTON_DEBUG=true|1|yes` - enable debug logging, including `[timing]` diagnostics
//! - `PHOTON_LOG_LEVEL=trace|debug|info|warn|error` - set a specific level
//! - `PHOTON_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! The variables are read once per process; changing them later has no effect.
//!
//! ```rust,no_run
//! use photon_query::logging;
//!
//! // Initialize logging (call once at startup)
//! logging::init();
//! ```

use std::env;
use std::sync::{Once, OnceLock};

static INIT: Once = Once::new();
static SETTINGS: OnceLock<LogSettings> = OnceLock::new();

/// Logging settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Debug toggle.
    pub debug: bool,
    /// Explicit level, if one was requested.
    pub level: Option<&'static str>,
    /// Output format.
    pub format: &'static str,
}

impl LogSettings {
    /// Resolve settings from raw variable values.
    pub fn from_values(debug: Option<&str>, level: Option<&str>, format: Option<&str>) -> Self {
        Self {
            debug: parse_debug_flag(debug),
            level: level.and_then(parse_level),
            format: parse_format(format),
        }
    }

    /// Effective level: the explicit one, `debug` when debugging, else `warn`.
    pub fn effective_level(&self) -> &'static str {
        match (self.level, self.debug) {
            (Some(level), _) => level,
            (None, true) => "debug",
            (None, false) => "warn",
        }
    }

    /// Whether any output was requested.
    pub fn is_requested(&self) -> bool {
        self.debug || self.level.is_some()
    }
}

/// Parse a debug toggle value.
pub fn parse_debug_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

fn parse_level(value: &str) -> Option<&'static str> {
    match value.to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

fn parse_format(value: Option<&str>) -> &'static str {
    match value.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}

/// Settings read from the process environment on first use.
pub fn settings() -> &'static LogSettings {
    SETTINGS.get_or_init(|| {
        LogSettings::from_values(
            env::var("PHOTON_DEBUG").ok().as_deref(),
            env::var("PHOTON_LOG_LEVEL").ok().as_deref(),
            env::var("PHOTON_LOG_FORMAT").ok().as_deref(),
        )
    })
}

/// Check if debug logging is enabled via `PHOTON_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    settings().debug
}

/// Initialize the Photon logging system.
///
/// Subsequent calls are no-ops. Without the `tracing-subscriber` feature this
/// does nothing and the host application installs its own subscriber.
pub fn init() {
    INIT.call_once(|| {
        let settings = settings();
        if !settings.is_requested() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = settings.effective_level();
            let filter = EnvFilter::try_new(format!(
                "photon={},photon_query={},photon_engine={},photon_migrate={}",
                level, level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            match settings.format {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }

            tracing::info!(level = level, format = settings.format, "Photon logging initialized");
        }
    });
}

/// Macro for conditional debug logging.
///
/// Only logs if `PHOTON_DEBUG` is enabled.
#[macro_export]
macro_rules! photon_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_values() {
        assert!(parse_debug_flag(Some("true")));
        assert!(parse_debug_flag(Some("YES")));
        assert!(parse_debug_flag(Some("1")));
        assert!(!parse_debug_flag(Some("0")));
        assert!(!parse_debug_flag(None));
    }

    #[test]
    fn test_level_defaults() {
        assert_eq!(LogSettings::from_values(None, None, None).effective_level(), "warn");
        assert_eq!(LogSettings::from_values(Some("1"), None, None).effective_level(), "debug");
        assert_eq!(LogSettings::from_values(Some("1"), Some("TRACE"), None).effective_level(), "trace");
        assert_eq!(LogSettings::from_values(None, Some("bogus"), None).effective_level(), "warn");
    }

    #[test]
    fn test_format() {
        assert_eq!(LogSettings::from_values(None, None, None).format, "json");
        assert_eq!(LogSettings::from_values(None, None, Some("Pretty")).format, "pretty");
        assert!(!LogSettings::from_values(None, None, Some("compact")).is_requested());
    }
}
