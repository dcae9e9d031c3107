//! Logging initialization for Velour binaries.
//!
//! Thin wrapper over the observability crate. Structured JSONL goes to
//! `~/.velour/logs/velour.jsonl`, human-readable output to stderr.

use crate::Paths;
use observability::LogConfig;

/// Initialize logging for a Velour binary.
///
/// * `service_name` - Attached to the startup record (e.g. "velour-cli")
/// * `level` - Default log level, overridable with `RUST_LOG`
/// * `paths` - Where the JSONL file lives; `None` disables the file sink
///
/// ```ignore
/// init_logging("velour-cli", "info", Some(&paths));
/// tracing::info!("started");
/// ```
pub fn init_logging(service_name: &str, level: &str, paths: Option<&Paths>) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).to_string().to_lowercase(),
        log_path: paths.map(Paths::log_file),
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_all_variants() {
        assert_eq!(parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("info"), tracing::Level::INFO);
        assert_eq!(parse_level("warning"), tracing::Level::WARN);
        assert_eq!(parse_level("ERROR"), tracing::Level::ERROR);
    }

    #[test]
    fn parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level(""), tracing::Level::INFO);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }

    #[test]
    fn init_logging_is_safe_to_repeat() {
        init_logging("velour-test", "debug", None);
        init_logging("velour-test", "nonsense", None);
        tracing::info!("still alive");
    }
}
