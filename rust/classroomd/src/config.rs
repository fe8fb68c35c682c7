use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Seating and behaviour sidecar. Speaks newline-delimited JSON on
/// stdin/stdout; logs go to stderr.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about)]
pub struct Config {
    /// Workspace directory to open at startup instead of waiting for
    /// `workspace.select`.
    #[arg(long, env = "CLASSROOMD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// How long a write waits for another process holding the database lock.
    #[arg(long, env = "CLASSROOMD_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    #[arg(long, env = "CLASSROOMD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::try_parse_from(["classroomd"]).expect("parse");
        assert_eq!(cfg.workspace, None);
        assert_eq!(cfg.busy_timeout(), Duration::from_millis(5000));
        assert_eq!(cfg.log_format, LogFormat::Text);
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = Config::try_parse_from([
            "classroomd",
            "--workspace",
            "/tmp/ws",
            "--busy-timeout-ms",
            "250",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.busy_timeout_ms, 250);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }
}
