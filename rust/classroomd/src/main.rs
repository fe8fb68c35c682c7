mod actor;
mod category;
mod config;
mod dashboard;
mod db;
mod error;
mod grid;
mod idempotency;
mod ipc;
mod ledger;
mod records;
mod seating;

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, LogFormat};

fn init_logging(format: LogFormat) {
    // stdout carries the protocol; logs must stay on stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "classroomd=info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_logging(config.log_format);

    let mut state = ipc::AppState::new(config.busy_timeout());
    if let Some(path) = &config.workspace {
        let conn = db::open_db(path, config.busy_timeout())
            .with_context(|| format!("cannot open workspace {}", path.to_string_lossy()))?;
        state.workspace = Some(path.clone());
        state.db = Some(conn);
        info!(workspace = %path.to_string_lossy(), "workspace opened");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "classroomd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(stdout, "{}", resp);
        let _ = stdout.flush();
    }
    info!("classroomd shutting down");
    Ok(())
}
