//! Accord binary: reads one JSON command per line on stdin and writes one
//! JSON response per line on stdout. Logs go to stderr.

use std::io::{self, BufRead, Write};

use accord_engine::{handle_line, load_config, TrustEngine};
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("ACCORD_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("accord.toml"));

    let config = load_config(selected_config_path)
        .expect("failed to load configuration; accord cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let engine = TrustEngine::open(config)
        .expect("failed to open trust engine; check database.path in config");

    tracing::info!(
        strategies = ?engine.config().policy.strategies,
        "accord ready, reading commands from stdin"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut handled = 0u64;
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(&engine, &line);
        handled += 1;
        if writeln!(stdout, "{response}").and_then(|()| stdout.flush()).is_err() {
            tracing::warn!("stdout closed, stopping");
            break;
        }
    }

    tracing::info!(commands = handled, "accord shut down");
}
