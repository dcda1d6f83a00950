//! Map tile server: one JSON-RPC request per stdin line, one response per
//! stdout line.

use anyhow::Context;
use mapcore::logging::{init_logging, DEFAULT_LOG_DIR, DEFAULT_LOG_FILE};
use mapcore::server::{handle_line, ServerState};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let _guard = init_logging(Path::new(DEFAULT_LOG_DIR), DEFAULT_LOG_FILE).context("failed to set up logging")?;
    info!("Starting map server");

    let mut state = ServerState::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "Error reading stdin");
                continue;
            }
        };

        let Some(response) = handle_line(&mut state, &line) else {
            continue;
        };
        match serde_json::to_string(&response) {
            Ok(json) => {
                writeln!(stdout, "{}", json).context("failed to write response")?;
                stdout.flush().context("failed to flush stdout")?;
            }
            Err(e) => error!(error = %e, "Failed to serialize response"),
        }
    }

    if let Some(context) = state.context.take() {
        context.cleanup();
    }
    info!("stdin closed, shutting down");
    Ok(())
}
