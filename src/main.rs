// SPDX-License-Identifier: Apache-2.0

//! Tablegate stdio server
//!
//! Reads one JSON request per line on stdin, `{"id", "tool", "arguments"}`,
//! runs requests concurrently and writes one JSON response per line on
//! stdout. Logs go to files; stdout carries responses only.

use std::process::ExitCode;
use std::sync::Arc;

use mimalloc::MiMalloc;
use serde::Deserialize;
use serde_json::Value;
use tablegate::commands::{dispatch, CallContext, ToolResponse};
use tablegate::config::AdminConfig;
use tablegate::observability::init_tracing;
use tablegate::AppState;
use tablegate_core::AdminError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const RESPONSE_QUEUE: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    tool: String,
    #[serde(default)]
    arguments: Value,
    #[serde(flatten)]
    context: CallContext,
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AdminConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tablegate: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = init_tracing(config.log_dir.as_deref(), config.log_filter.as_deref());

    let state = match AppState::new(config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!(error = %e, "startup failed");
            eprintln!("tablegate: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("tablegate ready on stdio");

    let (tx, rx) = mpsc::channel::<String>(RESPONSE_QUEUE);
    let writer = tokio::spawn(write_responses(rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let state = state.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            let response = handle_line(&state, &line).await;
            match serde_json::to_string(&response) {
                Ok(encoded) => {
                    if tx.send(encoded).await.is_err() {
                        warn!("response writer closed");
                    }
                }
                Err(e) => error!(error = %e, "failed to encode response"),
            }
        });

        while let Some(Err(e)) = in_flight.try_join_next() {
            error!(error = %e, "request task failed");
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "request task failed");
        }
    }
    drop(tx);
    if let Err(e) = writer.await {
        error!(error = %e, "response writer failed");
    }

    state.shutdown().await;
    ExitCode::SUCCESS
}

async fn handle_line(state: &AppState, line: &str) -> ToolResponse {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => dispatch(state, &request.tool, request.arguments, &request.context)
            .await
            .with_id(request.id),
        Err(e) => {
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("id").cloned());
            ToolResponse::err(&AdminError::validation(format!("malformed request: {}", e))).with_id(id)
        }
    }
}

async fn write_responses(mut rx: mpsc::Receiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            error!(error = %e, "failed to write response");
            break;
        }
        if let Err(e) = stdout.flush().await {
            error!(error = %e, "failed to flush stdout");
            break;
        }
    }
}
