//! Inbound session dispatch
//!
//! Each stream accepted from the reverse listener carries one
//! newline-delimited JSON execution request. The handler resolves the
//! target account, builds a privilege-dropped execution context and streams
//! the process output back, finishing with a JSON status line. Sessions run
//! concurrently and share no state; account lookups are one-shot per
//! request.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::command::{build_execution_context, can_drop_privileges};
use crate::osauth;
use crate::tunnel::{ReverseListener, TunnelStream};

fn default_term() -> String {
    "xterm".to_string()
}

/// One remote execution request
#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    /// Local account to run as
    pub user: String,
    /// Terminal type exported as TERM
    #[serde(default = "default_term")]
    pub term: String,
    /// Binary and arguments
    pub command: Vec<String>,
}

/// Final status line written after the process output
#[derive(Debug, Serialize)]
struct ExecResult {
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Accept and dispatch sessions until the listener fails or shutdown is
/// requested.
pub async fn serve(
    mut listener: Box<dyn ReverseListener>,
    host_label: String,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("session loop shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted.context("reverse listener failed")?,
        };

        let host_label = host_label.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_session(stream, &host_label).await {
                tracing::error!("session failed: {:#}", e);
            }
        });
    }
}

/// Run one session on its stream
async fn handle_session(stream: Box<dyn TunnelStream>, host_label: &str) -> Result<()> {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("failed to read session request")?;

    let request: ExecRequest =
        serde_json::from_str(line.trim()).context("invalid session request")?;

    if request.command.is_empty() {
        let status = serde_json::to_string(&ExecResult {
            exit_code: None,
            error: Some("empty command".to_string()),
        })?;
        writer.write_all(status.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        return Ok(());
    }

    tracing::info!(user = %request.user, command = ?request.command, "starting session");

    let account = osauth::lookup(&request.user);
    if !account.is_known() {
        tracing::warn!(user = %request.user, "account unknown, using process defaults");
    }
    let record = account.record();

    let groups = osauth::supplementary_groups(&record.username);
    let context = build_execution_context(
        record,
        groups,
        &record.shell,
        &request.term,
        host_label,
        &request.command,
        can_drop_privileges(),
    );

    let output = context
        .into_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let status = match output {
        Ok(output) => {
            writer.write_all(&output.stdout).await?;
            writer.write_all(&output.stderr).await?;
            ExecResult {
                exit_code: output.status.code(),
                error: None,
            }
        }
        Err(e) => ExecResult {
            exit_code: None,
            error: Some(e.to_string()),
        },
    };

    writer
        .write_all(serde_json::to_string(&status)?.as_bytes())
        .await?;
    writer.write_all(b"\n").await?;
    writer.shutdown().await?;

    Ok(())
}
