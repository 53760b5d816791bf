// SPDX-License-Identifier: Apache-2.0

//! External dump/restore tool invocation
//!
//! `pg_dump` output streams into the backup file (optionally through gzip)
//! and backup files stream into `psql` stdin. Credentials reach the child
//! through its environment only.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::observability::Sensitive;

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, Sensitive<String>)>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: Vec<(String, Sensitive<String>)>) -> Self {
        self.env.extend(env);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: Option<i32>,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Last non-empty stderr line, for error messages.
    pub fn last_error_line(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `spec`, copying its stdout into `sink`.
    async fn run_to_writer(
        &self,
        spec: &ProcessSpec,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> std::io::Result<ProcessOutput>;

    /// Runs `spec`, feeding `source` to its stdin.
    async fn run_from_reader(
        &self,
        spec: &ProcessSpec,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> std::io::Result<ProcessOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    fn command(spec: &ProcessSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value.expose());
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

async fn read_stderr(stderr: Option<tokio::process::ChildStderr>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut stderr) = stderr {
        stderr.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn collect_stderr(task: JoinHandle<std::io::Result<String>>) -> std::io::Result<String> {
    task.await.map_err(std::io::Error::other)?
}

/// Kills a child whose pipe could not be serviced and reaps it.
async fn abandon(child: &mut Child, stderr: JoinHandle<std::io::Result<String>>) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "child already exited");
    }
    let _ = child.wait().await;
    let _ = collect_stderr(stderr).await;
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run_to_writer(
        &self,
        spec: &ProcessSpec,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> std::io::Result<ProcessOutput> {
        debug!(program = %spec.program, args = ?spec.args, "spawning");
        let mut child = Self::command(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout not captured"))?;
        let stderr = tokio::spawn(read_stderr(child.stderr.take()));

        if let Err(e) = tokio::io::copy(&mut stdout, sink).await {
            drop(stdout);
            abandon(&mut child, stderr).await;
            return Err(e);
        }
        let status = child.wait().await?;

        Ok(ProcessOutput {
            status: status.code(),
            stderr: collect_stderr(stderr).await?,
        })
    }

    async fn run_from_reader(
        &self,
        spec: &ProcessSpec,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> std::io::Result<ProcessOutput> {
        debug!(program = %spec.program, args = ?spec.args, "spawning");
        let mut child = Self::command(spec)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin not captured"))?;
        let stderr = tokio::spawn(read_stderr(child.stderr.take()));

        if let Err(e) = tokio::io::copy(source, &mut stdin).await {
            // A child that exits early closes its stdin; report its status instead.
            if let Some(status) = child.try_wait()? {
                drop(stdin);
                return Ok(ProcessOutput {
                    status: status.code(),
                    stderr: collect_stderr(stderr).await?,
                });
            }
            // Killed before stdin reaches EOF, so a partial stream is never committed.
            abandon(&mut child, stderr).await;
            drop(stdin);
            return Err(e);
        }
        drop(stdin);
        let status = child.wait().await?;

        Ok(ProcessOutput {
            status: status.code(),
            stderr: collect_stderr(stderr).await?,
        })
    }
}
