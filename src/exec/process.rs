// src/exec/process.rs

//! Child process helpers on top of `tokio::process`.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// stdout and stderr together, for error messages.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Run `program args...` to completion and capture its output.
///
/// Failing to spawn is an error; a non-zero exit is not (check `success`).
pub async fn run_capture(program: &str, args: &[&str]) -> Result<ProcessOutput> {
    debug!(program, ?args, "running command");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("spawning '{program}'"))?;

    Ok(ProcessOutput {
        success: output.status.success(),
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run an argv to completion, echoing stdout lines at info and stderr lines
/// at debug while also collecting both.
pub async fn run_streaming(label: &str, argv: &[String]) -> Result<ProcessOutput> {
    let (program, args) = argv
        .split_first()
        .with_context(|| format!("empty command line for '{label}'"))?;

    info!(stage = %label, cmd = ?argv, "starting process");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning process for '{label}'"))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Always consume stderr so buffers don't fill.
    let stderr_task = stderr.map(|stderr| {
        let label = label.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(stage = %label, "stderr: {}", line);
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        })
    });

    let mut collected_out = String::new();
    if let Some(stdout) = stdout {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("reading stdout of '{label}'"))?
        {
            info!(stage = %label, "{}", line);
            collected_out.push_str(&line);
            collected_out.push('\n');
        }
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of '{label}'"))?;

    let collected_err = match stderr_task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };

    let code = status.code().unwrap_or(-1);
    info!(stage = %label, exit_code = code, success = status.success(), "process exited");

    Ok(ProcessOutput {
        success: status.success(),
        code,
        stdout: collected_out,
        stderr: collected_err,
    })
}
