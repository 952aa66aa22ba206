// src/exec/process.rs

//! Shell process runner used by the command-backed collaborators.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Exit status and captured stdout of a finished shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    /// `-1` when the process was killed by a signal.
    pub code: i32,
    pub stdout: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Turn a non-zero exit into an error mentioning `what`.
    pub fn ensure_success(self, what: &str) -> Result<ShellOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(anyhow::anyhow!("{what} exited with status {}", self.code))
        }
    }
}

/// Run `cmd` through `sh -c`, optionally feeding `stdin`, and wait for it.
///
/// The child is not killed if the returned future is dropped: remote power
/// and image operations must be allowed to run to completion.
pub async fn run_shell(cmd: &str, stdin: Option<&[u8]>) -> Result<ShellOutput> {
    debug!(cmd = %cmd, "running shell command");

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(cmd)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning '{cmd}'"))?;

    if let (Some(payload), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(payload)
            .await
            .with_context(|| format!("writing stdin of '{cmd}'"))?;
        // Dropping the pipe closes stdin so the child sees EOF.
        drop(pipe);
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("waiting for '{cmd}'"))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        debug!(cmd = %cmd, "stderr: {}", line);
    }

    let code = output.status.code().unwrap_or(-1);
    debug!(cmd = %cmd, exit_code = code, "shell command exited");

    Ok(ShellOutput {
        code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}

/// Quote `value` for `sh` unless it only holds obviously safe characters.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Substitute `{key}` placeholders in `template`; values are shell-quoted.
///
/// Keys listed in `raw` are inserted verbatim (used for pre-quoted lists).
pub fn render(template: &str, vars: &[(&str, &str)], raw: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), &shell_quote(value));
    }
    for (key, value) in raw {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
