use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("failed to read output of `{command}`: {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {timeout_ms} ms")]
    Timeout { command: String, timeout_ms: u64 },
    #[error("`{command}` exited with {status}")]
    ExitStatus { command: String, status: ExitStatus },
}

/// `run` never fails; errors are logged and read as empty text.
pub trait CommandRunner: Sync {
    fn try_run(&self, command: &str) -> impl Future<Output = Result<String, CommandError>> + Send;

    fn run(&self, command: &str) -> impl Future<Output = String> + Send {
        async move {
            match self.try_run(command).await {
                Ok(text) => text,
                Err(err) => {
                    debug!(error = %err, "command produced no output");
                    String::new()
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for ShellRunner {
    async fn try_run(&self, command: &str) -> Result<String, CommandError> {
        let mut shell = Command::new("/bin/sh");
        shell
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        // pipelines and sudo children share the shell's group so a timeout reaches them too
        #[cfg(unix)]
        shell.process_group(0);

        let child = shell.spawn().map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let pgid = child.id();

        let output = match time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(CommandError::Wait {
                    command: command.to_string(),
                    source,
                })
            }
            Err(_elapsed) => {
                if let Some(pgid) = pgid {
                    kill_process_group(pgid);
                }
                return Err(CommandError::Timeout {
                    command: command.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        if !output.status.success() {
            return Err(CommandError::ExitStatus {
                command: command.to_string(),
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this command
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let err = std::io::Error::last_os_error();
        debug!(pgid, error = %err, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Unquotable strings (interior NUL) become empty.
pub fn shell_quote(value: &str) -> String {
    shlex::try_quote(value)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_default()
}
