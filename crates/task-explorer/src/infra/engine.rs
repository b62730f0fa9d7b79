//! External build engine adapters.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::domain::model::{BuildOutcome, BuildRequest};
use crate::infra::config::Config;
use crate::infra::output::OutputSink;

/// Request/response contract with the engine that actually runs builds.
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Run one request to completion, streaming log lines into `log` as they arrive.
    async fn submit(&self, request: BuildRequest, log: Arc<dyn OutputSink>) -> BuildOutcome;

    /// Cancel every outstanding submission. Submissions made afterwards are unaffected.
    fn cancel_all(&self);
}

/// Runs MSBuild as a child process per submission.
pub struct MsBuildProcessEngine {
    program: String,
    args: Vec<String>,
    verbosity: String,
    generation: Mutex<CancellationToken>,
}

impl MsBuildProcessEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            verbosity: "minimal".into(),
            generation: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.engine.program.clone(), config.engine.args.clone())
            .with_verbosity(config.engine.verbosity.clone())
    }

    pub fn with_verbosity(mut self, verbosity: impl Into<String>) -> Self {
        self.verbosity = verbosity.into();
        self
    }

    /// Full argument list for `request`, after the configured program.
    pub fn command_args(&self, request: &BuildRequest) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(request.project_path.display().to_string());
        args.push(format!("-t:{}", request.target));
        if !self.verbosity.is_empty() {
            args.push(format!("-v:{}", self.verbosity));
        }
        for (name, value) in &request.global_properties {
            args.push(format!("-p:{name}={}", escape_property_value(value)));
        }
        args
    }

    fn current_token(&self) -> CancellationToken {
        self.generation.lock().clone()
    }
}

#[async_trait]
impl BuildEngine for MsBuildProcessEngine {
    async fn submit(&self, request: BuildRequest, log: Arc<dyn OutputSink>) -> BuildOutcome {
        let token = self.current_token();
        if token.is_cancelled() {
            return BuildOutcome::Cancelled;
        }

        let mut command = Command::new(&self.program);
        command
            .args(self.command_args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = request.project_path.parent() {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(program = %self.program, error = %err, "failed to start build engine");
                return BuildOutcome::Failed {
                    reason: format!("failed to start {}: {err}", self.program),
                };
            }
        };

        let stdout = child.stdout.take().map(|out| forward_lines(out, log.clone()));
        let stderr = child.stderr.take().map(|err| forward_lines(err, log.clone()));

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = token.cancelled() => None,
        };

        let outcome = match status {
            Some(Ok(status)) if status.success() => BuildOutcome::Succeeded,
            Some(Ok(status)) => BuildOutcome::Failed {
                reason: match status.code() {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".into(),
                },
            },
            Some(Err(err)) => BuildOutcome::Failed {
                reason: format!("failed to wait for build engine: {err}"),
            },
            None => {
                if let Err(err) = child.kill().await {
                    tracing::warn!(error = %err, "failed to stop cancelled build");
                }
                BuildOutcome::Cancelled
            }
        };

        for reader in [stdout, stderr].into_iter().flatten() {
            // Grandchildren of a killed engine may still hold the pipes open.
            if outcome == BuildOutcome::Cancelled {
                reader.abort();
                continue;
            }
            if let Err(err) = reader.await {
                tracing::debug!(error = %err, "log forwarder ended abnormally");
            }
        }
        outcome
    }

    fn cancel_all(&self) {
        let previous = std::mem::replace(&mut *self.generation.lock(), CancellationToken::new());
        previous.cancel();
    }
}

fn forward_lines<R>(reader: R, log: Arc<dyn OutputSink>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    log.write_line(line.trim_end_matches(['\n', '\r']));
                }
                Err(err) => {
                    tracing::debug!(error = %err, "build log stream closed");
                    break;
                }
            }
        }
    })
}

/// MSBuild treats `;` as a list separator and `%` as an escape prefix on the command line.
fn escape_property_value(value: &str) -> String {
    value.replace('%', "%25").replace(';', "%3B")
}
