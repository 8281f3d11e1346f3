//! External assistant invocation.
//!
//! Spawns the assistant CLI once per prompt with the session scope as its
//! working directory, waits for it under a timeout and classifies the
//! outcome into an [`InvocationError`] kind.

use crate::session::SessionRef;
use async_trait::async_trait;
use relay_common::config::AssistantConfig;
use relay_common::util::truncate_with_ellipsis;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// One prompt to the assistant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    /// Prompt text
    pub prompt: String,
    /// Locally staged image, owned by the caller
    pub attachment: Option<PathBuf>,
    /// Working directory of the child process
    pub scope: PathBuf,
    /// Conversation to continue
    pub session: SessionRef,
}

/// Why an invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    /// The assistant binary is not installed or not on PATH.
    #[error("'{binary}' command not found. Make sure it is installed and in PATH.")]
    NotFound { binary: String },

    /// The referenced conversation could not be continued.
    #[error("session could not be continued: {0}")]
    SessionInvalid(String),

    /// The assistant ran and reported failure.
    #[error("{stderr}")]
    NonZeroExit { code: i32, stderr: String },

    /// Spawning, waiting or reading output failed, or the timeout expired.
    #[error("{0}")]
    Transport(String),
}

/// Runs prompts against the assistant.
#[async_trait]
pub trait AssistantInvoker: Send + Sync {
    /// Run one prompt and return the assistant's standard output.
    async fn invoke(&self, request: &InvocationRequest) -> Result<String, InvocationError>;
}

/// Invoker that spawns the configured CLI binary.
pub struct CliInvoker {
    config: AssistantConfig,
    timeout: Duration,
}

impl CliInvoker {
    /// Create an invoker from the assistant configuration.
    pub fn new(config: AssistantConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self { config, timeout }
    }

    /// Override the invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Argument vector passed after the binary name.
    pub fn build_args(&self, request: &InvocationRequest) -> Vec<String> {
        let mut args = self.config.extra_args.clone();

        match &request.session {
            SessionRef::None => {}
            SessionRef::ContinueMostRecent => args.push(self.config.continue_flag.clone()),
            SessionRef::Explicit(token) => {
                args.push(self.config.resume_flag.clone());
                args.push(token.clone());
            }
        }

        if let Some(path) = &request.attachment {
            args.push(self.config.image_flag.clone());
            args.push(path.to_string_lossy().into_owned());
        }

        args.push(self.config.prompt_flag.clone());
        args.push(request.prompt.clone());
        args
    }

    /// Map a non-zero exit to an error kind.
    ///
    /// A failure only counts as a stale session when a session was
    /// requested and the failure text carries one of the configured markers.
    fn classify_failure(&self, session: &SessionRef, code: i32, stderr: &str, stdout: &str) -> InvocationError {
        let text = if stderr.trim().is_empty() { stdout } else { stderr };
        let lowered = text.to_lowercase();

        if !session.is_fresh()
            && self
                .config
                .session_error_markers
                .iter()
                .any(|m| !m.is_empty() && lowered.contains(&m.to_lowercase()))
        {
            return InvocationError::SessionInvalid(text.trim().to_string());
        }

        InvocationError::NonZeroExit {
            code,
            stderr: text.to_string(),
        }
    }
}

#[async_trait]
impl AssistantInvoker for CliInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<String, InvocationError> {
        if !request.scope.is_dir() {
            return Err(InvocationError::Transport(format!(
                "scope directory '{}' does not exist",
                request.scope.display()
            )));
        }

        let args = self.build_args(request);

        tracing::info!(
            binary = %self.config.binary,
            scope = %request.scope.display(),
            session = %request.session,
            has_attachment = request.attachment.is_some(),
            prompt = %truncate_with_ellipsis(&request.prompt, 100),
            "Invoking assistant"
        );

        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&args)
            .current_dir(&request.scope)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = std::time::Instant::now();
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InvocationError::NotFound {
                    binary: self.config.binary.clone(),
                });
            }
            Ok(Err(e)) => {
                return Err(InvocationError::Transport(format!(
                    "failed to run '{}': {e}",
                    self.config.binary
                )));
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Assistant timed out, child killed"
                );
                return Err(InvocationError::Transport(format!(
                    "assistant timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        tracing::info!(
            exit_code = output.status.code().unwrap_or(-1),
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Assistant finished"
        );

        if output.status.success() {
            Ok(stdout.into_owned())
        } else {
            let code = output.status.code().unwrap_or(-1);
            Err(self.classify_failure(&request.session, code, &stderr, &stdout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(session: SessionRef, attachment: Option<&str>) -> InvocationRequest {
        InvocationRequest {
            prompt: "hello there".into(),
            attachment: attachment.map(PathBuf::from),
            scope: std::env::temp_dir(),
            session,
        }
    }

    #[test]
    fn args_fresh_conversation() {
        let invoker = CliInvoker::new(AssistantConfig::default());
        let args = invoker.build_args(&request(SessionRef::None, None));
        assert_eq!(args, vec!["-p", "hello there"]);
    }

    #[test]
    fn args_continue_most_recent() {
        let invoker = CliInvoker::new(AssistantConfig::default());
        let args = invoker.build_args(&request(SessionRef::ContinueMostRecent, None));
        assert_eq!(args, vec!["--continue", "-p", "hello there"]);
    }

    #[test]
    fn args_explicit_token_with_image() {
        let invoker = CliInvoker::new(AssistantConfig::default());
        let args = invoker.build_args(&request(
            SessionRef::Explicit("abc".into()),
            Some("/tmp/photo.jpg"),
        ));
        assert_eq!(
            args,
            vec!["--resume", "abc", "--image", "/tmp/photo.jpg", "-p", "hello there"]
        );
    }

    #[test]
    fn args_extra_args_come_first() {
        let config = AssistantConfig {
            extra_args: vec!["--output-format".into(), "text".into()],
            ..AssistantConfig::default()
        };
        let invoker = CliInvoker::new(config);
        let args = invoker.build_args(&request(SessionRef::None, None));
        assert_eq!(args, vec!["--output-format", "text", "-p", "hello there"]);
    }

    #[test]
    fn classify_session_failure_only_with_session() {
        let invoker = CliInvoker::new(AssistantConfig::default());

        let err = invoker.classify_failure(
            &SessionRef::ContinueMostRecent,
            1,
            "No conversation found to CONTINUE",
            "",
        );
        assert!(matches!(err, InvocationError::SessionInvalid(_)));

        let err = invoker.classify_failure(&SessionRef::None, 1, "invalid session", "");
        assert!(matches!(err, InvocationError::NonZeroExit { code: 1, .. }));

        // A fresh call has nothing to recover from, so marker text is a plain failure.
        let err = invoker.classify_failure(&SessionRef::None, 2, "Error: session store locked", "");
        match err {
            InvocationError::NonZeroExit { code, stderr } => {
                assert_eq!(code, 2);
                assert_eq!(stderr, "Error: session store locked");
            }
            other => panic!("expected a plain failure, got {other:?}"),
        }
    }

    #[test]
    fn classify_plain_failure_keeps_stderr() {
        let invoker = CliInvoker::new(AssistantConfig::default());
        let err = invoker.classify_failure(
            &SessionRef::Explicit("t".into()),
            2,
            "rate limited",
            "",
        );
        assert_eq!(
            err,
            InvocationError::NonZeroExit {
                code: 2,
                stderr: "rate limited".into()
            }
        );
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn classify_falls_back_to_stdout() {
        let invoker = CliInvoker::new(AssistantConfig::default());
        let err = invoker.classify_failure(&SessionRef::None, 3, "  ", "boom on stdout");
        assert!(matches!(err, InvocationError::NonZeroExit { ref stderr, .. } if stderr == "boom on stdout"));
    }

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let config = AssistantConfig {
            binary: "definitely-not-an-installed-assistant-binary".into(),
            ..AssistantConfig::default()
        };
        let invoker = CliInvoker::new(config);
        let err = invoker.invoke(&request(SessionRef::None, None)).await.unwrap_err();
        assert!(matches!(err, InvocationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn missing_scope_is_transport() {
        let invoker = CliInvoker::new(AssistantConfig::default());
        let mut req = request(SessionRef::None, None);
        req.scope = PathBuf::from("/definitely/not/a/real/scope");
        let err = invoker.invoke(&req).await.unwrap_err();
        assert!(matches!(err, InvocationError::Transport(_)));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// Write an executable shell script standing in for the assistant.
        fn fake_assistant(dir: &TempDir, body: &str) -> String {
            let path = dir.path().join("fake-assistant");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn invoker(binary: String) -> CliInvoker {
            CliInvoker::new(AssistantConfig {
                binary,
                ..AssistantConfig::default()
            })
        }

        #[tokio::test]
        async fn success_returns_stdout_and_runs_in_scope() {
            let bin_dir = TempDir::new().unwrap();
            let scope = TempDir::new().unwrap();
            let bin = fake_assistant(&bin_dir, r#"pwd; printf '%s\n' "$@""#);

            let mut req = request(SessionRef::ContinueMostRecent, None);
            req.scope = scope.path().to_path_buf();

            let out = invoker(bin).invoke(&req).await.unwrap();
            let lines: Vec<&str> = out.lines().collect();
            let cwd = std::fs::canonicalize(scope.path()).unwrap();
            assert_eq!(std::fs::canonicalize(lines[0]).unwrap(), cwd);
            assert_eq!(&lines[1..], &["--continue", "-p", "hello there"]);
        }

        #[tokio::test]
        async fn invalid_utf8_is_replaced() {
            let bin_dir = TempDir::new().unwrap();
            let bin = fake_assistant(&bin_dir, r"printf 'ok \377 done'");
            let out = invoker(bin).invoke(&request(SessionRef::None, None)).await.unwrap();
            assert_eq!(out, "ok \u{FFFD} done");
        }

        #[tokio::test]
        async fn nonzero_exit_with_session_marker_is_session_invalid() {
            let bin_dir = TempDir::new().unwrap();
            let bin = fake_assistant(&bin_dir, "echo 'Error: session not found' >&2; exit 1");
            let err = invoker(bin)
                .invoke(&request(SessionRef::Explicit("gone".into()), None))
                .await
                .unwrap_err();
            assert_eq!(err, InvocationError::SessionInvalid("Error: session not found".into()));
        }

        #[tokio::test]
        async fn nonzero_exit_without_marker() {
            let bin_dir = TempDir::new().unwrap();
            let bin = fake_assistant(&bin_dir, "echo 'quota exceeded' >&2; exit 4");
            let err = invoker(bin)
                .invoke(&request(SessionRef::ContinueMostRecent, None))
                .await
                .unwrap_err();
            assert_eq!(
                err,
                InvocationError::NonZeroExit {
                    code: 4,
                    stderr: "quota exceeded\n".into()
                }
            );
        }

        #[tokio::test]
        async fn timeout_is_transport() {
            let bin_dir = TempDir::new().unwrap();
            let bin = fake_assistant(&bin_dir, "sleep 5");
            let invoker = invoker(bin).with_timeout(Duration::from_millis(200));
            let err = invoker.invoke(&request(SessionRef::None, None)).await.unwrap_err();
            assert!(matches!(err, InvocationError::Transport(ref m) if m.contains("timed out")));
        }
    }
}
