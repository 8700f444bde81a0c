//! Rendezvous for the emailed one-time passcode.
//!
//! The passcode arrives over a channel the automated session cannot read
//! (the user's email), so an out-of-band actor deposits it as a plain-text
//! file at a well-known path and we poll for it. The file has no change
//! notification, hence the bounded 1-second spin.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use super::AuthError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default wait for the passcode to show up.
pub const DEFAULT_CODE_TIMEOUT: Duration = Duration::from_secs(120);

/// Single-use file-based passcode relay.
pub struct OtpRelay {
    path: PathBuf,
    poll_interval: Duration,
}

impl OtpRelay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll cadence. Tests use this to avoid multi-second waits.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Wait for a passcode to be deposited, consuming it exactly once.
    ///
    /// Any artifact already present when the wait begins is a leftover from
    /// an earlier attempt and is discarded, so a stale code can never be
    /// replayed. The first non-empty read deletes the file and returns the
    /// trimmed contents.
    pub async fn await_code(&self, timeout: Duration) -> Result<String, AuthError> {
        self.discard_stale().await?;

        tracing::info!(path = %self.path.display(), "Waiting for one-time passcode");

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(code) = self.try_consume().await {
                tracing::info!(code_length = code.len(), "One-time passcode received");
                return Ok(code);
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(AuthError::PasscodeTimeout {
                    timeout_secs: timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn discard_stale(&self) -> Result<(), AuthError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::warn!(path = %self.path.display(), "Discarded stale passcode artifact");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Other(anyhow::Error::new(err).context(
                format!("Failed to remove stale passcode file: {}", self.path.display()),
            ))),
        }
    }

    /// Read and delete the artifact if it holds a non-empty code.
    async fn try_consume(&self) -> Option<String> {
        let content = tokio::fs::read_to_string(&self.path).await.ok()?;
        let code = content.trim().to_string();
        if code.is_empty() {
            return None;
        }

        if let Err(err) = tokio::fs::remove_file(&self.path)
            .await
            .context("Failed to delete consumed passcode file")
        {
            tracing::warn!(path = %self.path.display(), error = %err, "Passcode file not deleted");
        }

        Some(code)
    }
}
