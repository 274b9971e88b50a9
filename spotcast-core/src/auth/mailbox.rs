//! File drop between the OAuth relay and the bot process.
//!
//! The relay may run in a separate process (`--mode callback`), so the code
//! travels through a file rather than a channel. The file holds the code on
//! its first line and the OAuth `state` on the second.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::Error;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// An authorization code as the relay received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCode {
    pub code: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CodeMailbox {
    path: PathBuf,
}

impl CodeMailbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `code` and the `state` it came with, replacing any earlier one.
    pub async fn deliver(&self, code: &str, state: Option<&str>) -> Result<(), Error> {
        let contents = match state {
            Some(state) => format!("{}\n{}\n", code.trim(), state.trim()),
            None => format!("{}\n", code.trim()),
        };
        tokio::fs::write(&self.path, contents).await?;
        info!("Authorization code saved to {}", self.path.display());
        Ok(())
    }

    /// Waits until a code shows up, then reads and removes it.
    pub async fn wait_for_code(&self, poll: Duration) -> Result<ReceivedCode, Error> {
        loop {
            if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
                break;
            }
            tokio::time::sleep(poll).await;
        }
        let contents = tokio::fs::read_to_string(&self.path).await?;
        tokio::fs::remove_file(&self.path).await?;

        let mut lines = contents.lines().map(str::trim);
        let code = lines.next().unwrap_or_default().to_string();
        if code.is_empty() {
            return Err(Error::Auth("empty authorization code".into()));
        }
        let state = lines.next().filter(|s| !s.is_empty()).map(str::to_string);
        Ok(ReceivedCode { code, state })
    }

    /// Removes a leftover code, if any.
    pub async fn discard(&self) {
        if tokio::fs::remove_file(&self.path).await.is_ok() {
            debug!("Discarded {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waits_then_consumes_code() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = CodeMailbox::new(dir.path().join("code.txt"));

        let writer = mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer.deliver("abc\n", Some("s1")).await.unwrap();
        });

        let received = mailbox.wait_for_code(Duration::from_millis(10)).await.unwrap();
        assert_eq!(received, ReceivedCode { code: "abc".into(), state: Some("s1".into()) });
        assert!(!mailbox.path().exists());
    }

    #[tokio::test]
    async fn code_without_state() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = CodeMailbox::new(dir.path().join("code.txt"));
        mailbox.deliver("abc", None).await.unwrap();

        let received = mailbox.wait_for_code(Duration::from_millis(10)).await.unwrap();
        assert_eq!(received.code, "abc");
        assert_eq!(received.state, None);
    }

    #[tokio::test]
    async fn discard_is_quiet_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = CodeMailbox::new(dir.path().join("code.txt"));
        mailbox.discard().await;
        mailbox.deliver("x", None).await.unwrap();
        mailbox.discard().await;
        assert!(!mailbox.path().exists());
    }
}
