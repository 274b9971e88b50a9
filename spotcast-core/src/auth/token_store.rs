use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Error;

/// Persists the Spotify refresh token between runs.
#[derive(Debug, Clone)]
pub struct RefreshTokenStore {
    path: PathBuf,
}

impl RefreshTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, token: &str) -> Result<(), Error> {
        tokio::fs::write(&self.path, token).await?;
        debug!("Refresh token written to {}", self.path.display());
        Ok(())
    }

    /// The stored token, or `None` when the file is missing or blank.
    pub async fn load(&self) -> Result<Option<String>, Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => {
                let token = s.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_overwrites_and_load_trims() {
        let dir = tempfile::tempdir().unwrap();
        let store = RefreshTokenStore::new(dir.path().join("refresh.txt"));

        assert_eq!(store.load().await.unwrap(), None);
        store.save("first").await.unwrap();
        store.save("second\n").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("second"));

        store.save("   ").await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }
}
