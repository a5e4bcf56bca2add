use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access cursor record: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cursor record is not a match id: {0:?}")]
    Corrupt(String),
}

/// Durable home of the last processed match id.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// `None` when nothing has been processed yet.
    async fn load(&self) -> Result<Option<u64>, StoreError>;

    async fn save(&self, match_id: u64) -> Result<(), StoreError>;
}

pub struct FileCursorStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(".tmp");
        Self {
            path,
            tmp_path: tmp_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self) -> Result<Option<u64>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let content = match String::from_utf8(raw) {
            Ok(content) => content,
            Err(err) => {
                return Err(StoreError::Corrupt(
                    String::from_utf8_lossy(err.as_bytes()).into_owned(),
                ))
            }
        };
        content
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StoreError::Corrupt(content))
    }

    async fn save(&self, match_id: u64) -> Result<(), StoreError> {
        // write then rename, a reader only ever sees the old or the new id
        tokio::fs::write(&self.tmp_path, match_id.to_string()).await?;
        if let Err(err) = tokio::fs::rename(&self.tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&self.tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }
}
