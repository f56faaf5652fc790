use crate::error::{Result, StrataError};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct PutItemResult {
    pub item_path: PathBuf,
    pub reused: bool,
}

/// CacheStore keeps item payloads on local disk:
/// `channels/{channel_id}/items/{sequence:012}.{sha256}`.
pub struct CacheStore {
    base_path: PathBuf,
}

impl CacheStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn put_item(
        &self,
        channel_id: &str,
        sequence: i64,
        sha256: &str,
        data: &Bytes,
    ) -> Result<PutItemResult> {
        verify_hash(data, sha256)?;

        let item_path = self.item_path(channel_id, sequence, sha256)?;
        if let Some(parent) = item_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if item_path.exists() {
            return Ok(PutItemResult {
                item_path,
                reused: true,
            });
        }

        let tmp_path = item_path.with_extension(format!("{}.tmp", ulid::Ulid::new()));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &item_path).await?;

        Ok(PutItemResult {
            item_path,
            reused: false,
        })
    }

    pub async fn get_item(&self, channel_id: &str, sequence: i64, sha256: &str) -> Result<Bytes> {
        let item_path = self.item_path(channel_id, sequence, sha256)?;
        if !item_path.exists() {
            return Err(StrataError::ItemNotFound {
                channel: channel_id.to_string(),
                sequence,
            });
        }

        let bytes = fs::read(item_path).await?;
        Ok(Bytes::from(bytes))
    }

    pub fn item_exists(&self, channel_id: &str, sequence: i64, sha256: &str) -> bool {
        self.item_path(channel_id, sequence, sha256)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    pub async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        let channel_dir = self.channel_dir(channel_id)?;
        match fs::remove_dir_all(channel_dir).await {
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }

    pub fn item_path(&self, channel_id: &str, sequence: i64, sha256: &str) -> Result<PathBuf> {
        Ok(self
            .channel_dir(channel_id)?
            .join("items")
            .join(Self::item_file_name(sequence, sha256)))
    }

    pub fn channel_dir(&self, channel_id: &str) -> Result<PathBuf> {
        if channel_id.is_empty()
            || channel_id == "."
            || channel_id == ".."
            || channel_id.contains(['/', '\\'])
        {
            return Err(StrataError::InvalidRequest(format!(
                "invalid channel id: {}",
                channel_id
            )));
        }

        Ok(self.base_path.join("channels").join(channel_id))
    }

    pub fn item_file_name(sequence: i64, sha256: &str) -> String {
        format!("{:012}.{}", sequence, sha256)
    }
}

pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn verify_hash(data: &[u8], expected_hash: &str) -> Result<()> {
    let actual = compute_hash(data);
    if actual != expected_hash {
        return Err(StrataError::HashMismatch {
            expected: expected_hash.to_string(),
            actual,
        });
    }
    Ok(())
}
