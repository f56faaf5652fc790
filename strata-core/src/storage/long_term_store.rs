use crate::content::{Item, ItemKey, ItemRecord, ReplicationState, TimeBucket};
use crate::error::{Result, StrataError};
use crate::storage::verify_hash;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Archival tier. Objects are keyed by channel id and item key and carry
/// their own metadata, so a long-term store can answer reads and time-bucket
/// listings without the local index.
#[async_trait]
pub trait LongTermStore: Send + Sync {
    /// Stores the item and returns a location URL. Writing the same item
    /// again overwrites the object in place.
    async fn write_item(&self, item: &Item) -> Result<String>;

    async fn read_item(&self, channel_id: &str, key: ItemKey) -> Result<Option<Item>>;

    /// Keys stored for the channel inside the bucket, by sequence.
    async fn list_bucket(&self, channel_id: &str, bucket: &TimeBucket) -> Result<Vec<ItemKey>>;

    async fn delete_channel(&self, channel_id: &str) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    sequence: i64,
    timestamp: DateTime<Utc>,
    content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_language: Option<String>,
    sha256: String,
}

/// `[u32 header length, big endian][JSON header][payload]`
pub fn encode_envelope(item: &Item) -> Result<Vec<u8>> {
    let header = EnvelopeHeader {
        sequence: item.record.sequence,
        timestamp: item.record.timestamp,
        content_type: item.record.content_type.clone(),
        content_language: item.record.content_language.clone(),
        sha256: item.record.sha256.clone(),
    };

    let header_bytes = serde_json::to_vec(&header)?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| StrataError::Internal("envelope header too large".to_string()))?;

    let mut out = Vec::with_capacity(4 + header_bytes.len() + item.payload.len());
    out.extend_from_slice(&header_len.to_be_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&item.payload);
    Ok(out)
}

pub fn decode_envelope(channel_id: &str, bytes: Bytes) -> Result<Item> {
    if bytes.len() < 4 {
        return Err(StrataError::LongTerm("truncated envelope".to_string()));
    }

    let header_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let payload_start = 4usize
        .checked_add(header_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| StrataError::LongTerm("envelope header overruns object".to_string()))?;

    let header: EnvelopeHeader = serde_json::from_slice(&bytes[4..payload_start])?;
    let payload = bytes.slice(payload_start..);
    verify_hash(&payload, &header.sha256)?;

    Ok(Item {
        record: ItemRecord {
            channel_id: channel_id.to_string(),
            sequence: header.sequence,
            timestamp: header.timestamp,
            content_type: header.content_type,
            content_language: header.content_language,
            size_bytes: payload.len() as u64,
            sha256: header.sha256,
            replication: ReplicationState::Replicated,
        },
        payload,
    })
}

/// Directory-backed long-term tier:
/// `{root}/{channel_id}/{YYYY}/{MM}/{DD}/{HH}/{mm}/{ss}/{sequence:012}-{micros}`.
pub struct FsLongTermStore {
    root: PathBuf,
}

impl FsLongTermStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, channel_id: &str, key: ItemKey) -> PathBuf {
        let second_dir = key.timestamp().format("%Y/%m/%d/%H/%M/%S").to_string();
        let mut path = self.root.join(channel_id);
        for component in second_dir.split('/') {
            path.push(component);
        }
        path.join(format!("{:012}-{}", key.sequence, key.timestamp_micros))
    }

    fn parse_object_name(name: &str) -> Option<ItemKey> {
        let (sequence, micros) = name.split_once('-')?;
        Some(ItemKey {
            sequence: sequence.parse().ok()?,
            timestamp_micros: micros.parse().ok()?,
        })
    }
}

#[async_trait]
impl LongTermStore for FsLongTermStore {
    async fn write_item(&self, item: &Item) -> Result<String> {
        let path = self.object_path(&item.record.channel_id, item.record.key());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let envelope = encode_envelope(item)?;
        let tmp_path = path.with_extension(format!("{}.tmp", ulid::Ulid::new()));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&envelope).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;

        Ok(format!("file://{}", path.display()))
    }

    async fn read_item(&self, channel_id: &str, key: ItemKey) -> Result<Option<Item>> {
        let path = self.object_path(channel_id, key);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(path).await?;
        decode_envelope(channel_id, Bytes::from(bytes)).map(Some)
    }

    async fn list_bucket(&self, channel_id: &str, bucket: &TimeBucket) -> Result<Vec<ItemKey>> {
        let mut bucket_dir = self.root.join(channel_id);
        for component in bucket.path().split('/') {
            bucket_dir.push(component);
        }

        let mut keys = Vec::new();
        let mut pending = vec![bucket_dir];
        while let Some(dir) = pending.pop() {
            if !dir.exists() {
                continue;
            }

            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    pending.push(entry.path());
                    continue;
                }

                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if name.ends_with(".tmp") {
                    continue;
                }

                if let Some(key) = Self::parse_object_name(name) {
                    keys.push(key);
                }
            }
        }

        keys.sort_by_key(|key| key.sequence);
        keys.dedup_by_key(|key| key.sequence);
        Ok(keys)
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        let dir = self.root.join(channel_id);
        match fs::remove_dir_all(dir).await {
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }
}

/// Redis-backed long-term tier. Objects are plain string keys; a sorted set
/// per channel indexes them by timestamp.
pub struct RedisLongTermStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisLongTermStore {
    pub fn new(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|error| {
            StrataError::Config(format!("long-term redis connection config error: {}", error))
        })?;

        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    fn object_key(&self, channel_id: &str, sequence: i64) -> String {
        format!("{}:item:{}:{}", self.key_prefix, channel_id, sequence)
    }

    fn index_key(&self, channel_id: &str) -> String {
        format!("{}:index:{}", self.key_prefix, channel_id)
    }

    fn index_member(key: ItemKey) -> String {
        format!("{}:{}", key.sequence, key.timestamp_micros)
    }

    fn parse_index_member(member: &str) -> Option<ItemKey> {
        let (sequence, micros) = member.split_once(':')?;
        Some(ItemKey {
            sequence: sequence.parse().ok()?,
            timestamp_micros: micros.parse().ok()?,
        })
    }

    /// Inclusive score range of a bucket; `zrangebyscore` bounds are closed.
    fn score_range(bucket: &TimeBucket) -> (i64, i64) {
        (bucket.start_micros(), bucket.end_micros() - 1)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| {
                StrataError::LongTerm(format!("long-term redis connection failed: {}", error))
            })
    }
}

#[async_trait]
impl LongTermStore for RedisLongTermStore {
    async fn write_item(&self, item: &Item) -> Result<String> {
        let key = item.record.key();
        let object_key = self.object_key(&item.record.channel_id, key.sequence);
        let index_key = self.index_key(&item.record.channel_id);
        let envelope = encode_envelope(item)?;

        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .set(&object_key, envelope.as_slice())
            .ignore()
            .zadd(&index_key, Self::index_member(key), key.timestamp_micros)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(format!("redis:{}", object_key))
    }

    async fn read_item(&self, channel_id: &str, key: ItemKey) -> Result<Option<Item>> {
        let mut conn = self.connection().await?;
        let bytes: Option<Vec<u8>> = conn.get(self.object_key(channel_id, key.sequence)).await?;

        bytes
            .map(|bytes| decode_envelope(channel_id, Bytes::from(bytes)))
            .transpose()
    }

    async fn list_bucket(&self, channel_id: &str, bucket: &TimeBucket) -> Result<Vec<ItemKey>> {
        let (min, max) = Self::score_range(bucket);
        let mut conn = self.connection().await?;
        let members: Vec<String> = conn
            .zrangebyscore(self.index_key(channel_id), min, max)
            .await?;

        let mut keys: Vec<ItemKey> = members
            .iter()
            .filter_map(|member| Self::parse_index_member(member))
            .collect();
        keys.sort_by_key(|key| key.sequence);
        keys.dedup_by_key(|key| key.sequence);
        Ok(keys)
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        let index_key = self.index_key(channel_id);
        let mut conn = self.connection().await?;
        let members: Vec<String> = conn.zrange(&index_key, 0, -1).await?;

        let mut keys: Vec<String> = members
            .iter()
            .filter_map(|member| Self::parse_index_member(member))
            .map(|key| self.object_key(channel_id, key.sequence))
            .collect();
        keys.push(index_key);

        conn.del::<_, ()>(keys).await?;
        Ok(())
    }
}
