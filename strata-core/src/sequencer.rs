use crate::content::{FIRST_SEQUENCE, ItemKey};
use crate::error::Result;
use crate::storage::MetadataStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Default)]
struct SequenceState {
    seeded: bool,
    last: Option<ItemKey>,
}

/// Hands out sequence numbers and timestamps, one lock per channel.
pub struct ChannelSequencer {
    metadata: Arc<MetadataStore>,
    channels: RwLock<HashMap<String, Arc<Mutex<SequenceState>>>>,
}

/// Exclusive hold on a channel's sequence. The key from `next_key` only
/// becomes the channel's latest after `commit`, so a failed write leaves no gap.
pub struct SequenceGuard {
    state: OwnedMutexGuard<SequenceState>,
}

impl SequenceGuard {
    pub fn last(&self) -> Option<ItemKey> {
        self.state.last
    }

    pub fn next_key(&self, now_micros: i64) -> ItemKey {
        match self.state.last {
            Some(last) => ItemKey {
                sequence: last.sequence + 1,
                timestamp_micros: now_micros.max(last.timestamp_micros + 1),
            },
            None => ItemKey {
                sequence: FIRST_SEQUENCE,
                timestamp_micros: now_micros,
            },
        }
    }

    pub fn commit(&mut self, key: ItemKey) {
        self.state.last = Some(key);
    }
}

impl ChannelSequencer {
    pub fn new(metadata: Arc<MetadataStore>) -> Self {
        Self {
            metadata,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, channel_id: &str) -> Result<SequenceGuard> {
        let slot = self.slot(channel_id).await;
        let mut state = slot.lock_owned().await;

        if !state.seeded {
            state.last = self.metadata.latest_item(channel_id)?;
            state.seeded = true;
        }

        Ok(SequenceGuard { state })
    }

    /// Drops the cached state of a deleted channel.
    pub async fn forget(&self, channel_id: &str) {
        self.channels.write().await.remove(channel_id);
    }

    async fn slot(&self, channel_id: &str) -> Arc<Mutex<SequenceState>> {
        if let Some(slot) = self.channels.read().await.get(channel_id) {
            return slot.clone();
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SequenceState::default())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConfig;
    use crate::content::{ItemRecord, ReplicationState};
    use chrono::Utc;

    fn metadata() -> (tempfile::TempDir, Arc<MetadataStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MetadataStore::new(dir.path().join("meta.sqlite3")).expect("metadata");
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn first_key_starts_at_first_sequence() {
        let (_dir, metadata) = metadata();
        let sequencer = ChannelSequencer::new(metadata);

        let mut guard = sequencer.lock("cid").await.expect("lock");
        let first = guard.next_key(500);
        assert_eq!(first.sequence, FIRST_SEQUENCE);
        guard.commit(first);

        // Clock went backwards: timestamp still moves forward.
        let second = guard.next_key(100);
        assert_eq!(second.sequence, FIRST_SEQUENCE + 1);
        assert_eq!(second.timestamp_micros, 501);
    }

    #[tokio::test]
    async fn uncommitted_keys_are_reissued() {
        let (_dir, metadata) = metadata();
        let sequencer = ChannelSequencer::new(metadata);

        let key = {
            let guard = sequencer.lock("cid").await.expect("lock");
            guard.next_key(10)
        };
        let guard = sequencer.lock("cid").await.expect("lock");
        assert_eq!(guard.next_key(10).sequence, key.sequence);
    }

    #[tokio::test]
    async fn seeds_from_index() {
        let (_dir, metadata) = metadata();
        metadata
            .insert_channel(&ChannelConfig {
                channel_id: "cid".to_string(),
                name: "chan".to_string(),
                tags: Vec::new(),
                ttl_days: None,
                created_at: Utc::now(),
            })
            .expect("channel");
        let timestamp = Utc::now();
        metadata
            .insert_item(
                &ItemRecord {
                    channel_id: "cid".to_string(),
                    sequence: 1041,
                    timestamp,
                    content_type: "text/plain".to_string(),
                    content_language: None,
                    size_bytes: 0,
                    sha256: String::new(),
                    replication: ReplicationState::Pending,
                },
                None,
            )
            .expect("item");

        let sequencer = ChannelSequencer::new(metadata);
        let guard = sequencer.lock("cid").await.expect("lock");
        let next = guard.next_key(0);
        assert_eq!(next.sequence, 1042);
        assert_eq!(next.timestamp_micros, timestamp.timestamp_micros() + 1);
    }

    #[tokio::test]
    async fn concurrent_writers_get_distinct_increasing_keys() {
        let (_dir, metadata) = metadata();
        let sequencer = Arc::new(ChannelSequencer::new(metadata));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let sequencer = sequencer.clone();
            handles.push(tokio::spawn(async move {
                let mut guard = sequencer.lock("cid").await.expect("lock");
                let key = guard.next_key(Utc::now().timestamp_micros());
                tokio::task::yield_now().await;
                guard.commit(key);
                key
            }));
        }

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.expect("join"));
        }
        keys.sort();

        for (index, key) in keys.iter().enumerate() {
            assert_eq!(key.sequence, FIRST_SEQUENCE + index as i64);
        }
        for pair in keys.windows(2) {
            assert!(pair[1].timestamp_micros > pair[0].timestamp_micros);
        }
    }
}
