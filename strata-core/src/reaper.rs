use crate::error::Result;
use crate::sequencer::ChannelSequencer;
use crate::storage::{MetadataStore, TieredStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub interval: Duration,
    /// How long a tombstoned channel is kept before its data is removed.
    pub grace: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            grace: Duration::from_secs(5),
        }
    }
}

/// Physically removes deleted channels from every tier.
pub struct ChannelReaper {
    tiered: Arc<TieredStore>,
    metadata: Arc<MetadataStore>,
    sequencer: Arc<ChannelSequencer>,
    config: ReaperConfig,
    wakeup: Notify,
    running: Mutex<()>,
}

impl ChannelReaper {
    pub fn new(
        tiered: Arc<TieredStore>,
        metadata: Arc<MetadataStore>,
        sequencer: Arc<ChannelSequencer>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            tiered,
            metadata,
            sequencer,
            config,
            wakeup: Notify::new(),
            running: Mutex::new(()),
        }
    }

    pub fn wake(&self) {
        self.wakeup.notify_one();
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.interval) => {}
                    _ = self.wakeup.notified() => {
                        // Let the grace period of the fresh tombstone run out.
                        tokio::time::sleep(self.config.grace).await;
                    }
                }

                match self.reap_once().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("reaped {} deleted channels", count),
                    Err(error) => tracing::warn!("channel reaper failed: {}", error),
                }
            }
        })
    }

    pub async fn reap_once(&self) -> Result<usize> {
        let _running = self.running.lock().await;
        let grace = chrono::Duration::from_std(self.config.grace).unwrap_or_default();
        let cutoff = Utc::now() - grace;
        let channel_ids = self.metadata.list_tombstoned_channels(cutoff)?;

        let mut reaped = 0;
        for channel_id in channel_ids {
            // Waits out an insert that is already past its liveness check.
            let guard = self.sequencer.lock(&channel_id).await?;
            let purged = self.tiered.purge_channel(&channel_id).await;
            drop(guard);

            match purged {
                Ok(items) => {
                    self.sequencer.forget(&channel_id).await;
                    tracing::debug!("purged channel_id={} items={}", channel_id, items);
                    reaped += 1;
                }
                Err(error) => {
                    tracing::warn!("failed to purge channel_id={}: {}", channel_id, error);
                }
            }
        }

        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConfig;
    use crate::content::{Item, ItemRecord, ReplicationState};
    use crate::replication::ReplicationQueue;
    use crate::storage::{CacheStore, FsLongTermStore, compute_hash};
    use bytes::Bytes;

    #[tokio::test]
    async fn reaps_only_after_grace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let metadata =
            Arc::new(MetadataStore::new(dir.path().join("meta.sqlite3")).expect("metadata"));
        let cache = Arc::new(CacheStore::new(dir.path().join("cache")).expect("cache"));
        let long_term =
            Arc::new(FsLongTermStore::new(dir.path().join("long_term")).expect("long term"));
        let (queue, _receiver) = ReplicationQueue::new(16);
        let tiered = Arc::new(TieredStore::new(
            metadata.clone(),
            cache.clone(),
            long_term,
            queue,
        ));

        metadata
            .insert_channel(&ChannelConfig {
                channel_id: "cid".to_string(),
                name: "chan".to_string(),
                tags: Vec::new(),
                ttl_days: None,
                created_at: Utc::now(),
            })
            .expect("channel");
        let payload = Bytes::from_static(b"payload");
        let record = ItemRecord {
            channel_id: "cid".to_string(),
            sequence: 1000,
            timestamp: Utc::now(),
            content_type: "text/plain".to_string(),
            content_language: None,
            size_bytes: payload.len() as u64,
            sha256: compute_hash(&payload),
            replication: ReplicationState::Pending,
        };
        tiered
            .write(&Item {
                record: record.clone(),
                payload,
            })
            .await
            .expect("write");
        metadata.tombstone_channel("chan").expect("tombstone");

        let sequencer = Arc::new(ChannelSequencer::new(metadata.clone()));
        let patient = ChannelReaper::new(
            tiered.clone(),
            metadata.clone(),
            sequencer.clone(),
            ReaperConfig {
                interval: Duration::from_secs(3600),
                grace: Duration::from_secs(3600),
            },
        );
        assert_eq!(patient.reap_once().await.expect("reap"), 0);
        assert!(cache.item_exists("cid", 1000, &record.sha256));

        let eager = ChannelReaper::new(
            tiered,
            metadata.clone(),
            sequencer,
            ReaperConfig {
                interval: Duration::from_secs(3600),
                grace: Duration::ZERO,
            },
        );
        assert_eq!(eager.reap_once().await.expect("reap"), 1);
        assert!(!cache.item_exists("cid", 1000, &record.sha256));
        assert!(metadata.get_item("cid", 1000).expect("get").is_none());
        assert!(
            metadata
                .list_tombstoned_channels(Utc::now())
                .expect("list")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn reap_waits_for_the_channel_sequence_guard() {
        let dir = tempfile::tempdir().expect("tempdir");
        let metadata =
            Arc::new(MetadataStore::new(dir.path().join("meta.sqlite3")).expect("metadata"));
        let cache = Arc::new(CacheStore::new(dir.path().join("cache")).expect("cache"));
        let long_term =
            Arc::new(FsLongTermStore::new(dir.path().join("long_term")).expect("long term"));
        let (queue, _receiver) = ReplicationQueue::new(16);
        let tiered = Arc::new(TieredStore::new(metadata.clone(), cache, long_term, queue));

        metadata
            .insert_channel(&ChannelConfig {
                channel_id: "cid".to_string(),
                name: "chan".to_string(),
                tags: Vec::new(),
                ttl_days: None,
                created_at: Utc::now(),
            })
            .expect("channel");
        metadata.tombstone_channel("chan").expect("tombstone");

        let sequencer = Arc::new(ChannelSequencer::new(metadata.clone()));
        let reaper = Arc::new(ChannelReaper::new(
            tiered,
            metadata.clone(),
            sequencer.clone(),
            ReaperConfig {
                interval: Duration::from_secs(3600),
                grace: Duration::ZERO,
            },
        ));

        let guard = sequencer.lock("cid").await.expect("lock");
        let reaping = tokio::spawn({
            let reaper = reaper.clone();
            async move { reaper.reap_once().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!reaping.is_finished());
        assert_eq!(
            metadata
                .list_tombstoned_channels(Utc::now())
                .expect("list")
                .len(),
            1
        );

        drop(guard);
        assert_eq!(reaping.await.expect("join").expect("reap"), 1);
        assert!(
            metadata
                .list_tombstoned_channels(Utc::now())
                .expect("list")
                .is_empty()
        );
    }
}
