use crate::content::{Item, ReplicationState};
use crate::error::Result;
use crate::storage::{CacheStore, LongTermStore, MetadataStore};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};

#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub sweep_interval: Duration,
    /// Pending items younger than this are left to the queue.
    pub sweep_min_age: Duration,
    pub sweep_batch_size: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            workers: 20,
            queue_capacity: 2000,
            max_attempts: 5,
            retry_backoff: Duration::from_millis(200),
            sweep_interval: Duration::from_secs(30),
            sweep_min_age: Duration::from_secs(10),
            sweep_batch_size: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplicationJob {
    pub channel_id: String,
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied { long_term_url: String },
    AlreadyReplicated,
    /// The channel was deleted or the item is no longer indexed.
    Dropped,
}

/// Sending half of the replication queue. Enqueueing never waits: a full
/// queue leaves the item pending for the sweeper.
#[derive(Clone)]
pub struct ReplicationQueue {
    sender: mpsc::Sender<ReplicationJob>,
}

impl ReplicationQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ReplicationJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, job: ReplicationJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                tracing::warn!(
                    "replication queue full, leaving channel_id={} sequence={} to the sweeper",
                    job.channel_id,
                    job.sequence
                );
                false
            }
            Err(TrySendError::Closed(job)) => {
                tracing::warn!(
                    "replication queue closed, dropping channel_id={} sequence={}",
                    job.channel_id,
                    job.sequence
                );
                false
            }
        }
    }
}

/// Copies items from the cache tier into the long-term tier.
pub struct Replicator {
    metadata: Arc<MetadataStore>,
    cache: Arc<CacheStore>,
    long_term: Arc<dyn LongTermStore>,
    config: ReplicationConfig,
}

impl Replicator {
    pub fn new(
        metadata: Arc<MetadataStore>,
        cache: Arc<CacheStore>,
        long_term: Arc<dyn LongTermStore>,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            metadata,
            cache,
            long_term,
            config,
        }
    }

    pub async fn copy_once(&self, job: &ReplicationJob) -> Result<CopyOutcome> {
        if !self.metadata.is_channel_live(&job.channel_id)? {
            return Ok(CopyOutcome::Dropped);
        }

        let Some(record) = self.metadata.get_item(&job.channel_id, job.sequence)? else {
            return Ok(CopyOutcome::Dropped);
        };

        if record.replication == ReplicationState::Replicated {
            return Ok(CopyOutcome::AlreadyReplicated);
        }

        let payload = self
            .cache
            .get_item(&record.channel_id, record.sequence, &record.sha256)
            .await?;

        let item = Item { record, payload };
        let long_term_url = self.long_term.write_item(&item).await?;
        self.metadata
            .mark_replicated(&job.channel_id, job.sequence, &long_term_url)?;

        Ok(CopyOutcome::Copied { long_term_url })
    }

    /// Returns `None` once `max_attempts` copies have failed; the item then
    /// stays pending.
    pub async fn copy_with_retry(&self, job: &ReplicationJob) -> Option<CopyOutcome> {
        let mut backoff = self.config.retry_backoff;
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.copy_once(job).await {
                Ok(outcome) => {
                    if let CopyOutcome::Copied { long_term_url } = &outcome {
                        tracing::debug!(
                            "replicated channel_id={} sequence={} to {}",
                            job.channel_id,
                            job.sequence,
                            long_term_url
                        );
                    }
                    return Some(outcome);
                }
                Err(error) if attempt < max_attempts => {
                    tracing::debug!(
                        "replication attempt {} failed channel_id={} sequence={} error={}",
                        attempt,
                        job.channel_id,
                        job.sequence,
                        error
                    );
                    sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(error) => {
                    tracing::warn!(
                        "replication gave up after {} attempts channel_id={} sequence={} error={}",
                        attempt,
                        job.channel_id,
                        job.sequence,
                        error
                    );
                }
            }
        }

        None
    }

    /// Drains the queue, running at most `workers` copies at a time. A job
    /// that is already in flight is not started twice.
    pub fn start(self: Arc<Self>, mut receiver: mpsc::Receiver<ReplicationJob>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
            let in_flight: Arc<Mutex<HashSet<ReplicationJob>>> =
                Arc::new(Mutex::new(HashSet::new()));

            while let Some(job) = receiver.recv().await {
                if !in_flight.lock().await.insert(job.clone()) {
                    continue;
                }

                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };

                let replicator = self.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(async move {
                    replicator.copy_with_retry(&job).await;
                    in_flight.lock().await.remove(&job);
                    drop(permit);
                });
            }

            tracing::info!("replication queue closed, dispatcher exiting");
        })
    }
}

/// Periodically re-enqueues items that are still pending, which covers a
/// full queue, exhausted retries and restarts.
pub struct ReplicationSweeper {
    metadata: Arc<MetadataStore>,
    queue: ReplicationQueue,
    config: ReplicationConfig,
}

impl ReplicationSweeper {
    pub fn new(
        metadata: Arc<MetadataStore>,
        queue: ReplicationQueue,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            metadata,
            queue,
            config,
        }
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.sweep_interval);
            loop {
                ticker.tick().await;
                match self.sweep_once() {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("re-enqueued {} pending replications", count),
                    Err(error) => tracing::warn!("replication sweep failed: {}", error),
                }
            }
        })
    }

    pub fn sweep_once(&self) -> Result<usize> {
        let min_age = i64::try_from(self.config.sweep_min_age.as_micros()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_micros().saturating_sub(min_age);

        let pending = self
            .metadata
            .list_pending_items(cutoff, self.config.sweep_batch_size)?;

        let mut enqueued = 0;
        for (channel_id, sequence) in pending {
            if self.queue.enqueue(ReplicationJob {
                channel_id,
                sequence,
            }) {
                enqueued += 1;
            }
        }

        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelConfig;
    use crate::content::{ItemKey, ItemRecord, Tier, TimeBucket};
    use crate::error::StrataError;
    use crate::storage::{FsLongTermStore, TieredStore, compute_hash};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        _dir: tempfile::TempDir,
        metadata: Arc<MetadataStore>,
        cache: Arc<CacheStore>,
        long_term: Arc<FsLongTermStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let metadata =
            Arc::new(MetadataStore::new(dir.path().join("meta.sqlite3")).expect("metadata"));
        let cache = Arc::new(CacheStore::new(dir.path().join("cache")).expect("cache"));
        let long_term =
            Arc::new(FsLongTermStore::new(dir.path().join("long_term")).expect("long term"));

        metadata
            .insert_channel(&ChannelConfig {
                channel_id: "cid".to_string(),
                name: "chan".to_string(),
                tags: Vec::new(),
                ttl_days: None,
                created_at: Utc::now(),
            })
            .expect("channel");

        Fixture {
            _dir: dir,
            metadata,
            cache,
            long_term,
        }
    }

    async fn store_item(fixture: &Fixture, sequence: i64, body: &'static [u8]) -> ItemRecord {
        let payload = Bytes::from_static(body);
        let record = ItemRecord {
            channel_id: "cid".to_string(),
            sequence,
            timestamp: Utc::now(),
            content_type: "text/plain".to_string(),
            content_language: None,
            size_bytes: payload.len() as u64,
            sha256: compute_hash(&payload),
            replication: ReplicationState::Pending,
        };
        fixture
            .cache
            .put_item("cid", sequence, &record.sha256, &payload)
            .await
            .expect("cache put");
        fixture.metadata.insert_item(&record, None).expect("index");
        record
    }

    fn fast_config() -> ReplicationConfig {
        ReplicationConfig {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
            sweep_min_age: Duration::ZERO,
            ..ReplicationConfig::default()
        }
    }

    #[tokio::test]
    async fn copy_once_is_idempotent() {
        let fixture = fixture();
        let record = store_item(&fixture, 1000, b"payload").await;
        let replicator = Replicator::new(
            fixture.metadata.clone(),
            fixture.cache.clone(),
            fixture.long_term.clone(),
            fast_config(),
        );
        let job = ReplicationJob {
            channel_id: "cid".to_string(),
            sequence: 1000,
        };

        assert!(matches!(
            replicator.copy_once(&job).await.expect("copy"),
            CopyOutcome::Copied { .. }
        ));
        assert_eq!(
            replicator.copy_once(&job).await.expect("again"),
            CopyOutcome::AlreadyReplicated
        );

        let bucket = TimeBucket::containing(record.timestamp, crate::content::TimeUnit::Minute);
        let keys = fixture
            .long_term
            .list_bucket("cid", &bucket)
            .await
            .expect("list");
        assert_eq!(keys, vec![record.key()]);
        assert_eq!(fixture.metadata.count_pending_items("cid").expect("count"), 0);
    }

    #[tokio::test]
    async fn deleted_channels_are_not_replicated() {
        let fixture = fixture();
        store_item(&fixture, 1000, b"payload").await;
        fixture.metadata.tombstone_channel("chan").expect("tombstone");

        let replicator = Replicator::new(
            fixture.metadata.clone(),
            fixture.cache.clone(),
            fixture.long_term.clone(),
            fast_config(),
        );
        let outcome = replicator
            .copy_once(&ReplicationJob {
                channel_id: "cid".to_string(),
                sequence: 1000,
            })
            .await
            .expect("copy");
        assert_eq!(outcome, CopyOutcome::Dropped);
    }

    struct FlakyStore {
        inner: Arc<FsLongTermStore>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl LongTermStore for FlakyStore {
        async fn write_item(&self, item: &Item) -> Result<String> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StrataError::LongTerm("transient".to_string()));
            }
            self.inner.write_item(item).await
        }

        async fn read_item(&self, channel_id: &str, key: ItemKey) -> Result<Option<Item>> {
            self.inner.read_item(channel_id, key).await
        }

        async fn list_bucket(&self, channel_id: &str, bucket: &TimeBucket) -> Result<Vec<ItemKey>> {
            self.inner.list_bucket(channel_id, bucket).await
        }

        async fn delete_channel(&self, channel_id: &str) -> Result<()> {
            self.inner.delete_channel(channel_id).await
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let fixture = fixture();
        store_item(&fixture, 1000, b"payload").await;
        let flaky = Arc::new(FlakyStore {
            inner: fixture.long_term.clone(),
            failures_left: AtomicUsize::new(2),
        });
        let replicator = Replicator::new(
            fixture.metadata.clone(),
            fixture.cache.clone(),
            flaky.clone(),
            fast_config(),
        );
        let job = ReplicationJob {
            channel_id: "cid".to_string(),
            sequence: 1000,
        };

        let outcome = replicator.copy_with_retry(&job).await;
        assert!(matches!(outcome, Some(CopyOutcome::Copied { .. })));

        store_item(&fixture, 1001, b"second").await;
        flaky.failures_left.store(10, Ordering::SeqCst);
        let job = ReplicationJob {
            channel_id: "cid".to_string(),
            sequence: 1001,
        };
        assert!(replicator.copy_with_retry(&job).await.is_none());
        assert_eq!(fixture.metadata.count_pending_items("cid").expect("count"), 1);
    }

    #[tokio::test]
    async fn sweeper_requeues_pending_items() {
        let fixture = fixture();
        store_item(&fixture, 1000, b"a").await;
        store_item(&fixture, 1001, b"b").await;

        let (queue, mut receiver) = ReplicationQueue::new(8);
        let sweeper = ReplicationSweeper::new(fixture.metadata.clone(), queue, fast_config());

        sleep(Duration::from_millis(2)).await;
        assert_eq!(sweeper.sweep_once().expect("sweep"), 2);

        let first = receiver.recv().await.expect("job");
        let second = receiver.recv().await.expect("job");
        assert_eq!(first.sequence, 1000);
        assert_eq!(second.sequence, 1001);
    }

    #[tokio::test]
    async fn full_queue_does_not_block() {
        let (queue, _receiver) = ReplicationQueue::new(1);
        let job = ReplicationJob {
            channel_id: "cid".to_string(),
            sequence: 1,
        };
        assert!(queue.enqueue(job.clone()));
        assert!(!queue.enqueue(job));
    }

    /// Long-term store whose writes wait for a permit, to hold replication back.
    struct GatedStore {
        inner: Arc<FsLongTermStore>,
        gate: Semaphore,
    }

    #[async_trait]
    impl LongTermStore for GatedStore {
        async fn write_item(&self, item: &Item) -> Result<String> {
            self.gate
                .acquire()
                .await
                .map_err(|error| StrataError::LongTerm(error.to_string()))?
                .forget();
            self.inner.write_item(item).await
        }

        async fn read_item(&self, channel_id: &str, key: ItemKey) -> Result<Option<Item>> {
            self.inner.read_item(channel_id, key).await
        }

        async fn list_bucket(&self, channel_id: &str, bucket: &TimeBucket) -> Result<Vec<ItemKey>> {
            self.inner.list_bucket(channel_id, bucket).await
        }

        async fn delete_channel(&self, channel_id: &str) -> Result<()> {
            self.inner.delete_channel(channel_id).await
        }
    }

    async fn wait_for_long_term(
        tiered: &TieredStore,
        bucket: &TimeBucket,
        count: usize,
    ) -> Vec<ItemKey> {
        for _ in 0..200 {
            let keys = tiered
                .query_by_time("cid", Tier::LongTerm, bucket)
                .await
                .expect("long term listing");
            if keys.len() >= count {
                return keys;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("long term tier never reached {} items", count);
    }

    #[tokio::test]
    async fn long_term_stays_within_cache_while_lagging() {
        let fixture = fixture();
        let gated = Arc::new(GatedStore {
            inner: fixture.long_term.clone(),
            gate: Semaphore::new(0),
        });
        let (queue, receiver) = ReplicationQueue::new(16);
        let tiered = TieredStore::new(
            fixture.metadata.clone(),
            fixture.cache.clone(),
            gated.clone(),
            queue,
        );
        let replicator = Arc::new(Replicator::new(
            fixture.metadata.clone(),
            fixture.cache.clone(),
            gated.clone(),
            fast_config(),
        ));
        let handle = replicator.start(receiver);

        let mut first_timestamp = None;
        for sequence in 1000..1006 {
            let payload = Bytes::from(format!("item-{sequence}"));
            let record = ItemRecord {
                channel_id: "cid".to_string(),
                sequence,
                timestamp: Utc::now(),
                content_type: "text/plain".to_string(),
                content_language: None,
                size_bytes: payload.len() as u64,
                sha256: compute_hash(&payload),
                replication: ReplicationState::Pending,
            };
            first_timestamp.get_or_insert(record.timestamp);
            tiered
                .write(&Item { record, payload })
                .await
                .expect("write");
        }
        let bucket = TimeBucket::containing(
            first_timestamp.expect("written"),
            crate::content::TimeUnit::Day,
        );

        gated.gate.add_permits(2);
        let long_term = wait_for_long_term(&tiered, &bucket, 2).await;
        let cache = tiered
            .query_by_time("cid", Tier::Cache, &bucket)
            .await
            .expect("cache listing");
        assert_eq!(cache.len(), 6);
        assert!(long_term.len() < cache.len());
        assert!(long_term.iter().all(|key| cache.contains(key)));
        assert!(!tiered.is_converged("cid").expect("converged"));

        gated.gate.add_permits(4);
        let long_term = wait_for_long_term(&tiered, &bucket, 6).await;
        assert_eq!(long_term, cache);

        handle.abort();
    }
}
