use crate::content::{Item, ItemKey, ReplicationState, Tier, TimeBucket};
use crate::error::{Result, StrataError};
use crate::replication::{ReplicationJob, ReplicationQueue};
use crate::storage::{CacheStore, LongTermStore, MetadataStore};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// False when the item was already stored (re-delivery).
    pub applied: bool,
    pub cache_path: String,
}

/// Front door to both storage tiers. Writes land in the cache tier and the
/// index synchronously; the long-term copy is made by the replication workers.
pub struct TieredStore {
    metadata: Arc<MetadataStore>,
    cache: Arc<CacheStore>,
    long_term: Arc<dyn LongTermStore>,
    queue: ReplicationQueue,
}

impl TieredStore {
    pub fn new(
        metadata: Arc<MetadataStore>,
        cache: Arc<CacheStore>,
        long_term: Arc<dyn LongTermStore>,
        queue: ReplicationQueue,
    ) -> Self {
        Self {
            metadata,
            cache,
            long_term,
            queue,
        }
    }

    pub fn metadata(&self) -> &Arc<MetadataStore> {
        &self.metadata
    }

    pub async fn write(&self, item: &Item) -> Result<WriteOutcome> {
        self.write_with_id(item, None).await
    }

    /// Like `write`, also recording the client's write id in the index so a
    /// retry of the same insert can be found again.
    pub async fn write_with_id(&self, item: &Item, write_id: Option<&str>) -> Result<WriteOutcome> {
        let record = &item.record;
        let put = self
            .cache
            .put_item(
                &record.channel_id,
                record.sequence,
                &record.sha256,
                &item.payload,
            )
            .await?;

        let cache_path = put.item_path.to_string_lossy().to_string();
        let mut pending = record.clone();
        pending.replication = ReplicationState::Pending;

        let applied =
            self.metadata
                .insert_item_with_write_id(&pending, Some(cache_path.as_str()), write_id)?;
        if applied {
            self.queue.enqueue(ReplicationJob {
                channel_id: record.channel_id.clone(),
                sequence: record.sequence,
            });
        } else {
            tracing::debug!(
                "item already stored channel_id={} sequence={}",
                record.channel_id,
                record.sequence
            );
        }

        Ok(WriteOutcome {
            applied,
            cache_path,
        })
    }

    pub async fn query_by_time(
        &self,
        channel_id: &str,
        tier: Tier,
        bucket: &TimeBucket,
    ) -> Result<Vec<ItemKey>> {
        match tier {
            Tier::Cache => self.metadata.list_items_between(
                channel_id,
                bucket.start_micros(),
                bucket.end_micros(),
            ),
            Tier::LongTerm => self.long_term.list_bucket(channel_id, bucket).await,
        }
    }

    /// Reads from the cache tier, falling back to the long-term copy.
    pub async fn read(&self, channel_id: &str, sequence: i64) -> Result<Option<Item>> {
        let Some(record) = self.metadata.get_item(channel_id, sequence)? else {
            return Ok(None);
        };

        match self
            .cache
            .get_item(channel_id, sequence, &record.sha256)
            .await
        {
            Ok(payload) => return Ok(Some(Item { record, payload })),
            Err(StrataError::ItemNotFound { .. }) => {
                tracing::warn!(
                    "cache miss for indexed item channel_id={} sequence={}, reading long-term copy",
                    channel_id,
                    sequence
                );
            }
            Err(error) => return Err(error),
        }

        let archived = self.long_term.read_item(channel_id, record.key()).await?;
        Ok(archived.map(|item| Item {
            record,
            payload: item.payload,
        }))
    }

    pub async fn read_long_term(&self, channel_id: &str, key: ItemKey) -> Result<Option<Item>> {
        self.long_term.read_item(channel_id, key).await
    }

    pub fn pending_replications(&self, channel_id: &str) -> Result<u64> {
        self.metadata.count_pending_items(channel_id)
    }

    pub fn is_converged(&self, channel_id: &str) -> Result<bool> {
        Ok(self.pending_replications(channel_id)? == 0)
    }

    /// Long-term objects go first so that tier never outlives the cache.
    pub async fn purge_channel(&self, channel_id: &str) -> Result<usize> {
        self.long_term.delete_channel(channel_id).await?;
        self.cache.delete_channel(channel_id).await?;
        self.metadata.purge_channel(channel_id)
    }
}
