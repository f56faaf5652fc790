use crate::content::{DEFAULT_CONTENT_TYPE, Item, ItemRecord, ItemRef, ReplicationState};
use crate::error::{Result, StrataError};
use crate::group_caller::GroupCaller;
use crate::sequencer::ChannelSequencer;
use crate::storage::{MetadataStore, TieredStore, compute_hash};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct InsertItemOperation {
    metadata: Arc<MetadataStore>,
    tiered: Arc<TieredStore>,
    sequencer: Arc<ChannelSequencer>,
    groups: Arc<GroupCaller>,
    max_payload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct InsertItemOperationRequest {
    pub channel: String,
    pub payload: Bytes,
    pub content_type: Option<String>,
    pub content_language: Option<String>,
    /// Client-chosen id; a repeated id returns the item it first created.
    pub write_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InsertItemOperationResult {
    pub item: ItemRef,
    pub record: ItemRecord,
    pub replayed: bool,
}

impl InsertItemOperation {
    pub fn new(
        metadata: Arc<MetadataStore>,
        tiered: Arc<TieredStore>,
        sequencer: Arc<ChannelSequencer>,
        groups: Arc<GroupCaller>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            metadata,
            tiered,
            sequencer,
            groups,
            max_payload_bytes,
        }
    }

    pub async fn run(&self, request: InsertItemOperationRequest) -> Result<InsertItemOperationResult> {
        let InsertItemOperationRequest {
            channel,
            payload,
            content_type,
            content_language,
            write_id,
        } = request;

        if payload.len() > self.max_payload_bytes {
            return Err(StrataError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }

        let config = self
            .metadata
            .get_live_channel(&channel)?
            .ok_or_else(|| StrataError::ChannelNotFound(channel.clone()))?;

        let content_type = content_type
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let sha256 = compute_hash(&payload);

        // Held until the item is committed so sequence order is commit order.
        let mut guard = self.sequencer.lock(&config.channel_id).await?;

        // The channel may have been deleted while waiting for the guard.
        if !self.metadata.is_channel_live(&config.channel_id)? {
            return Err(StrataError::ChannelNotFound(channel));
        }

        if let Some(write_id) = &write_id {
            if let Some(record) = self
                .metadata
                .get_item_by_write_id(&config.channel_id, write_id)?
            {
                tracing::debug!(
                    "replaying insert channel={} sequence={} write_id={}",
                    config.name,
                    record.sequence,
                    write_id
                );
                return Ok(InsertItemOperationResult {
                    item: ItemRef {
                        channel: config.name,
                        sequence: record.sequence,
                        timestamp: record.timestamp,
                    },
                    record,
                    replayed: true,
                });
            }
        }

        let key = guard.next_key(Utc::now().timestamp_micros());

        let record = ItemRecord {
            channel_id: config.channel_id.clone(),
            sequence: key.sequence,
            timestamp: key.timestamp(),
            content_type,
            content_language,
            size_bytes: payload.len() as u64,
            sha256,
            replication: ReplicationState::Pending,
        };

        let item = Item {
            record: record.clone(),
            payload,
        };
        self.tiered.write_with_id(&item, write_id.as_deref()).await?;
        guard.commit(key);

        self.groups.notify(&config.name, key.sequence).await;
        drop(guard);

        tracing::debug!(
            "inserted item channel={} sequence={} bytes={}",
            config.name,
            record.sequence,
            record.size_bytes
        );

        Ok(InsertItemOperationResult {
            item: ItemRef {
                channel: config.name,
                sequence: record.sequence,
                timestamp: record.timestamp,
            },
            record,
            replayed: false,
        })
    }
}
