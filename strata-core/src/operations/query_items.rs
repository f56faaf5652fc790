use crate::channel::ChannelConfig;
use crate::content::{ItemKey, Tier, TimeBucket};
use crate::error::{Result, StrataError};
use crate::storage::{MetadataStore, TieredStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct QueryItemsOperation {
    metadata: Arc<MetadataStore>,
    tiered: Arc<TieredStore>,
}

#[derive(Debug, Clone)]
pub struct QueryItemsOperationRequest {
    pub channel: String,
    pub bucket: TimeBucket,
    pub tier: Tier,
}

#[derive(Debug, Clone)]
pub struct QueryItemsOperationResult {
    pub channel: ChannelConfig,
    /// Ascending by sequence.
    pub items: Vec<ItemKey>,
}

impl QueryItemsOperation {
    pub fn new(metadata: Arc<MetadataStore>, tiered: Arc<TieredStore>) -> Self {
        Self { metadata, tiered }
    }

    pub async fn run(&self, request: QueryItemsOperationRequest) -> Result<QueryItemsOperationResult> {
        let channel = self
            .metadata
            .get_live_channel(&request.channel)?
            .ok_or_else(|| StrataError::ChannelNotFound(request.channel.clone()))?;

        let mut items = self
            .tiered
            .query_by_time(&channel.channel_id, request.tier, &request.bucket)
            .await?;
        items.sort_by_key(|key| key.sequence);
        items.dedup();

        Ok(QueryItemsOperationResult { channel, items })
    }
}
