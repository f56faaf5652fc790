use crate::content::ItemKey;
use crate::error::{Result, StrataError};
use crate::storage::{MetadataStore, TieredStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct ChannelStatusOperation {
    metadata: Arc<MetadataStore>,
    tiered: Arc<TieredStore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub latest: Option<ItemKey>,
    pub pending_replication: u64,
    pub converged: bool,
}

impl ChannelStatusOperation {
    pub fn new(metadata: Arc<MetadataStore>, tiered: Arc<TieredStore>) -> Self {
        Self { metadata, tiered }
    }

    pub async fn run(&self, channel: &str) -> Result<ChannelStatus> {
        let config = self
            .metadata
            .get_live_channel(channel)?
            .ok_or_else(|| StrataError::ChannelNotFound(channel.to_string()))?;

        let latest = self.metadata.latest_item(&config.channel_id)?;
        let pending_replication = self.tiered.pending_replications(&config.channel_id)?;

        Ok(ChannelStatus {
            latest,
            pending_replication,
            converged: pending_replication == 0,
        })
    }
}
