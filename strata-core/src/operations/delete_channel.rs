use crate::error::Result;
use crate::reaper::ChannelReaper;
use crate::storage::MetadataStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct DeleteChannelOperation {
    metadata: Arc<MetadataStore>,
    reaper: Arc<ChannelReaper>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteChannelOperationOutcome {
    Tombstoned { channel_id: String },
    /// Nothing to delete; still reported as accepted.
    Missing,
}

impl DeleteChannelOperation {
    pub fn new(metadata: Arc<MetadataStore>, reaper: Arc<ChannelReaper>) -> Self {
        Self { metadata, reaper }
    }

    /// The name stops resolving immediately; data is removed by the reaper.
    pub async fn run(&self, name: &str) -> Result<DeleteChannelOperationOutcome> {
        match self.metadata.tombstone_channel(name)? {
            Some(channel_id) => {
                tracing::info!("deleted channel name={} channel_id={}", name, channel_id);
                self.reaper.wake();
                Ok(DeleteChannelOperationOutcome::Tombstoned { channel_id })
            }
            None => Ok(DeleteChannelOperationOutcome::Missing),
        }
    }
}
