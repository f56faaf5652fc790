use crate::content::{Item, ItemKey};
use crate::error::{Result, StrataError};
use crate::storage::{Direction, MetadataStore, TieredStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct ReadItemOperation {
    metadata: Arc<MetadataStore>,
    tiered: Arc<TieredStore>,
}

#[derive(Debug, Clone)]
pub struct ReadItemOperationRequest {
    pub channel: String,
    pub sequence: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locate {
    Latest,
    Next(i64),
    Previous(i64),
}

impl ReadItemOperation {
    pub fn new(metadata: Arc<MetadataStore>, tiered: Arc<TieredStore>) -> Self {
        Self { metadata, tiered }
    }

    pub async fn run(&self, request: ReadItemOperationRequest) -> Result<Item> {
        let channel_id = self.channel_id(&request.channel)?;
        let not_found = || StrataError::ItemNotFound {
            channel: request.channel.clone(),
            sequence: request.sequence,
        };

        match self.tiered.read(&channel_id, request.sequence).await {
            Ok(Some(item)) => Ok(item),
            Ok(None) => Err(not_found()),
            Err(StrataError::ItemNotFound { .. }) => Err(not_found()),
            Err(error) => Err(error),
        }
    }

    /// Finds the newest item, or the neighbour of `sequence`.
    pub async fn locate(&self, channel: &str, locate: Locate) -> Result<Option<ItemKey>> {
        let channel_id = self.channel_id(channel)?;
        match locate {
            Locate::Latest => self.metadata.latest_item(&channel_id),
            Locate::Next(sequence) => {
                self.metadata
                    .adjacent_item(&channel_id, sequence, Direction::Next)
            }
            Locate::Previous(sequence) => {
                self.metadata
                    .adjacent_item(&channel_id, sequence, Direction::Previous)
            }
        }
    }

    fn channel_id(&self, channel: &str) -> Result<String> {
        self.metadata
            .get_live_channel(channel)?
            .map(|config| config.channel_id)
            .ok_or_else(|| StrataError::ChannelNotFound(channel.to_string()))
    }
}
