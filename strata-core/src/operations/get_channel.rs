use crate::channel::ChannelConfig;
use crate::error::{Result, StrataError};
use crate::storage::MetadataStore;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct GetChannelOperation {
    metadata: Arc<MetadataStore>,
}

impl GetChannelOperation {
    pub fn new(metadata: Arc<MetadataStore>) -> Self {
        Self { metadata }
    }

    pub async fn run(&self, name: &str) -> Result<ChannelConfig> {
        self.metadata
            .get_live_channel(name)?
            .ok_or_else(|| StrataError::ChannelNotFound(name.to_string()))
    }
}

#[derive(Clone)]
pub struct ListChannelsOperation {
    metadata: Arc<MetadataStore>,
}

#[derive(Debug, Clone, Default)]
pub struct ListChannelsOperationRequest {
    /// Only channels carrying this tag.
    pub tag: Option<String>,
}

impl ListChannelsOperation {
    pub fn new(metadata: Arc<MetadataStore>) -> Self {
        Self { metadata }
    }

    pub async fn run(&self, request: ListChannelsOperationRequest) -> Result<Vec<ChannelConfig>> {
        let channels = self.metadata.list_live_channels()?;
        Ok(match request.tag {
            Some(tag) => channels
                .into_iter()
                .filter(|channel| channel.tags.iter().any(|candidate| *candidate == tag))
                .collect(),
            None => channels,
        })
    }

    /// Every tag used by a live channel, sorted.
    pub async fn tags(&self) -> Result<Vec<String>> {
        let tags: BTreeSet<String> = self
            .metadata
            .list_live_channels()?
            .into_iter()
            .flat_map(|channel| channel.tags)
            .collect();
        Ok(tags.into_iter().collect())
    }
}
