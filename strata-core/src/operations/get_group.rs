use crate::error::{Result, StrataError};
use crate::group::GroupRecord;
use crate::storage::MetadataStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct GetGroupOperation {
    metadata: Arc<MetadataStore>,
}

impl GetGroupOperation {
    pub fn new(metadata: Arc<MetadataStore>) -> Self {
        Self { metadata }
    }

    pub async fn run(&self, name: &str) -> Result<GroupRecord> {
        self.metadata
            .get_group(name)?
            .ok_or_else(|| StrataError::GroupNotFound(name.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<GroupRecord>> {
        self.metadata.list_groups()
    }
}
