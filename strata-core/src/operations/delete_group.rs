use crate::error::Result;
use crate::group_caller::GroupCaller;
use crate::storage::MetadataStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct DeleteGroupOperation {
    metadata: Arc<MetadataStore>,
    caller: Arc<GroupCaller>,
}

impl DeleteGroupOperation {
    pub fn new(metadata: Arc<MetadataStore>, caller: Arc<GroupCaller>) -> Self {
        Self { metadata, caller }
    }

    /// Returns whether a group was removed. Deleting a missing group is not an error.
    pub async fn run(&self, name: &str) -> Result<bool> {
        let deleted = self.metadata.delete_group(name)?;
        self.caller.forget(name).await;
        if deleted {
            tracing::info!("deleted group name={}", name);
        }
        Ok(deleted)
    }
}
