use crate::channel::ChannelNamePolicy;
use crate::error::Result;
use crate::group::{GroupConfig, GroupRecord};
use crate::group_caller::GroupCaller;
use crate::storage::{GroupPut, MetadataStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct PutGroupOperation {
    metadata: Arc<MetadataStore>,
    caller: Arc<GroupCaller>,
    policy: ChannelNamePolicy,
}

#[derive(Debug, Clone)]
pub enum PutGroupOperationOutcome {
    Created(GroupRecord),
    Unchanged(GroupRecord),
    Replaced(GroupRecord),
}

impl PutGroupOperationOutcome {
    pub fn group(&self) -> &GroupRecord {
        match self {
            Self::Created(group) | Self::Unchanged(group) | Self::Replaced(group) => group,
        }
    }
}

impl PutGroupOperation {
    pub fn new(
        metadata: Arc<MetadataStore>,
        caller: Arc<GroupCaller>,
        policy: ChannelNamePolicy,
    ) -> Self {
        Self {
            metadata,
            caller,
            policy,
        }
    }

    pub async fn run(&self, group: GroupConfig) -> Result<PutGroupOperationOutcome> {
        group.validate(&self.policy)?;

        let (put, stored) = self.metadata.put_group(&group)?;
        if put == GroupPut::Unchanged {
            return Ok(PutGroupOperationOutcome::Unchanged(stored));
        }
        self.caller.forget(&group.name).await;

        tracing::info!(
            "stored group name={} channel_url={} transactional={}",
            group.name,
            group.channel_url,
            group.transactional
        );

        Ok(match put {
            GroupPut::Replaced => PutGroupOperationOutcome::Replaced(stored),
            _ => PutGroupOperationOutcome::Created(stored),
        })
    }
}
