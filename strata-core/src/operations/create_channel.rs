use crate::channel::{ChannelConfig, ChannelNamePolicy, normalize_tags};
use crate::error::{Result, StrataError};
use crate::storage::MetadataStore;
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct CreateChannelOperation {
    metadata: Arc<MetadataStore>,
    policy: ChannelNamePolicy,
}

#[derive(Debug, Clone)]
pub struct CreateChannelOperationRequest {
    pub name: String,
    pub tags: Vec<String>,
    pub ttl_days: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum CreateChannelOperationOutcome {
    Created(ChannelConfig),
    /// An identical channel already existed.
    Existing(ChannelConfig),
}

impl CreateChannelOperationOutcome {
    pub fn channel(&self) -> &ChannelConfig {
        match self {
            Self::Created(channel) | Self::Existing(channel) => channel,
        }
    }
}

impl CreateChannelOperation {
    pub fn new(metadata: Arc<MetadataStore>, policy: ChannelNamePolicy) -> Self {
        Self { metadata, policy }
    }

    pub async fn run(
        &self,
        request: CreateChannelOperationRequest,
    ) -> Result<CreateChannelOperationOutcome> {
        let CreateChannelOperationRequest {
            name,
            tags,
            ttl_days,
        } = request;

        self.policy.validate(&name)?;
        let tags = normalize_tags(tags)?;

        if let Some(existing) = self.metadata.get_live_channel(&name)? {
            return self.resolve_existing(existing, &tags, ttl_days);
        }

        let channel = ChannelConfig {
            channel_id: ulid::Ulid::new().to_string(),
            name: name.clone(),
            tags: tags.clone(),
            ttl_days,
            created_at: Utc::now(),
        };

        if self.metadata.insert_channel(&channel)? {
            tracing::info!(
                "created channel name={} channel_id={}",
                channel.name,
                channel.channel_id
            );
            return Ok(CreateChannelOperationOutcome::Created(channel));
        }

        // Lost a race with a concurrent create of the same name.
        match self.metadata.get_live_channel(&name)? {
            Some(existing) => self.resolve_existing(existing, &tags, ttl_days),
            None => Err(StrataError::Internal(format!(
                "channel {} could not be created",
                name
            ))),
        }
    }

    fn resolve_existing(
        &self,
        existing: ChannelConfig,
        tags: &[String],
        ttl_days: Option<u32>,
    ) -> Result<CreateChannelOperationOutcome> {
        if existing.same_settings(tags, ttl_days) {
            Ok(CreateChannelOperationOutcome::Existing(existing))
        } else {
            Err(StrataError::ChannelExists(existing.name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation() -> (tempfile::TempDir, CreateChannelOperation) {
        let dir = tempfile::tempdir().expect("tempdir");
        let metadata =
            Arc::new(MetadataStore::new(dir.path().join("meta.sqlite3")).expect("metadata"));
        (
            dir,
            CreateChannelOperation::new(metadata, ChannelNamePolicy::default()),
        )
    }

    fn request(name: &str, tags: &[&str]) -> CreateChannelOperationRequest {
        CreateChannelOperationRequest {
            name: name.to_string(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            ttl_days: None,
        }
    }

    #[tokio::test]
    async fn create_normalizes_tags() {
        let (_dir, operation) = operation();
        let outcome = operation
            .run(request("orders", &["b", "a", "b"]))
            .await
            .expect("create");

        assert!(matches!(outcome, CreateChannelOperationOutcome::Created(_)));
        assert_eq!(outcome.channel().tags, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn identical_recreate_is_existing() {
        let (_dir, operation) = operation();
        let created = operation
            .run(request("orders", &["a"]))
            .await
            .expect("create");
        let again = operation
            .run(request("orders", &["a", "a"]))
            .await
            .expect("again");

        assert!(matches!(again, CreateChannelOperationOutcome::Existing(_)));
        assert_eq!(again.channel().channel_id, created.channel().channel_id);

        let conflict = operation.run(request("orders", &["other"])).await;
        assert!(matches!(conflict, Err(StrataError::ChannelExists(_))));
    }

    #[tokio::test]
    async fn name_limits() {
        let (_dir, operation) = operation();
        let fifty = "a".repeat(50);
        assert!(operation.run(request(&fifty, &[])).await.is_ok());

        let too_long = "a".repeat(65);
        assert!(matches!(
            operation.run(request(&too_long, &[])).await,
            Err(StrataError::InvalidName(_))
        ));
        assert!(matches!(
            operation.run(request("no spaces", &[])).await,
            Err(StrataError::InvalidName(_))
        ));
    }
}
