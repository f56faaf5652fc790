use crate::channel::ChannelNamePolicy;
use crate::error::{Result, StrataError};
use crate::group_caller::{GroupCaller, GroupDeliveryConfig};
use crate::operations::{
    ChannelStatusOperation, CreateChannelOperation, DeleteChannelOperation, DeleteGroupOperation,
    GetChannelOperation, GetGroupOperation, InsertItemOperation, ListChannelsOperation,
    PutGroupOperation, QueryItemsOperation, ReadItemOperation,
};
use crate::reaper::{ChannelReaper, ReaperConfig};
use crate::replication::{ReplicationConfig, ReplicationQueue, ReplicationSweeper, Replicator};
use crate::sequencer::ChannelSequencer;
use crate::storage::{
    CacheStore, FsLongTermStore, LongTermStore, MetadataStore, RedisLongTermStore, TieredStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 40 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum LongTermBackend {
    /// Defaults to `{data_dir}/long_term`.
    Filesystem { path: Option<PathBuf> },
    Redis { url: String, key_prefix: String },
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub data_dir: PathBuf,
    pub long_term: LongTermBackend,
    pub name_policy: ChannelNamePolicy,
    pub max_payload_bytes: usize,
    pub replication: ReplicationConfig,
    pub reaper: ReaperConfig,
    pub groups: GroupDeliveryConfig,
}

impl HubConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            long_term: LongTermBackend::Filesystem { path: None },
            name_policy: ChannelNamePolicy::default(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            replication: ReplicationConfig::default(),
            reaper: ReaperConfig::default(),
            groups: GroupDeliveryConfig::default(),
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("meta.sqlite3")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    fn build_long_term(&self) -> Result<Arc<dyn LongTermStore>> {
        match &self.long_term {
            LongTermBackend::Filesystem { path } => {
                let root = path
                    .clone()
                    .unwrap_or_else(|| self.data_dir.join("long_term"));
                Ok(Arc::new(FsLongTermStore::new(root)?))
            }
            LongTermBackend::Redis { url, key_prefix } => {
                if key_prefix.trim().is_empty() {
                    return Err(StrataError::Config(
                        "long_term.redis.key_prefix cannot be empty".to_string(),
                    ));
                }
                Ok(Arc::new(RedisLongTermStore::new(url, key_prefix.clone())?))
            }
        }
    }
}

/// A running hub: the stores, the background tasks and one instance of
/// every operation.
pub struct Hub {
    pub metadata: Arc<MetadataStore>,
    pub tiered: Arc<TieredStore>,
    pub reaper: Arc<ChannelReaper>,
    pub replication_sweeper: Arc<ReplicationSweeper>,
    pub create_channel_operation: Arc<CreateChannelOperation>,
    pub get_channel_operation: Arc<GetChannelOperation>,
    pub list_channels_operation: Arc<ListChannelsOperation>,
    pub delete_channel_operation: Arc<DeleteChannelOperation>,
    pub insert_item_operation: Arc<InsertItemOperation>,
    pub read_item_operation: Arc<ReadItemOperation>,
    pub query_items_operation: Arc<QueryItemsOperation>,
    pub channel_status_operation: Arc<ChannelStatusOperation>,
    pub put_group_operation: Arc<PutGroupOperation>,
    pub get_group_operation: Arc<GetGroupOperation>,
    pub delete_group_operation: Arc<DeleteGroupOperation>,
    tasks: Vec<JoinHandle<()>>,
}

impl Hub {
    /// Opens the stores and starts replication, sweeping and reaping.
    pub async fn start(config: HubConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let metadata = Arc::new(MetadataStore::new(config.metadata_path())?);
        let cache = Arc::new(CacheStore::new(config.cache_path())?);
        let long_term = config.build_long_term()?;

        let (queue, receiver) = ReplicationQueue::new(config.replication.queue_capacity);
        let tiered = Arc::new(TieredStore::new(
            metadata.clone(),
            cache.clone(),
            long_term.clone(),
            queue.clone(),
        ));

        let replicator = Arc::new(Replicator::new(
            metadata.clone(),
            cache,
            long_term,
            config.replication.clone(),
        ));
        let replication_sweeper = Arc::new(ReplicationSweeper::new(
            metadata.clone(),
            queue,
            config.replication.clone(),
        ));

        let sequencer = Arc::new(ChannelSequencer::new(metadata.clone()));
        let reaper = Arc::new(ChannelReaper::new(
            tiered.clone(),
            metadata.clone(),
            sequencer.clone(),
            config.reaper.clone(),
        ));
        let group_caller = Arc::new(GroupCaller::new(metadata.clone(), config.groups.clone())?);

        let tasks = vec![
            replicator.start(receiver),
            replication_sweeper.clone().start(),
            reaper.clone().start(),
        ];

        tracing::info!(
            "hub started data_dir={} long_term={:?} replication_workers={}",
            config.data_dir.display(),
            config.long_term,
            config.replication.workers
        );

        Ok(Self {
            create_channel_operation: Arc::new(CreateChannelOperation::new(
                metadata.clone(),
                config.name_policy.clone(),
            )),
            get_channel_operation: Arc::new(GetChannelOperation::new(metadata.clone())),
            list_channels_operation: Arc::new(ListChannelsOperation::new(metadata.clone())),
            delete_channel_operation: Arc::new(DeleteChannelOperation::new(
                metadata.clone(),
                reaper.clone(),
            )),
            insert_item_operation: Arc::new(InsertItemOperation::new(
                metadata.clone(),
                tiered.clone(),
                sequencer,
                group_caller.clone(),
                config.max_payload_bytes,
            )),
            read_item_operation: Arc::new(ReadItemOperation::new(metadata.clone(), tiered.clone())),
            query_items_operation: Arc::new(QueryItemsOperation::new(
                metadata.clone(),
                tiered.clone(),
            )),
            channel_status_operation: Arc::new(ChannelStatusOperation::new(
                metadata.clone(),
                tiered.clone(),
            )),
            put_group_operation: Arc::new(PutGroupOperation::new(
                metadata.clone(),
                group_caller.clone(),
                config.name_policy,
            )),
            get_group_operation: Arc::new(GetGroupOperation::new(metadata.clone())),
            delete_group_operation: Arc::new(DeleteGroupOperation::new(
                metadata.clone(),
                group_caller,
            )),
            metadata,
            tiered,
            reaper,
            replication_sweeper,
            tasks,
        })
    }

    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.shutdown();
    }
}
