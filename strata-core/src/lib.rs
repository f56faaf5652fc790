//! Strata Core - channel registry, ingestion and tiered item storage

pub mod channel;
pub mod content;
pub mod error;
pub mod group;
pub mod group_caller;
pub mod hub;
pub mod operations;
pub mod reaper;
pub mod replication;
pub mod sequencer;
pub mod storage;

pub use channel::{ChannelConfig, ChannelNamePolicy, DEFAULT_NAME_MAX_LENGTH, normalize_tags};
pub use content::{
    DEFAULT_CONTENT_TYPE, FIRST_SEQUENCE, Item, ItemKey, ItemRecord, ItemRef, ReplicationState,
    Tier, TimeBucket, TimeUnit, micros_to_datetime,
};
pub use error::{Result, StrataError};
pub use group::{GroupConfig, GroupRecord, channel_name_from_url};
pub use group_caller::{GroupCaller, GroupDeliveryConfig};
pub use hub::{DEFAULT_MAX_PAYLOAD_BYTES, Hub, HubConfig, LongTermBackend};
pub use operations::*;
pub use reaper::{ChannelReaper, ReaperConfig};
pub use replication::{
    CopyOutcome, ReplicationConfig, ReplicationJob, ReplicationQueue, ReplicationSweeper,
    Replicator,
};
pub use sequencer::{ChannelSequencer, SequenceGuard};
pub use storage::{
    CacheStore, FsLongTermStore, LongTermStore, MetadataStore, RedisLongTermStore, TieredStore,
    WriteOutcome, compute_hash, verify_hash,
};
