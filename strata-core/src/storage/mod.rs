//! Storage modules for strata
//!
//! The cache tier keeps payloads on local disk, the metadata store indexes
//! them, and the long-term tier archives self-describing copies.

pub mod cache_store;
pub mod long_term_store;
pub mod metadata_store;
pub mod tiered;

pub use cache_store::{CacheStore, PutItemResult, compute_hash, verify_hash};
pub use long_term_store::{
    FsLongTermStore, LongTermStore, RedisLongTermStore, decode_envelope, encode_envelope,
};
pub use metadata_store::{Direction, GroupPut, MetadataStore};
pub use tiered::{TieredStore, WriteOutcome};
