pub mod channel_status;
pub mod create_channel;
pub mod delete_channel;
pub mod delete_group;
pub mod get_channel;
pub mod get_group;
pub mod insert_item;
pub mod put_group;
pub mod query_items;
pub mod read_item;

pub use channel_status::{ChannelStatus, ChannelStatusOperation};
pub use create_channel::{
    CreateChannelOperation, CreateChannelOperationOutcome, CreateChannelOperationRequest,
};
pub use delete_channel::{DeleteChannelOperation, DeleteChannelOperationOutcome};
pub use delete_group::DeleteGroupOperation;
pub use get_channel::{GetChannelOperation, ListChannelsOperation, ListChannelsOperationRequest};
pub use get_group::GetGroupOperation;
pub use insert_item::{
    InsertItemOperation, InsertItemOperationRequest, InsertItemOperationResult,
};
pub use put_group::{PutGroupOperation, PutGroupOperationOutcome};
pub use query_items::{
    QueryItemsOperation, QueryItemsOperationRequest, QueryItemsOperationResult,
};
pub use read_item::{Locate, ReadItemOperation, ReadItemOperationRequest};
