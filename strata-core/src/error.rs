use thiserror::Error;

pub type Result<T> = std::result::Result<T, StrataError>;

#[derive(Error, Debug)]
pub enum StrataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid channel name: {0}")]
    InvalidName(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Channel already exists: {0}")]
    ChannelExists(String),

    #[error("Item not found: {channel}/{sequence}")]
    ItemNotFound { channel: String, sequence: i64 },

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Group conflict: {0}")]
    GroupConflict(String),

    #[error("Content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Long-term store error: {0}")]
    LongTerm(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrataError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StrataError::ChannelNotFound(_)
                | StrataError::ItemNotFound { .. }
                | StrataError::GroupNotFound(_)
        )
    }
}

impl From<redis::RedisError> for StrataError {
    fn from(err: redis::RedisError) -> Self {
        StrataError::LongTerm(err.to_string())
    }
}

impl From<reqwest::Error> for StrataError {
    fn from(err: reqwest::Error) -> Self {
        StrataError::Http(err.to_string())
    }
}
