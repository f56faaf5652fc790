use crate::channel::ChannelNamePolicy;
use crate::error::{Result, StrataError};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub callback_url: String,
    /// Full URL of the watched channel, e.g. `http://hub/channel/orders`.
    pub channel_url: String,
    pub transactional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub config: GroupConfig,
    pub last_completed: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl GroupConfig {
    pub fn validate(&self, policy: &ChannelNamePolicy) -> Result<()> {
        policy
            .validate(&self.name)
            .map_err(|error| StrataError::InvalidRequest(format!("group name: {}", error)))?;

        parse_http_url("callbackUrl", &self.callback_url)?;
        parse_http_url("channelUrl", &self.channel_url)?;
        self.channel_name()?;
        Ok(())
    }

    pub fn channel_name(&self) -> Result<String> {
        channel_name_from_url(&self.channel_url)
    }

    /// Changing a transactional group, or turning a group transactional,
    /// would break its delivery ordering.
    pub fn conflicts_with(&self, existing: &GroupConfig) -> bool {
        self != existing && (self.transactional || existing.transactional)
    }
}

fn parse_http_url(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|error| StrataError::InvalidRequest(format!("{} is invalid: {}", field, error)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(StrataError::InvalidRequest(format!(
            "{} must be http or https, got {}",
            field, scheme
        ))),
    }
}

/// Extracts the channel name from `.../channel/{name}`.
pub fn channel_name_from_url(channel_url: &str) -> Result<String> {
    let url = parse_http_url("channelUrl", channel_url)?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [.., "channel", name] => Ok((*name).to_string()),
        _ => Err(StrataError::InvalidRequest(format!(
            "channelUrl does not name a channel: {}",
            channel_url
        ))),
    }
}
