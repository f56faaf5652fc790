use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Link {
    pub(crate) href: String,
}

impl Link {
    pub(crate) fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct NamedLink {
    pub(crate) name: String,
    pub(crate) href: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateChannelBody {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) ttl_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChannelLinks {
    #[serde(rename = "self")]
    pub(crate) self_link: Link,
    pub(crate) latest: Link,
    pub(crate) status: Link,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelResponse {
    pub(crate) name: String,
    pub(crate) tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ttl_days: Option<u32>,
    pub(crate) creation_date: String,
    #[serde(rename = "_links")]
    pub(crate) links: ChannelLinks,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChannelListLinks {
    #[serde(rename = "self")]
    pub(crate) self_link: Link,
    pub(crate) channels: Vec<NamedLink>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChannelListResponse {
    #[serde(rename = "_links")]
    pub(crate) links: ChannelListLinks,
}

#[derive(Debug, Serialize)]
pub(crate) struct TagListLinks {
    #[serde(rename = "self")]
    pub(crate) self_link: Link,
    pub(crate) tags: Vec<NamedLink>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TagListResponse {
    #[serde(rename = "_links")]
    pub(crate) links: TagListLinks,
}

#[derive(Debug, Serialize)]
pub(crate) struct InsertItemLinks {
    pub(crate) channel: Link,
    #[serde(rename = "self")]
    pub(crate) self_link: Link,
}

#[derive(Debug, Serialize)]
pub(crate) struct InsertItemResponse {
    pub(crate) timestamp: String,
    pub(crate) sequence: i64,
    #[serde(rename = "_links")]
    pub(crate) links: InsertItemLinks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) idempotent_replay: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocationQuery {
    #[serde(default)]
    pub(crate) location: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TimeLinks {
    #[serde(rename = "self")]
    pub(crate) self_link: Link,
    pub(crate) previous: Link,
    pub(crate) next: Link,
    pub(crate) uris: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TimeResponse {
    #[serde(rename = "_links")]
    pub(crate) links: TimeLinks,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LatestItem {
    pub(crate) sequence: i64,
    pub(crate) timestamp: String,
    pub(crate) href: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelStatusResponse {
    pub(crate) latest: Option<LatestItem>,
    pub(crate) pending_replication: u64,
    pub(crate) converged: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PutGroupBody {
    pub(crate) callback_url: String,
    pub(crate) channel_url: String,
    #[serde(default)]
    pub(crate) transactional: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroupResponse {
    pub(crate) name: String,
    pub(crate) callback_url: String,
    pub(crate) channel_url: String,
    pub(crate) transactional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) last_completed: Option<String>,
    #[serde(rename = "_links")]
    pub(crate) links: GroupLinks,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupLinks {
    #[serde(rename = "self")]
    pub(crate) self_link: Link,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupListLinks {
    #[serde(rename = "self")]
    pub(crate) self_link: Link,
    pub(crate) groups: Vec<NamedLink>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupListResponse {
    #[serde(rename = "_links")]
    pub(crate) links: GroupListLinks,
}
