use crate::error::{Result, StrataError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_NAME_MAX_LENGTH: usize = 64;

/// Which channel names are accepted. Names end up in URL paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelNamePolicy {
    pub max_length: usize,
    /// Strict names are limited to ASCII alphanumerics, `_` and `-`.
    pub strict: bool,
}

impl Default for ChannelNamePolicy {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_NAME_MAX_LENGTH,
            strict: true,
        }
    }
}

impl ChannelNamePolicy {
    pub fn validate(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StrataError::InvalidName(
                "channel name cannot be empty".to_string(),
            ));
        }

        let length = name.chars().count();
        if length > self.max_length {
            return Err(StrataError::InvalidName(format!(
                "channel name is {} characters, limit is {}",
                length, self.max_length
            )));
        }

        let bad = if self.strict {
            name.chars()
                .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-'))
        } else {
            name.chars()
                .find(|ch| *ch == '/' || ch.is_whitespace() || ch.is_control())
        };

        if let Some(ch) = bad {
            return Err(StrataError::InvalidName(format!(
                "channel name contains invalid character {:?}",
                ch
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel_id: String,
    pub name: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_days: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl ChannelConfig {
    /// Identity and timestamps aside, two configs describe the same channel.
    pub fn same_settings(&self, tags: &[String], ttl_days: Option<u32>) -> bool {
        self.tags == tags && self.ttl_days == ttl_days
    }
}

/// Deduplicates and sorts tags. Case and content are kept as given.
pub fn normalize_tags<I, S>(tags: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut set = BTreeSet::new();
    for tag in tags {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(StrataError::InvalidRequest("tags cannot be empty".to_string()));
        }
        if tag.contains('/') {
            return Err(StrataError::InvalidRequest(format!(
                "tag cannot contain '/': {}",
                tag
            )));
        }
        set.insert(tag);
    }

    Ok(set.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifty_character_name_is_accepted() {
        let policy = ChannelNamePolicy::default();
        let name = "a".repeat(50);
        assert!(policy.validate(&name).is_ok());
    }

    #[test]
    fn empty_and_oversized_names_are_rejected() {
        let policy = ChannelNamePolicy::default();
        assert!(matches!(
            policy.validate(""),
            Err(StrataError::InvalidName(_))
        ));
        assert!(matches!(
            policy.validate(&"x".repeat(65)),
            Err(StrataError::InvalidName(_))
        ));
    }

    #[test]
    fn strictness_is_configurable() {
        let strict = ChannelNamePolicy::default();
        assert!(strict.validate("tag:z").is_err());
        assert!(strict.validate("abc_123-x").is_ok());

        let lenient = ChannelNamePolicy {
            max_length: 10,
            strict: false,
        };
        assert!(lenient.validate("tag:z.1").is_ok());
        assert!(lenient.validate("a/b").is_err());
        assert!(lenient.validate("a b").is_err());
    }

    #[test]
    fn tags_are_sorted_and_deduplicated() {
        let tags = normalize_tags(["foo-bar", "bar", "tag:z", "bar"]).unwrap();
        assert_eq!(tags, vec!["bar", "foo-bar", "tag:z"]);

        let cased = normalize_tags(["B", "a", "A"]).unwrap();
        assert_eq!(cased, vec!["A", "B", "a"]);

        assert!(normalize_tags([""]).is_err());
        assert!(normalize_tags(["a/b"]).is_err());
    }
}
