//! Raw payload shapes as they arrive from the protocol, and their validation into
//! the typed model in [`crate::remote::types`].
//!
//! Every field of a raw payload is optional on the way in. Validation happens once,
//! at the boundary, so the rest of the crate never sees a half-formed post.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::remote::types::{
    Account, AccountAddress, AnyPost, ContentUri, FeedId, Post, PostBody, PostId, PostOperations,
    PostStats,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("post payload is missing `{0}`")]
    MissingField(&'static str),
    #[error("post payload has an empty `{0}`")]
    EmptyField(&'static str),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for PayloadError {
    fn from(value: serde_json::Error) -> Self {
        PayloadError::Malformed(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum RawAnyPost {
    Post(RawPost),
    Repost(RawRepost),
}

impl RawAnyPost {
    pub fn id(&self) -> Option<&str> {
        match self {
            RawAnyPost::Post(post) => post.id.as_deref(),
            RawAnyPost::Repost(repost) => repost.id.as_deref(),
        }
    }

    /// Id of the post this one comments on, if it is a comment.
    pub fn comment_on(&self) -> Option<&str> {
        match self {
            RawAnyPost::Post(post) => post.comment_on.as_ref().map(|r| r.id.as_str()),
            RawAnyPost::Repost(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPost {
    pub id: Option<String>,
    pub author: Option<RawAccount>,
    pub timestamp: Option<DateTime<Utc>>,
    pub feed: Option<RawAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_on: Option<RawPostRef>,
    pub metadata: Option<RawMetadata>,
    #[serde(default)]
    pub stats: RawStats,
    #[serde(default)]
    pub operations: RawOperations,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRepost {
    pub id: Option<String>,
    pub author: Option<RawAccount>,
    pub timestamp: Option<DateTime<Utc>>,
    pub repost_of: Option<RawPostRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAccount {
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAddress {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPostRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum RawMetadata {
    TextOnlyMetadata {
        content: String,
    },
    ArticleMetadata {
        #[serde(default)]
        title: Option<String>,
        content: String,
    },
    ImageMetadata {
        uri: String,
        #[serde(default)]
        alt: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStats {
    #[serde(default)]
    pub reactions: u64,
    #[serde(default)]
    pub comments: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperations {
    #[serde(default)]
    pub has_upvoted: bool,
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, PayloadError> {
    value.ok_or(PayloadError::MissingField(field))
}

fn non_empty(value: String, field: &'static str) -> Result<String, PayloadError> {
    if value.trim().is_empty() {
        return Err(PayloadError::EmptyField(field));
    }
    Ok(value)
}

impl TryFrom<RawAccount> for Account {
    type Error = PayloadError;

    fn try_from(raw: RawAccount) -> Result<Self, Self::Error> {
        let address = non_empty(required(raw.address, "author.address")?, "author.address")?;
        Ok(Account {
            address: AccountAddress::new(address),
            username: raw.username.map(Arc::from),
            display_name: raw.name.map(Arc::from),
        })
    }
}

impl From<RawMetadata> for PostBody {
    fn from(raw: RawMetadata) -> Self {
        match raw {
            RawMetadata::TextOnlyMetadata { content } => PostBody::Text {
                content: Arc::from(content),
            },
            RawMetadata::ArticleMetadata { title, content } => PostBody::Article {
                title: Arc::from(title.unwrap_or_default()),
                content: Arc::from(content),
            },
            RawMetadata::ImageMetadata { uri, alt } => PostBody::Image {
                uri: ContentUri::new(uri),
                alt: alt.map(Arc::from),
            },
            RawMetadata::Unknown => PostBody::Unsupported,
        }
    }
}

impl TryFrom<RawPost> for Post {
    type Error = PayloadError;

    fn try_from(raw: RawPost) -> Result<Self, Self::Error> {
        let id = non_empty(required(raw.id, "id")?, "id")?;
        Ok(Post {
            id: PostId::new(id),
            author: required(raw.author, "author")?.try_into()?,
            timestamp: required(raw.timestamp, "timestamp")?,
            feed: FeedId::new(required(raw.feed, "feed")?.address),
            comment_on: raw.comment_on.map(|r| PostId::new(r.id)),
            body: required(raw.metadata, "metadata")?.into(),
            stats: PostStats {
                reactions: raw.stats.reactions,
                comments: raw.stats.comments,
            },
            operations: PostOperations {
                has_upvoted: raw.operations.has_upvoted,
            },
        })
    }
}

impl TryFrom<RawAnyPost> for AnyPost {
    type Error = PayloadError;

    fn try_from(raw: RawAnyPost) -> Result<Self, Self::Error> {
        match raw {
            RawAnyPost::Post(post) => Ok(AnyPost::Post(Box::new(post.try_into()?))),
            RawAnyPost::Repost(repost) => Ok(AnyPost::Repost {
                id: PostId::new(non_empty(required(repost.id, "id")?, "id")?),
                author: required(repost.author, "author")?.try_into()?,
                timestamp: required(repost.timestamp, "timestamp")?,
                repost_of: PostId::new(required(repost.repost_of, "repostOf")?.id),
            }),
        }
    }
}

pub fn decode_value(value: serde_json::Value) -> Result<AnyPost, PayloadError> {
    let raw: RawAnyPost = serde_json::from_value(value)?;
    raw.try_into()
}

pub fn decode_str(json: &str) -> Result<AnyPost, PayloadError> {
    let raw: RawAnyPost = serde_json::from_str(json)?;
    raw.try_into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment_json() -> serde_json::Value {
        json!({
            "__typename": "Post",
            "id": "c1",
            "author": { "address": "0x01", "username": "alice", "name": "Alice" },
            "timestamp": "2025-03-01T10:15:00Z",
            "feed": { "address": "0xfeed" },
            "commentOn": { "id": "p1" },
            "metadata": { "__typename": "TextOnlyMetadata", "content": "first!" },
            "stats": { "reactions": 2, "comments": 1 },
            "operations": { "hasUpvoted": true }
        })
    }

    #[test]
    fn decodes_text_comment() {
        let post = decode_value(comment_json())
            .expect("valid payload")
            .into_post()
            .expect("content post");
        assert_eq!(post.id.as_str(), "c1");
        assert_eq!(post.comment_on, Some(PostId::new("p1")));
        assert_eq!(post.body.text(), Some("first!"));
        assert_eq!(post.stats.reactions, 2);
        assert!(post.operations.has_upvoted);
        assert_eq!(post.author.handle(), "Alice");
    }

    #[test]
    fn rejects_missing_author() {
        let mut value = comment_json();
        value.as_object_mut().unwrap().remove("author");
        assert_eq!(
            decode_value(value),
            Err(PayloadError::MissingField("author"))
        );
    }

    #[test]
    fn rejects_missing_metadata() {
        let mut value = comment_json();
        value["metadata"] = serde_json::Value::Null;
        assert_eq!(
            decode_value(value),
            Err(PayloadError::MissingField("metadata"))
        );
    }

    #[test]
    fn rejects_blank_id() {
        let mut value = comment_json();
        value["id"] = json!("  ");
        assert_eq!(decode_value(value), Err(PayloadError::EmptyField("id")));
    }

    #[test]
    fn unknown_metadata_is_unsupported_body() {
        let mut value = comment_json();
        value["metadata"] = json!({ "__typename": "LivestreamMetadata", "playbackUrl": "x" });
        let post = decode_value(value).unwrap().into_post().unwrap();
        assert_eq!(post.body, PostBody::Unsupported);
    }

    #[test]
    fn decodes_repost_variant() {
        let value = json!({
            "__typename": "Repost",
            "id": "r1",
            "author": { "address": "0x02" },
            "timestamp": "2025-03-01T10:15:00Z",
            "repostOf": { "id": "p1" }
        });
        let post = decode_value(value).unwrap();
        assert!(matches!(post, AnyPost::Repost { ref repost_of, .. } if repost_of.as_str() == "p1"));
        assert!(post.into_post().is_none());
    }

    #[test]
    fn wrong_shape_is_malformed() {
        assert!(matches!(
            decode_str(r#"{"__typename": "Post", "stats": "lots"}"#),
            Err(PayloadError::Malformed(_))
        ));
    }
}
