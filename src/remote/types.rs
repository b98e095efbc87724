use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(value: impl Into<Arc<str>>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

opaque_id!(
    /// Identity of a post or comment on the protocol.
    PostId
);
opaque_id!(
    /// Server-issued resume point for a listing. Only valid for the listing that issued it.
    Cursor
);
opaque_id!(FeedId);
opaque_id!(ContentUri);
opaque_id!(TxHash);
opaque_id!(AccountAddress);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: AccountAddress,
    pub username: Option<Arc<str>>,
    pub display_name: Option<Arc<str>>,
}

impl Account {
    /// Best human-readable label: display name, then `@username`, then the raw address.
    pub fn handle(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        if let Some(username) = self.username.as_deref() {
            return format!("@{username}");
        }
        self.address.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostBody {
    Text { content: Arc<str> },
    Article { title: Arc<str>, content: Arc<str> },
    Image { uri: ContentUri, alt: Option<Arc<str>> },
    Unsupported,
}

impl PostBody {
    /// Markdown source to display for this body, if it carries any text.
    pub fn text(&self) -> Option<&str> {
        match self {
            PostBody::Text { content } | PostBody::Article { content, .. } => Some(content),
            PostBody::Image { alt, .. } => alt.as_deref(),
            PostBody::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostStats {
    pub reactions: u64,
    pub comments: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostOperations {
    pub has_upvoted: bool,
}

/// A content post. Comments are posts with `comment_on` set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub author: Account,
    pub timestamp: DateTime<Utc>,
    pub feed: FeedId,
    pub comment_on: Option<PostId>,
    pub body: PostBody,
    pub stats: PostStats,
    pub operations: PostOperations,
}

impl Post {
    pub fn created_at(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyPost {
    Post(Box<Post>),
    Repost {
        id: PostId,
        author: Account,
        timestamp: DateTime<Utc>,
        repost_of: PostId,
    },
}

impl AnyPost {
    pub fn id(&self) -> &PostId {
        match self {
            AnyPost::Post(post) => &post.id,
            AnyPost::Repost { id, .. } => id,
        }
    }

    pub fn into_post(self) -> Option<Post> {
        match self {
            AnyPost::Post(post) => Some(*post),
            AnyPost::Repost { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceType {
    CommentOn,
    QuoteOf,
    RepostOf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceQuery {
    pub types: Vec<ReferenceType>,
    pub cursor: Option<Cursor>,
}

impl ReferenceQuery {
    pub fn comments(cursor: Option<Cursor>) -> Self {
        Self {
            types: vec![ReferenceType::CommentOn],
            cursor,
        }
    }
}

pub const TEXT_ONLY_SCHEMA: &str = "https://json-schemas.lens.dev/posts/text-only/3.0.0.json";

/// Uploadable content document for a text-only post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDocument {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub lens: DocumentBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentBody {
    pub content: String,
    pub locale: String,
    pub main_content_focus: String,
}

impl ContentDocument {
    pub fn text_only(content: impl Into<String>) -> Self {
        Self {
            schema: TEXT_ONLY_SCHEMA.to_string(),
            lens: DocumentBody {
                content: content.into(),
                locale: "en".to_string(),
                main_content_focus: "TEXT_ONLY".to_string(),
            },
        }
    }

    pub fn content(&self) -> &str {
        &self.lens.content
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePostRequest {
    pub content_uri: ContentUri,
    pub comment_on: PostId,
    pub feed: Option<FeedId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub account: Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    Upvote,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(display: Option<&str>, username: Option<&str>) -> Account {
        Account {
            address: AccountAddress::new("0xabc"),
            username: username.map(Arc::from),
            display_name: display.map(Arc::from),
        }
    }

    #[test]
    fn handle_prefers_display_name_then_username() {
        assert_eq!(account(Some("Alice"), Some("alice")).handle(), "Alice");
        assert_eq!(account(Some("  "), Some("alice")).handle(), "@alice");
        assert_eq!(account(None, None).handle(), "0xabc");
    }

    #[test]
    fn text_only_document_serializes_with_schema() {
        let doc = ContentDocument::text_only("Hello world");
        let json = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(json["$schema"], TEXT_ONLY_SCHEMA);
        assert_eq!(json["lens"]["content"], "Hello world");
        assert_eq!(json["lens"]["mainContentFocus"], "TEXT_ONLY");
    }
}
