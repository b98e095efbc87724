//! A [`RemoteContentClient`] served from an in-memory thread dump.
//!
//! The dump is the same raw payload format the protocol returns, so every response
//! still goes through boundary validation. Besides driving the binary offline, the
//! client counts calls per operation and can be told to fail the next call of a kind.

use std::{
    collections::{HashMap, VecDeque},
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::{
    errors::AppError,
    remote::{
        AnyPost, ContentDocument, ContentUri, CreatePostRequest, Cursor, Paginated, PostId,
        ReactionKind, ReferenceQuery, ReferenceType, RemoteContentClient, RemoteError, Session,
        TxHash,
        wire::{RawAccount, RawAddress, RawAnyPost, RawMetadata, RawPost, RawPostRef},
    },
};

const DEFAULT_PAGE_SIZE: usize = 10;
const CURSOR_SEPARATOR: char = '#';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchPost,
    FetchReferences,
    Upload,
    CreatePost,
    WaitForTransaction,
    AddReaction,
    UndoReaction,
    Session,
}

impl Operation {
    const COUNT: usize = 8;
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub session: Option<RawAccount>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub posts: Vec<RawAnyPost>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            session: None,
            page_size: DEFAULT_PAGE_SIZE,
            latency_ms: 0,
            posts: Vec::new(),
        }
    }
}

impl Snapshot {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn with_session(mut self, address: &str, username: &str) -> Self {
        self.session = Some(RawAccount {
            address: Some(address.to_string()),
            username: Some(username.to_string()),
            name: None,
        });
        self
    }

    /// Appends a text post. `parent` makes it a comment on that post.
    pub fn with_post(mut self, id: &str, parent: Option<&str>, content: &str) -> Self {
        let minute = self.posts.len() as u32 % 60;
        self.posts.push(RawAnyPost::Post(RawPost {
            id: Some(id.to_string()),
            author: Some(RawAccount {
                address: Some(format!("0x{:040x}", self.posts.len() + 1)),
                username: Some(format!("user{}", self.posts.len() + 1)),
                name: None,
            }),
            timestamp: Some(fixture_time(minute)),
            feed: Some(RawAddress {
                address: "0xfeed".to_string(),
            }),
            comment_on: parent.map(|id| RawPostRef { id: id.to_string() }),
            metadata: Some(RawMetadata::TextOnlyMetadata {
                content: content.to_string(),
            }),
            ..RawPost::default()
        }));
        self
    }

    pub fn with_raw(mut self, post: RawAnyPost) -> Self {
        self.posts.push(post);
        self
    }
}

fn fixture_time(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, minute, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

struct Store {
    session: Option<RawAccount>,
    page_size: usize,
    posts: Vec<RawAnyPost>,
    uploads: HashMap<ContentUri, ContentDocument>,
    pending: HashMap<TxHash, RawPost>,
    failures: HashMap<Operation, VecDeque<RemoteError>>,
    next_id: u64,
}

impl Store {
    fn find(&self, id: &PostId) -> Option<&RawAnyPost> {
        self.posts.iter().find(|p| p.id() == Some(id.as_str()))
    }

    fn find_post_mut(&mut self, id: &PostId) -> Option<&mut RawPost> {
        self.posts.iter_mut().find_map(|p| match p {
            RawAnyPost::Post(post) if post.id.as_deref() == Some(id.as_str()) => Some(post),
            _ => None,
        })
    }

    fn session(&self) -> Result<RawAccount, RemoteError> {
        self.session.clone().ok_or(RemoteError::Unauthenticated)
    }
}

pub struct SnapshotClient {
    store: Mutex<Store>,
    latency: Duration,
    calls: [AtomicUsize; Operation::COUNT],
}

impl SnapshotClient {
    pub fn new(snapshot: Snapshot) -> Self {
        let page_size = if snapshot.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            snapshot.page_size
        };
        Self {
            store: Mutex::new(Store {
                session: snapshot.session,
                page_size,
                posts: snapshot.posts,
                uploads: HashMap::new(),
                pending: HashMap::new(),
                failures: HashMap::new(),
                next_id: 1,
            }),
            latency: Duration::from_millis(snapshot.latency_ms),
            calls: Default::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;
        debug!(
            path = %path.display(),
            posts = snapshot.posts.len(),
            "Loaded thread snapshot"
        );
        Ok(Self::new(snapshot))
    }

    /// Number of calls made for `op` so far, including failed ones.
    pub fn calls(&self, op: Operation) -> usize {
        self.calls[op as usize].load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    /// Makes the next call of `op` fail with `error`.
    pub async fn fail_next(&self, op: Operation, error: RemoteError) {
        self.store
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    pub async fn set_session(&self, session: Option<RawAccount>) {
        self.store.lock().await.session = session;
    }

    pub async fn uploaded(&self, uri: &ContentUri) -> Option<ContentDocument> {
        self.store.lock().await.uploads.get(uri).cloned()
    }

    /// Text of every stored comment on `parent`, in listing order.
    pub async fn reply_texts(&self, parent: &PostId) -> Vec<String> {
        let store = self.store.lock().await;
        store
            .posts
            .iter()
            .filter_map(|p| match p {
                RawAnyPost::Post(post)
                    if post.comment_on.as_ref().map(|r| r.id.as_str()) == Some(parent.as_str()) =>
                {
                    match &post.metadata {
                        Some(RawMetadata::TextOnlyMetadata { content }) => Some(content.clone()),
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect()
    }

    async fn enter(&self, op: Operation) -> Result<(), RemoteError> {
        self.calls[op as usize].fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut store = self.store.lock().await;
        if let Some(err) = store.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            debug!(?op, %err, "Injected failure");
            return Err(err);
        }
        Ok(())
    }
}

fn encode_cursor(parent: &PostId, offset: usize) -> Cursor {
    Cursor::new(format!("{parent}{CURSOR_SEPARATOR}{offset}"))
}

fn decode_cursor(parent: &PostId, cursor: &Cursor) -> Result<usize, RemoteError> {
    let (issuer, offset) = cursor
        .as_str()
        .rsplit_once(CURSOR_SEPARATOR)
        .ok_or_else(|| RemoteError::Protocol(format!("malformed cursor `{cursor}`")))?;
    if issuer != parent.as_str() {
        return Err(RemoteError::ForeignCursor(parent.clone()));
    }
    offset
        .parse()
        .map_err(|_| RemoteError::Protocol(format!("malformed cursor `{cursor}`")))
}

#[async_trait]
impl RemoteContentClient for SnapshotClient {
    async fn fetch_post(&self, id: &PostId) -> Result<AnyPost, RemoteError> {
        self.enter(Operation::FetchPost).await?;
        let store = self.store.lock().await;
        let raw = store
            .find(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.clone()))?;
        Ok(raw.try_into()?)
    }

    #[instrument(skip(self, query), fields(cursor = ?query.cursor))]
    async fn fetch_references(
        &self,
        parent: &PostId,
        query: ReferenceQuery,
    ) -> Result<Paginated<AnyPost>, RemoteError> {
        self.enter(Operation::FetchReferences).await?;
        let store = self.store.lock().await;
        if store.find(parent).is_none() {
            return Err(RemoteError::NotFound(parent.clone()));
        }
        let offset = match &query.cursor {
            Some(cursor) => decode_cursor(parent, cursor)?,
            None => 0,
        };
        if !query.types.contains(&ReferenceType::CommentOn) {
            return Ok(Paginated {
                items: Vec::new(),
                next: None,
            });
        }
        let replies = store
            .posts
            .iter()
            .filter(|p| p.comment_on() == Some(parent.as_str()))
            .collect::<Vec<_>>();
        let items = replies
            .iter()
            .skip(offset)
            .take(store.page_size)
            .map(|raw| AnyPost::try_from((*raw).clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let end = offset + items.len();
        let next = (end < replies.len()).then(|| encode_cursor(parent, end));
        debug!(returned = items.len(), has_next = next.is_some(), "Listed replies");
        Ok(Paginated { items, next })
    }

    async fn upload_as_json(&self, document: &ContentDocument) -> Result<ContentUri, RemoteError> {
        self.enter(Operation::Upload).await?;
        let mut store = self.store.lock().await;
        let uri = ContentUri::new(format!("lens://snapshot/{}", store.next_id));
        store.next_id += 1;
        store.uploads.insert(uri.clone(), document.clone());
        Ok(uri)
    }

    async fn create_post(&self, request: CreatePostRequest) -> Result<TxHash, RemoteError> {
        self.enter(Operation::CreatePost).await?;
        let mut store = self.store.lock().await;
        let author = store.session()?;
        let parent_feed = match store.find(&request.comment_on) {
            Some(RawAnyPost::Post(parent)) => parent.feed.clone(),
            Some(RawAnyPost::Repost(_)) => {
                return Err(RemoteError::Protocol(
                    "reposts cannot be commented on".to_string(),
                ));
            }
            None => return Err(RemoteError::NotFound(request.comment_on.clone())),
        };
        let document = store
            .uploads
            .get(&request.content_uri)
            .cloned()
            .ok_or_else(|| {
                RemoteError::Protocol(format!("unknown content uri `{}`", request.content_uri))
            })?;
        let feed = request
            .feed
            .map(|f| RawAddress {
                address: f.to_string(),
            })
            .or(parent_feed);
        let n = store.next_id;
        store.next_id += 1;
        let tx = TxHash::new(format!("0xtx{n:04}"));
        store.pending.insert(
            tx.clone(),
            RawPost {
                id: Some(format!("{}-r{n}", request.comment_on)),
                author: Some(author),
                timestamp: Some(Utc::now()),
                feed,
                comment_on: Some(RawPostRef {
                    id: request.comment_on.to_string(),
                }),
                metadata: Some(RawMetadata::TextOnlyMetadata {
                    content: document.lens.content,
                }),
                ..RawPost::default()
            },
        );
        Ok(tx)
    }

    async fn wait_for_transaction(&self, tx: &TxHash) -> Result<PostId, RemoteError> {
        self.enter(Operation::WaitForTransaction).await?;
        let mut store = self.store.lock().await;
        let post = store.pending.remove(tx).ok_or_else(|| {
            RemoteError::Transaction(tx.clone(), "unknown transaction".to_string())
        })?;
        let id = post
            .id
            .clone()
            .map(PostId::new)
            .ok_or_else(|| RemoteError::Transaction(tx.clone(), "post has no id".to_string()))?;
        if let Some(parent) = post.comment_on.as_ref().map(|r| PostId::new(r.id.as_str()))
            && let Some(parent) = store.find_post_mut(&parent)
        {
            parent.stats.comments += 1;
        }
        store.posts.push(RawAnyPost::Post(post));
        Ok(id)
    }

    async fn add_reaction(&self, post: &PostId, kind: ReactionKind) -> Result<(), RemoteError> {
        self.enter(Operation::AddReaction).await?;
        let mut store = self.store.lock().await;
        store.session()?;
        let ReactionKind::Upvote = kind;
        let target = store
            .find_post_mut(post)
            .ok_or_else(|| RemoteError::NotFound(post.clone()))?;
        if !target.operations.has_upvoted {
            target.operations.has_upvoted = true;
            target.stats.reactions += 1;
        }
        Ok(())
    }

    async fn undo_reaction(&self, post: &PostId, kind: ReactionKind) -> Result<(), RemoteError> {
        self.enter(Operation::UndoReaction).await?;
        let mut store = self.store.lock().await;
        store.session()?;
        let ReactionKind::Upvote = kind;
        let target = store
            .find_post_mut(post)
            .ok_or_else(|| RemoteError::NotFound(post.clone()))?;
        if target.operations.has_upvoted {
            target.operations.has_upvoted = false;
            target.stats.reactions = target.stats.reactions.saturating_sub(1);
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, RemoteError> {
        self.enter(Operation::Session).await?;
        let store = self.store.lock().await;
        let Some(raw) = store.session.clone() else {
            return Ok(None);
        };
        Ok(Some(Session {
            account: raw.try_into()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn thread() -> SnapshotClient {
        SnapshotClient::new(
            Snapshot::new(2)
                .with_session("0xme", "me")
                .with_post("p1", None, "the post")
                .with_post("c1", Some("p1"), "one")
                .with_post("c1a", Some("c1"), "nested")
                .with_post("c2", Some("p1"), "two")
                .with_post("c3", Some("p1"), "three"),
        )
    }

    fn ids(page: &Paginated<AnyPost>) -> Vec<&str> {
        page.items.iter().map(|p| p.id().as_str()).collect()
    }

    #[tokio::test]
    async fn lists_direct_replies_in_pages() {
        let client = thread();
        let parent = PostId::new("p1");
        let first = client
            .fetch_references(&parent, ReferenceQuery::comments(None))
            .await
            .unwrap();
        assert_eq!(ids(&first), ["c1", "c2"]);
        let second = client
            .fetch_references(&parent, ReferenceQuery::comments(first.next.clone()))
            .await
            .unwrap();
        assert_eq!(ids(&second), ["c3"]);
        assert!(second.next.is_none());
        assert_eq!(client.calls(Operation::FetchReferences), 2);
    }

    #[tokio::test]
    async fn rejects_cursor_from_another_listing() {
        let client = thread();
        let first = client
            .fetch_references(&PostId::new("p1"), ReferenceQuery::comments(None))
            .await
            .unwrap();
        let err = client
            .fetch_references(&PostId::new("c1"), ReferenceQuery::comments(first.next))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::ForeignCursor(PostId::new("c1")));
    }

    #[tokio::test]
    async fn unknown_parent_is_not_found() {
        let err = thread()
            .fetch_references(&PostId::new("nope"), ReferenceQuery::comments(None))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::NotFound(PostId::new("nope")));
    }

    #[tokio::test]
    async fn created_post_appears_after_transaction_finalizes() {
        let client = thread();
        let uri = client
            .upload_as_json(&ContentDocument::text_only("four"))
            .await
            .unwrap();
        let tx = client
            .create_post(CreatePostRequest {
                content_uri: uri,
                comment_on: PostId::new("c1"),
                feed: None,
            })
            .await
            .unwrap();
        assert_eq!(client.reply_texts(&PostId::new("c1")).await, ["nested"]);
        let id = client.wait_for_transaction(&tx).await.unwrap();
        assert_eq!(
            client.reply_texts(&PostId::new("c1")).await,
            ["nested", "four"]
        );
        let parent = client
            .fetch_post(&PostId::new("c1"))
            .await
            .unwrap()
            .into_post()
            .unwrap();
        assert_eq!(parent.stats.comments, 1);
        let created = client.fetch_post(&id).await.unwrap().into_post().unwrap();
        assert_eq!(created.author.handle(), "@me");
    }

    #[tokio::test]
    async fn reactions_need_a_session() {
        let client = thread();
        client.set_session(None).await;
        let err = client
            .add_reaction(&PostId::new("c1"), ReactionKind::Upvote)
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Unauthenticated);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let client = thread();
        client
            .fail_next(
                Operation::FetchPost,
                RemoteError::Network("offline".to_string()),
            )
            .await;
        assert!(client.fetch_post(&PostId::new("p1")).await.is_err());
        assert!(client.fetch_post(&PostId::new("p1")).await.is_ok());
        assert_eq!(client.calls(Operation::FetchPost), 2);
    }

    #[tokio::test]
    async fn loads_snapshot_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "pageSize": 5,
                "posts": [{{
                    "__typename": "Post",
                    "id": "p1",
                    "author": {{ "address": "0x01" }},
                    "timestamp": "2025-01-01T00:00:00Z",
                    "feed": {{ "address": "0xfeed" }},
                    "metadata": {{ "__typename": "TextOnlyMetadata", "content": "hi" }}
                }}]
            }}"#
        )
        .unwrap();
        let client = SnapshotClient::load(file.path()).unwrap();
        assert!(client.current_session().await.unwrap().is_none());
        assert!(client.fetch_post(&PostId::new("p1")).await.is_ok());
    }
}
