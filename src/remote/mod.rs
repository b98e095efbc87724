//! Boundary to the social-graph protocol.
//!
//! The thread engine only talks to the protocol through [`RemoteContentClient`].
//! [`snapshot::SnapshotClient`] is the in-tree implementation backed by a JSON dump.

use async_trait::async_trait;
use thiserror::Error;

pub mod snapshot;
pub mod types;
pub mod wire;

pub use types::{
    Account, AccountAddress, AnyPost, ContentDocument, ContentUri, CreatePostRequest, Cursor,
    FeedId, Paginated, Post, PostBody, PostId, PostOperations, PostStats, ReactionKind,
    ReferenceQuery, ReferenceType, Session, TxHash,
};
pub use wire::PayloadError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Protocol(String),
    #[error("post {0} not found")]
    NotFound(PostId),
    #[error("cursor was not issued for the replies of {0}")]
    ForeignCursor(PostId),
    #[error("you need to log in first")]
    Unauthenticated,
    #[error("transaction {0} failed: {1}")]
    Transaction(TxHash, String),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl RemoteError {
    /// Single-line message suitable for a toast or an inline row.
    pub fn user_message(&self) -> String {
        self.to_string().replace('\n', " ")
    }
}

#[async_trait]
pub trait RemoteContentClient: Send + Sync {
    async fn fetch_post(&self, id: &PostId) -> Result<AnyPost, RemoteError>;

    /// Lists posts referencing `parent`, one server-sized page at a time.
    async fn fetch_references(
        &self,
        parent: &PostId,
        query: ReferenceQuery,
    ) -> Result<Paginated<AnyPost>, RemoteError>;

    async fn upload_as_json(&self, document: &ContentDocument) -> Result<ContentUri, RemoteError>;

    async fn create_post(&self, request: CreatePostRequest) -> Result<TxHash, RemoteError>;

    /// Resolves once the submission is indexed, yielding the new post's id.
    async fn wait_for_transaction(&self, tx: &TxHash) -> Result<PostId, RemoteError>;

    async fn add_reaction(&self, post: &PostId, kind: ReactionKind) -> Result<(), RemoteError>;

    async fn undo_reaction(&self, post: &PostId, kind: ReactionKind) -> Result<(), RemoteError>;

    async fn current_session(&self) -> Result<Option<Session>, RemoteError>;
}
