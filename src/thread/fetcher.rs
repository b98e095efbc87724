use tracing::{debug, warn};

use crate::remote::{
    AnyPost, Cursor, Paginated, Post, PostId, ReferenceQuery, RemoteContentClient, RemoteError,
};

/// One page request for the direct replies of `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub parent: PostId,
    pub cursor: Option<Cursor>,
}

impl PageRequest {
    pub async fn send(
        self,
        client: &dyn RemoteContentClient,
    ) -> Result<Paginated<AnyPost>, RemoteError> {
        client
            .fetch_references(&self.parent, ReferenceQuery::comments(self.cursor))
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded(Vec<Post>),
    Failed(RemoteError),
    /// A request was already in flight or the listing is exhausted.
    Skipped,
}

/// Cursor-paginated reader of one post's direct replies.
///
/// At most one request is outstanding at a time: [`CommentFetcher::begin`] refuses
/// while loading instead of queueing. A failed page leaves the cursor where it was,
/// so the same page is asked for again on retry.
#[derive(Debug, Clone)]
pub struct CommentFetcher {
    parent: PostId,
    cursor: Option<Cursor>,
    has_more: bool,
    loading: bool,
}

impl CommentFetcher {
    pub fn new(parent: PostId) -> Self {
        Self {
            parent,
            cursor: None,
            has_more: true,
            loading: false,
        }
    }

    pub fn parent(&self) -> &PostId {
        &self.parent
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn begin(&mut self) -> Option<PageRequest> {
        if self.loading || !self.has_more {
            return None;
        }
        self.loading = true;
        Some(PageRequest {
            parent: self.parent.clone(),
            cursor: self.cursor.clone(),
        })
    }

    pub fn finish(&mut self, response: Result<Paginated<AnyPost>, RemoteError>) -> FetchOutcome {
        self.loading = false;
        let page = match response {
            Ok(page) => page,
            Err(err) => {
                warn!(parent = %self.parent, %err, "Failed to load replies");
                return FetchOutcome::Failed(err);
            }
        };
        self.has_more = page.next.is_some();
        self.cursor = page.next;
        let items = page
            .items
            .into_iter()
            .filter_map(|item| match item {
                AnyPost::Post(post) if post.comment_on.as_ref() == Some(&self.parent) => {
                    Some(*post)
                }
                AnyPost::Post(post) => {
                    warn!(
                        parent = %self.parent,
                        post = %post.id,
                        "Dropping reply that does not comment on this parent"
                    );
                    None
                }
                AnyPost::Repost { id, .. } => {
                    debug!(parent = %self.parent, repost = %id, "Skipping repost in reply listing");
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!(
            parent = %self.parent,
            loaded = items.len(),
            has_more = self.has_more,
            "Loaded replies"
        );
        FetchOutcome::Loaded(items)
    }

    pub fn reset(&mut self) {
        self.cursor = None;
        self.has_more = true;
        self.loading = false;
    }

    pub async fn fetch_next(&mut self, client: &dyn RemoteContentClient) -> FetchOutcome {
        let Some(request) = self.begin() else {
            return FetchOutcome::Skipped;
        };
        let response = request.send(client).await;
        self.finish(response)
    }
}
