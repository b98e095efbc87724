use tracing::{info, warn};

use crate::remote::{Post, PostId, ReactionKind, RemoteContentClient, RemoteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionSummary {
    pub upvote_count: u64,
    pub comment_count: u64,
    pub has_upvoted: bool,
    pub is_logged_in: bool,
}

/// A pending like/unlike mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleRequest {
    pub post: PostId,
    pub undo: bool,
}

impl ToggleRequest {
    pub async fn send(&self, client: &dyn RemoteContentClient) -> Result<(), RemoteError> {
        if self.undo {
            client.undo_reaction(&self.post, ReactionKind::Upvote).await
        } else {
            client.add_reaction(&self.post, ReactionKind::Upvote).await
        }
    }
}

/// Like state of one post. Counts only move once the remote call has succeeded.
#[derive(Debug, Clone)]
pub struct ReactionController {
    post: PostId,
    upvotes: u64,
    comments: u64,
    has_upvoted: bool,
    pending: bool,
}

impl ReactionController {
    pub fn from_post(post: &Post) -> Self {
        Self {
            post: post.id.clone(),
            upvotes: post.stats.reactions,
            comments: post.stats.comments,
            has_upvoted: post.operations.has_upvoted,
            pending: false,
        }
    }

    pub fn summary(&self, logged_in: bool) -> ReactionSummary {
        ReactionSummary {
            upvote_count: self.upvotes,
            comment_count: self.comments,
            has_upvoted: self.has_upvoted,
            is_logged_in: logged_in,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_disabled(&self, logged_in: bool) -> bool {
        !logged_in || self.pending
    }

    pub fn begin_toggle(&mut self, logged_in: bool) -> Option<ToggleRequest> {
        if self.is_disabled(logged_in) {
            return None;
        }
        self.pending = true;
        Some(ToggleRequest {
            post: self.post.clone(),
            undo: self.has_upvoted,
        })
    }

    pub fn finish_toggle(&mut self, result: Result<(), RemoteError>) -> Result<(), RemoteError> {
        self.pending = false;
        if let Err(err) = result {
            warn!(post = %self.post, %err, "Reaction toggle failed");
            return Err(err);
        }
        if self.has_upvoted {
            self.has_upvoted = false;
            self.upvotes = self.upvotes.saturating_sub(1);
        } else {
            self.has_upvoted = true;
            self.upvotes += 1;
        }
        info!(post = %self.post, upvoted = self.has_upvoted, "Reaction toggled");
        Ok(())
    }

    pub fn record_reply(&mut self) {
        self.comments += 1;
    }

    /// Returns `Ok(false)` when the control is disabled and nothing was sent.
    pub async fn toggle_like(
        &mut self,
        client: &dyn RemoteContentClient,
        logged_in: bool,
    ) -> Result<bool, RemoteError> {
        let Some(request) = self.begin_toggle(logged_in) else {
            return Ok(false);
        };
        let result = request.send(client).await;
        self.finish_toggle(result).map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{
        RemoteContentClient,
        snapshot::{Operation, Snapshot, SnapshotClient},
    };

    async fn setup() -> (SnapshotClient, ReactionController) {
        let client = SnapshotClient::new(
            Snapshot::new(5)
                .with_session("0xme", "me")
                .with_post("p1", None, "post")
                .with_post("c1", Some("p1"), "hi"),
        );
        let post = client
            .fetch_post(&PostId::new("c1"))
            .await
            .unwrap()
            .into_post()
            .unwrap();
        (client, ReactionController::from_post(&post))
    }

    #[tokio::test]
    async fn logged_out_toggle_sends_nothing() {
        let (client, mut reactions) = setup().await;
        assert!(reactions.is_disabled(false));
        assert_eq!(reactions.toggle_like(&client, false).await, Ok(false));
        assert_eq!(client.calls(Operation::AddReaction), 0);
        assert_eq!(client.calls(Operation::UndoReaction), 0);
        assert_eq!(reactions.summary(false).upvote_count, 0);
    }

    #[tokio::test]
    async fn toggles_like_and_unlike() {
        let (client, mut reactions) = setup().await;
        assert_eq!(reactions.toggle_like(&client, true).await, Ok(true));
        let summary = reactions.summary(true);
        assert!(summary.has_upvoted);
        assert_eq!(summary.upvote_count, 1);
        assert_eq!(reactions.toggle_like(&client, true).await, Ok(true));
        assert!(!reactions.summary(true).has_upvoted);
        assert_eq!(client.calls(Operation::AddReaction), 1);
        assert_eq!(client.calls(Operation::UndoReaction), 1);
    }

    #[test]
    fn pending_toggle_disables_control() {
        let mut reactions = ReactionController {
            post: PostId::new("c1"),
            upvotes: 4,
            comments: 0,
            has_upvoted: true,
            pending: false,
        };
        let request = reactions.begin_toggle(true).unwrap();
        assert!(request.undo);
        assert!(reactions.begin_toggle(true).is_none());
        assert!(reactions
            .finish_toggle(Err(RemoteError::Network("down".to_string())))
            .is_err());
        assert!(!reactions.is_pending());
        assert_eq!(reactions.summary(true).upvote_count, 4);
        assert!(reactions.summary(true).has_upvoted);
    }
}
