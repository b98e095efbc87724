use tracing::{info, instrument, warn};

use crate::remote::{
    AnyPost, ContentDocument, CreatePostRequest, PostId, RemoteContentClient, RemoteError,
    Session,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerView {
    /// No session: show a login prompt instead of the input.
    LoginRequired,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitBlocked {
    Empty,
    Unauthenticated,
    InFlight,
}

impl SubmitBlocked {
    pub fn message(self) -> &'static str {
        match self {
            SubmitBlocked::Empty => "Reply cannot be empty.",
            SubmitBlocked::Unauthenticated => "Log in to reply.",
            SubmitBlocked::InFlight => "Already sending.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Posted { post: PostId, content: String },
    Failed(RemoteError),
}

/// Trimmed reply text bound to its parent, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitTicket {
    pub parent: PostId,
    pub content: String,
}

impl SubmitTicket {
    /// Resolves the parent's feed, uploads the document, submits the post and
    /// waits for it to be indexed.
    #[instrument(skip(self, client), fields(parent = %self.parent))]
    pub async fn publish(&self, client: &dyn RemoteContentClient) -> Result<PostId, RemoteError> {
        let feed = match client.fetch_post(&self.parent).await? {
            AnyPost::Post(parent) => parent.feed,
            AnyPost::Repost { .. } => {
                return Err(RemoteError::Protocol(
                    "cannot reply to a repost".to_string(),
                ));
            }
        };
        let document = ContentDocument::text_only(self.content.as_str());
        let content_uri = client.upload_as_json(&document).await?;
        let tx = client
            .create_post(CreatePostRequest {
                content_uri,
                comment_on: self.parent.clone(),
                feed: Some(feed),
            })
            .await?;
        client.wait_for_transaction(&tx).await
    }
}

#[derive(Debug, Clone)]
pub struct ReplyComposer {
    parent: PostId,
    content: String,
    submitting: bool,
    last_error: Option<String>,
}

impl ReplyComposer {
    pub fn new(parent: PostId) -> Self {
        Self {
            parent,
            content: String::new(),
            submitting: false,
            last_error: None,
        }
    }

    pub fn parent(&self) -> &PostId {
        &self.parent
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn insert(&mut self, ch: char) {
        self.content.push(ch);
    }

    pub fn backspace(&mut self) {
        self.content.pop();
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn view(&self, session: Option<&Session>) -> ComposerView {
        if session.is_some() {
            ComposerView::Editing
        } else {
            ComposerView::LoginRequired
        }
    }

    pub fn begin_submit(&mut self, session: Option<&Session>) -> Result<SubmitTicket, SubmitBlocked> {
        if self.submitting {
            return Err(SubmitBlocked::InFlight);
        }
        if session.is_none() {
            return Err(SubmitBlocked::Unauthenticated);
        }
        let trimmed = self.content.trim();
        if trimmed.is_empty() {
            self.last_error = Some(SubmitBlocked::Empty.message().to_string());
            return Err(SubmitBlocked::Empty);
        }
        self.submitting = true;
        self.last_error = None;
        Ok(SubmitTicket {
            parent: self.parent.clone(),
            content: trimmed.to_string(),
        })
    }

    /// Releases the in-flight guard whatever the result. Typed text survives failures.
    pub fn finish_submit(
        &mut self,
        ticket: SubmitTicket,
        result: Result<PostId, RemoteError>,
    ) -> SubmitOutcome {
        self.submitting = false;
        match result {
            Ok(post) => {
                info!(parent = %self.parent, %post, "Reply posted");
                self.content.clear();
                self.last_error = None;
                SubmitOutcome::Posted {
                    post,
                    content: ticket.content,
                }
            }
            Err(err) => {
                warn!(parent = %self.parent, %err, "Reply failed");
                self.last_error = Some(err.user_message());
                SubmitOutcome::Failed(err)
            }
        }
    }

    pub async fn submit(
        &mut self,
        client: &dyn RemoteContentClient,
        session: Option<&Session>,
    ) -> Result<SubmitOutcome, SubmitBlocked> {
        let ticket = self.begin_submit(session)?;
        let result = ticket.publish(client).await;
        Ok(self.finish_submit(ticket, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::snapshot::{Operation, Snapshot, SnapshotClient};

    fn client() -> SnapshotClient {
        SnapshotClient::new(
            Snapshot::new(5)
                .with_session("0xme", "me")
                .with_post("p1", None, "post"),
        )
    }

    async fn session(client: &SnapshotClient) -> Option<Session> {
        client.current_session().await.unwrap()
    }

    #[tokio::test]
    async fn trims_and_clears_after_success() {
        let client = client();
        let session = session(&client).await;
        let mut composer = ReplyComposer::new(PostId::new("p1"));
        composer.set_content("Hello world  ");
        let outcome = composer.submit(&client, session.as_ref()).await.unwrap();
        let SubmitOutcome::Posted { content, .. } = outcome else {
            panic!("expected a posted reply");
        };
        assert_eq!(content, "Hello world");
        assert_eq!(composer.content(), "");
        assert!(!composer.is_submitting());
        assert_eq!(
            client.reply_texts(&PostId::new("p1")).await,
            ["Hello world"]
        );
        assert_eq!(
            client
                .uploaded(&crate::remote::ContentUri::new("lens://snapshot/1"))
                .await
                .map(|doc| doc.content().to_string()),
            Some("Hello world".to_string())
        );
    }

    #[tokio::test]
    async fn whitespace_never_reaches_the_network() {
        let client = client();
        let session = session(&client).await;
        let before = client.total_calls();
        let mut composer = ReplyComposer::new(PostId::new("p1"));
        for input in ["", "   ", "\n\t "] {
            composer.set_content(input);
            assert_eq!(
                composer.submit(&client, session.as_ref()).await,
                Err(SubmitBlocked::Empty)
            );
        }
        assert_eq!(client.total_calls(), before);
    }

    #[tokio::test]
    async fn keeps_content_when_upload_fails() {
        let client = client();
        let session = session(&client).await;
        client
            .fail_next(Operation::Upload, RemoteError::Network("timeout".to_string()))
            .await;
        let mut composer = ReplyComposer::new(PostId::new("p1"));
        composer.set_content("draft reply");
        let outcome = composer.submit(&client, session.as_ref()).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Failed(RemoteError::Network(_))));
        assert_eq!(composer.content(), "draft reply");
        assert_eq!(composer.last_error(), Some("network error: timeout"));
        assert!(!composer.is_submitting());
        assert_eq!(client.calls(Operation::CreatePost), 0);
    }

    #[test]
    fn logged_out_shows_login_prompt() {
        let mut composer = ReplyComposer::new(PostId::new("p1"));
        composer.set_content("hi");
        assert_eq!(composer.view(None), ComposerView::LoginRequired);
        assert_eq!(composer.begin_submit(None), Err(SubmitBlocked::Unauthenticated));
    }

    #[test]
    fn rejects_reentrant_submit() {
        let session = Session {
            account: crate::remote::Account {
                address: crate::remote::AccountAddress::new("0xme"),
                username: None,
                display_name: None,
            },
        };
        let mut composer = ReplyComposer::new(PostId::new("p1"));
        composer.set_content("once");
        let ticket = composer.begin_submit(Some(&session)).unwrap();
        assert_eq!(
            composer.begin_submit(Some(&session)),
            Err(SubmitBlocked::InFlight)
        );
        composer.finish_submit(ticket, Err(RemoteError::Unauthenticated));
        assert!(composer.begin_submit(Some(&session)).is_ok());
    }
}
