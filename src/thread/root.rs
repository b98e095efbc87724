use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::{
    config::ThreadSettings,
    remote::{AnyPost, Paginated, Post, PostId, RemoteContentClient, RemoteError, Session},
    thread::{
        Notice, ThreadEvent,
        arena::{Applied, FetchTicket, ListOwner, NodeId, ShowReplies, ThreadRow, ThreadTree},
        composer::{ComposerView, ReplyComposer, SubmitBlocked, SubmitOutcome, SubmitTicket},
        fetcher::PageRequest,
        reactions::{ReactionController, ToggleRequest},
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThreadMode {
    /// Inline preview: a few top-level replies and a "view all" row.
    Preview,
    #[default]
    Full,
}

/// Scroll state of the rendered thread, in rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollPosition {
    pub offset: usize,
    pub viewport: usize,
    pub content: usize,
}

impl ScrollPosition {
    pub fn remaining(&self) -> usize {
        self.content.saturating_sub(self.offset + self.viewport)
    }
}

#[derive(Debug, Clone)]
pub struct FetchDone {
    pub ticket: FetchTicket,
    pub response: Result<Paginated<AnyPost>, RemoteError>,
}

/// A page request that may run on another task.
#[derive(Debug, Clone)]
pub struct PendingFetch {
    pub ticket: FetchTicket,
    pub request: PageRequest,
    cancel: CancellationToken,
}

impl PendingFetch {
    /// `None` when the thread was reset before the response arrived.
    pub async fn run(self, client: &dyn RemoteContentClient) -> Option<FetchDone> {
        let Self {
            ticket,
            request,
            cancel,
        } = self;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(?ticket, "Reply fetch cancelled");
                None
            }
            response = request.send(client) => Some(FetchDone { ticket, response }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplyDone {
    pub owner: ListOwner,
    pub epoch: u64,
    pub ticket: SubmitTicket,
    pub result: Result<PostId, RemoteError>,
}

#[derive(Debug, Clone)]
pub struct PendingReply {
    pub owner: ListOwner,
    pub epoch: u64,
    pub ticket: SubmitTicket,
    cancel: CancellationToken,
}

impl PendingReply {
    pub async fn run(self, client: &dyn RemoteContentClient) -> Option<ReplyDone> {
        let Self {
            owner,
            epoch,
            ticket,
            cancel,
        } = self;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(parent = %ticket.parent, "Reply submission cancelled");
                None
            }
            result = ticket.publish(client) => Some(ReplyDone { owner, epoch, ticket, result }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToggleDone {
    pub owner: ListOwner,
    pub epoch: u64,
    pub result: Result<(), RemoteError>,
}

#[derive(Debug, Clone)]
pub struct PendingToggle {
    pub owner: ListOwner,
    pub epoch: u64,
    pub request: ToggleRequest,
    cancel: CancellationToken,
}

impl PendingToggle {
    pub async fn run(self, client: &dyn RemoteContentClient) -> Option<ToggleDone> {
        let Self {
            owner,
            epoch,
            request,
            cancel,
        } = self;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = request.send(client) => Some(ToggleDone { owner, epoch, result }),
        }
    }
}

/// Entry point of one comment thread.
///
/// Owns the tree for the current top-level post and hands events to a single
/// subscriber. Changing the post never merges: the tree is rebuilt under a new epoch
/// and outstanding requests are cancelled.
pub struct CommentThreadRoot {
    client: Arc<dyn RemoteContentClient>,
    session: Option<Session>,
    settings: ThreadSettings,
    mode: ThreadMode,
    tree: ThreadTree,
    subject: Option<Post>,
    subject_reactions: Option<ReactionController>,
    cancel: CancellationToken,
    events: UnboundedSender<ThreadEvent>,
}

impl CommentThreadRoot {
    pub fn new(
        client: Arc<dyn RemoteContentClient>,
        session: Option<Session>,
        settings: ThreadSettings,
        mode: ThreadMode,
        post: PostId,
        events: UnboundedSender<ThreadEvent>,
    ) -> Self {
        let max_nesting = nesting_for(&settings, mode);
        Self {
            client,
            session,
            settings,
            mode,
            tree: ThreadTree::new(post, max_nesting, 1),
            subject: None,
            subject_reactions: None,
            cancel: CancellationToken::new(),
            events,
        }
    }

    pub fn client(&self) -> Arc<dyn RemoteContentClient> {
        Arc::clone(&self.client)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn set_session(&mut self, session: Option<Session>) {
        self.session = session;
    }

    pub fn settings(&self) -> &ThreadSettings {
        &self.settings
    }

    pub fn mode(&self) -> ThreadMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ThreadMode) {
        self.mode = mode;
        self.tree.set_max_nesting(nesting_for(&self.settings, mode));
    }

    pub fn tree(&self) -> &ThreadTree {
        &self.tree
    }

    pub fn post(&self) -> &PostId {
        self.tree.post()
    }

    /// The top-level post itself, when the caller has it.
    pub fn subject(&self) -> Option<&Post> {
        self.subject.as_ref()
    }

    pub fn set_subject(&mut self, post: Post) {
        if &post.id != self.tree.post() {
            debug!(subject = %post.id, post = %self.tree.post(), "Ignoring subject of another post");
            return;
        }
        self.subject_reactions = Some(ReactionController::from_post(&post));
        self.subject = Some(post);
    }

    pub fn auto_expand(&mut self, post: PostId) {
        self.tree.auto_expand(post);
    }

    pub fn rows(&self) -> Vec<ThreadRow> {
        let limit = match self.mode {
            ThreadMode::Preview => Some(self.settings.preview_limit),
            ThreadMode::Full => None,
        };
        self.tree.rows(limit)
    }

    fn emit(&self, event: ThreadEvent) {
        if let Err(err) = self.events.send(event) {
            debug!(event = ?err.0, "Thread event has no subscriber");
        }
    }

    fn pending(&self, (ticket, request): (FetchTicket, PageRequest)) -> PendingFetch {
        PendingFetch {
            ticket,
            request,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn mount(&mut self) -> Option<PendingFetch> {
        let fetch = self.tree.load_top()?;
        info!(post = %self.tree.post(), mode = ?self.mode, "Loading thread");
        Some(self.pending(fetch))
    }

    /// Same id is a no-op. A new id resets everything.
    pub fn set_post(&mut self, post: PostId) -> Option<PendingFetch> {
        if &post == self.tree.post() {
            return None;
        }
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        let epoch = self.tree.epoch() + 1;
        self.tree = ThreadTree::new(post, nesting_for(&self.settings, self.mode), epoch);
        self.subject = None;
        self.subject_reactions = None;
        self.mount()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn show_replies(&mut self, id: NodeId) -> Option<PendingFetch> {
        match self.tree.show_replies(id) {
            ShowReplies::Fetch(ticket, request) => Some(self.pending((ticket, request))),
            ShowReplies::MaxNestingReached(post) => {
                debug!(%post, "Max nesting reached");
                self.emit(ThreadEvent::MaxNestingReached { post });
                None
            }
            ShowReplies::Shown | ShowReplies::Hidden | ShowReplies::Busy | ShowReplies::Missing => {
                None
            }
        }
    }

    pub fn load_more(&mut self, owner: ListOwner) -> Option<PendingFetch> {
        let fetch = self.tree.load_more(owner)?;
        Some(self.pending(fetch))
    }

    /// Retries a failed page: the next page if some were loaded, the first otherwise.
    pub fn retry(&mut self, owner: ListOwner) -> Option<PendingFetch> {
        if self.tree.listing(owner)?.is_loaded() {
            return self.load_more(owner);
        }
        let fetch = self.tree.refresh(owner)?;
        Some(self.pending(fetch))
    }

    /// Emits [`ThreadEvent::ViewAll`] in preview mode.
    pub fn view_all(&mut self) -> bool {
        if self.mode != ThreadMode::Preview {
            return false;
        }
        self.emit(ThreadEvent::ViewAll {
            post: self.tree.post().clone(),
        });
        true
    }

    pub fn on_scroll(&mut self, position: ScrollPosition) -> Option<PendingFetch> {
        if self.mode != ThreadMode::Full || position.remaining() > self.settings.scroll_threshold
        {
            return None;
        }
        self.load_more(ListOwner::Top)
    }

    /// Applies a page and returns the fetches of any auto-expanded nodes.
    pub fn apply(&mut self, done: FetchDone) -> Vec<PendingFetch> {
        match self.tree.apply(done.ticket, done.response) {
            Applied::Appended {
                follow_ups, added, ..
            } => {
                debug!(added, "Applied reply page");
                follow_ups
                    .into_iter()
                    .map(|fetch| self.pending(fetch))
                    .collect()
            }
            Applied::Failed { owner, error } => {
                debug!(?owner, %error, "Reply page failed; showing inline retry");
                Vec::new()
            }
            Applied::Stale => Vec::new(),
        }
    }

    /// Replies are not offered on nodes at the nesting limit.
    pub fn can_reply(&self, owner: ListOwner) -> bool {
        match owner {
            ListOwner::Top => true,
            ListOwner::Node(id) => self
                .tree
                .node(id)
                .is_some_and(|n| n.nesting_level() < self.tree.max_nesting()),
        }
    }

    pub fn toggle_composer(&mut self, owner: ListOwner) -> bool {
        if !self.can_reply(owner) {
            return false;
        }
        self.tree.toggle_composer(owner)
    }

    pub fn composer_view(&self) -> ComposerView {
        if self.session.is_some() {
            ComposerView::Editing
        } else {
            ComposerView::LoginRequired
        }
    }

    pub fn composer(&self, owner: ListOwner) -> Option<&ReplyComposer> {
        self.tree.composer(owner)
    }

    pub fn composer_mut(&mut self, owner: ListOwner) -> Option<&mut ReplyComposer> {
        self.tree.composer_mut(owner)
    }

    pub fn begin_reply(&mut self, owner: ListOwner) -> Result<PendingReply, SubmitBlocked> {
        let epoch = self.tree.epoch();
        let cancel = self.cancel.child_token();
        let session = self.session.as_ref();
        let composer = self
            .tree
            .composer_mut(owner)
            .ok_or(SubmitBlocked::InFlight)?;
        let ticket = composer.begin_submit(session)?;
        Ok(PendingReply {
            owner,
            epoch,
            ticket,
            cancel,
        })
    }

    /// Emits `ReplyPosted` once and refreshes the replies of the post that was answered.
    /// The composer's node may be gone by then; the ticket's parent still names the target.
    #[instrument(skip(self, done), fields(owner = ?done.owner))]
    pub fn finish_reply(&mut self, done: ReplyDone) -> Option<PendingFetch> {
        if done.epoch != self.tree.epoch() {
            debug!(epoch = done.epoch, "Dropping reply result for a previous thread");
            return None;
        }
        let ReplyDone {
            owner,
            ticket,
            result,
            ..
        } = done;
        let parent = ticket.parent.clone();
        let (target, outcome) = match self.tree.composer_mut(owner) {
            Some(composer) => (Some(owner), composer.finish_submit(ticket, result)),
            None => {
                debug!(%parent, "Composer is gone, resolving reply target from its parent");
                let outcome = match result {
                    Ok(post) => SubmitOutcome::Posted {
                        post,
                        content: ticket.content,
                    },
                    Err(err) => SubmitOutcome::Failed(err),
                };
                (self.owner_of(&parent), outcome)
            }
        };
        match outcome {
            SubmitOutcome::Posted { post, content } => {
                self.emit(ThreadEvent::ReplyPosted {
                    parent,
                    post,
                    content,
                });
                let target = target?;
                if let Some(reactions) = self.reactions_mut(target) {
                    reactions.record_reply();
                }
                if target == owner && self.tree.is_composing(owner) {
                    self.tree.toggle_composer(owner);
                }
                let fetch = self.tree.refresh(target)?;
                Some(self.pending(fetch))
            }
            SubmitOutcome::Failed(err) => {
                self.emit(ThreadEvent::Notice(Notice::error(format!(
                    "Could not post reply: {}",
                    err.user_message()
                ))));
                None
            }
        }
    }

    fn owner_of(&self, post: &PostId) -> Option<ListOwner> {
        if post == self.tree.post() {
            Some(ListOwner::Top)
        } else {
            self.tree.find(post).map(ListOwner::Node)
        }
    }

    pub fn reactions(&self, owner: ListOwner) -> Option<&ReactionController> {
        match owner {
            ListOwner::Top => self.subject_reactions.as_ref(),
            ListOwner::Node(id) => self.tree.node(id).map(|n| n.reactions()),
        }
    }

    fn reactions_mut(&mut self, owner: ListOwner) -> Option<&mut ReactionController> {
        match owner {
            ListOwner::Top => self.subject_reactions.as_mut(),
            ListOwner::Node(id) => self.tree.node_mut(id).map(|n| n.reactions_mut()),
        }
    }

    pub fn begin_toggle_like(&mut self, owner: ListOwner) -> Option<PendingToggle> {
        let logged_in = self.is_logged_in();
        let epoch = self.tree.epoch();
        let cancel = self.cancel.child_token();
        let request = self.reactions_mut(owner)?.begin_toggle(logged_in)?;
        Some(PendingToggle {
            owner,
            epoch,
            request,
            cancel,
        })
    }

    pub fn finish_toggle_like(&mut self, done: ToggleDone) {
        if done.epoch != self.tree.epoch() {
            return;
        }
        let result = match self.reactions_mut(done.owner) {
            Some(reactions) => reactions.finish_toggle(done.result),
            None => return,
        };
        if let Err(err) = result {
            self.emit(ThreadEvent::Notice(Notice::error(format!(
                "Could not update like: {}",
                err.user_message()
            ))));
        }
    }

    async fn drive(&mut self, pending: PendingFetch) {
        let client = self.client();
        let mut queue = vec![pending];
        while let Some(pending) = queue.pop() {
            if let Some(done) = pending.run(client.as_ref()).await {
                queue.extend(self.apply(done));
            }
        }
    }

    pub async fn load_first_page(&mut self) {
        if let Some(pending) = self.mount() {
            self.drive(pending).await;
        }
    }

    pub async fn toggle_replies(&mut self, id: NodeId) {
        if let Some(pending) = self.show_replies(id) {
            self.drive(pending).await;
        }
    }

    pub async fn load_more_replies(&mut self, owner: ListOwner) {
        if let Some(pending) = self.load_more(owner) {
            self.drive(pending).await;
        }
    }

    pub async fn submit_reply(&mut self, owner: ListOwner) -> Result<(), SubmitBlocked> {
        let pending = self.begin_reply(owner)?;
        let client = self.client();
        if let Some(done) = pending.run(client.as_ref()).await
            && let Some(refresh) = self.finish_reply(done)
        {
            self.drive(refresh).await;
        }
        Ok(())
    }

    pub async fn toggle_like(&mut self, owner: ListOwner) {
        let Some(pending) = self.begin_toggle_like(owner) else {
            return;
        };
        let client = self.client();
        if let Some(done) = pending.run(client.as_ref()).await {
            self.finish_toggle_like(done);
        }
    }
}

fn nesting_for(settings: &ThreadSettings, mode: ThreadMode) -> u32 {
    match mode {
        ThreadMode::Preview => settings.max_nesting_preview,
        ThreadMode::Full => settings.max_nesting_full,
    }
}
