//! Arena of thread nodes for one top-level post.
//!
//! Nodes live in a flat map keyed by [`NodeId`] and refer to each other by id. Every
//! owner of a reply list (the top-level post or a node) has a [`Listing`] with its own
//! fetcher, so each level paginates independently.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::{
    remote::{AnyPost, Paginated, Post, PostId, RemoteError},
    thread::{
        composer::ReplyComposer,
        fetcher::{CommentFetcher, FetchOutcome, PageRequest},
        reactions::ReactionController,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Owner of a reply list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListOwner {
    Top,
    Node(NodeId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RepliesState {
    #[default]
    Collapsed,
    ExpandingReplies,
    Expanded,
    LoadingMoreReplies,
}

impl RepliesState {
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            RepliesState::ExpandingReplies | RepliesState::LoadingMoreReplies
        )
    }

    fn settle(&mut self) {
        if self.is_loading() {
            *self = RepliesState::Expanded;
        }
    }
}

/// Identifies the listing a response belongs to. Responses whose ticket no longer
/// matches (tree reset, owner removed, listing refreshed) are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub owner: ListOwner,
    pub epoch: u64,
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct Listing {
    fetcher: CommentFetcher,
    children: Vec<NodeId>,
    /// Children set aside by a refresh, reused when their post comes back.
    retained: Vec<NodeId>,
    loaded: bool,
    load_failed: bool,
    generation: u64,
}

impl Listing {
    fn new(parent: PostId) -> Self {
        Self {
            fetcher: CommentFetcher::new(parent),
            children: Vec::new(),
            retained: Vec::new(),
            loaded: false,
            load_failed: false,
            generation: 0,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn load_failed(&self) -> bool {
        self.load_failed
    }

    pub fn has_more(&self) -> bool {
        self.fetcher.has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.fetcher.is_loading()
    }
}

#[derive(Debug, Clone)]
pub struct ThreadNode {
    id: NodeId,
    comment: Post,
    nesting_level: u32,
    parent: ListOwner,
    listing: Listing,
    state: RepliesState,
    composing: bool,
    composer: ReplyComposer,
    reactions: ReactionController,
}

impl ThreadNode {
    fn new(id: NodeId, comment: Post, nesting_level: u32, parent: ListOwner) -> Self {
        Self {
            id,
            listing: Listing::new(comment.id.clone()),
            composer: ReplyComposer::new(comment.id.clone()),
            reactions: ReactionController::from_post(&comment),
            comment,
            nesting_level,
            parent,
            state: RepliesState::Collapsed,
            composing: false,
        }
    }

    /// Takes the server's latest copy of the comment. Local view state stays.
    fn update_comment(&mut self, comment: Post) {
        if !self.reactions.is_pending() {
            self.reactions = ReactionController::from_post(&comment);
        }
        self.comment = comment;
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn comment(&self) -> &Post {
        &self.comment
    }

    pub fn nesting_level(&self) -> u32 {
        self.nesting_level
    }

    pub fn parent(&self) -> ListOwner {
        self.parent
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    pub fn state(&self) -> RepliesState {
        self.state
    }

    pub fn children_loaded(&self) -> bool {
        self.listing.loaded
    }

    pub fn is_composing(&self) -> bool {
        self.composing
    }

    pub fn composer(&self) -> &ReplyComposer {
        &self.composer
    }

    pub fn reactions(&self) -> &ReactionController {
        &self.reactions
    }

    pub fn reactions_mut(&mut self) -> &mut ReactionController {
        &mut self.reactions
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowReplies {
    Fetch(FetchTicket, PageRequest),
    Shown,
    Hidden,
    /// First page still loading; nothing happens.
    Busy,
    MaxNestingReached(PostId),
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Appended {
        owner: ListOwner,
        added: usize,
        /// Follow-up fetches for freshly created auto-expanded nodes.
        follow_ups: Vec<(FetchTicket, PageRequest)>,
    },
    Failed {
        owner: ListOwner,
        error: RemoteError,
    },
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRow {
    Comment { id: NodeId, depth: u32 },
    Composer { owner: ListOwner, depth: u32 },
    Loading { owner: ListOwner, depth: u32 },
    LoadFailed { owner: ListOwner, depth: u32 },
    MoreReplies { owner: ListOwner, depth: u32 },
    ViewAll { hidden: usize },
    Empty,
}

#[derive(Debug, Clone)]
pub struct ThreadTree {
    post: PostId,
    max_nesting: u32,
    epoch: u64,
    next_id: u64,
    top: Listing,
    top_state: RepliesState,
    top_composing: bool,
    top_composer: ReplyComposer,
    nodes: HashMap<NodeId, ThreadNode>,
    auto_expand: HashSet<PostId>,
}

impl ThreadTree {
    pub fn new(post: PostId, max_nesting: u32, epoch: u64) -> Self {
        Self {
            top: Listing::new(post.clone()),
            top_composer: ReplyComposer::new(post.clone()),
            post,
            max_nesting: max_nesting.max(1),
            epoch,
            next_id: 0,
            top_state: RepliesState::Collapsed,
            top_composing: false,
            nodes: HashMap::new(),
            auto_expand: HashSet::new(),
        }
    }

    pub fn post(&self) -> &PostId {
        &self.post
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn max_nesting(&self) -> u32 {
        self.max_nesting
    }

    pub fn set_max_nesting(&mut self, max_nesting: u32) {
        self.max_nesting = max_nesting.max(1);
    }

    pub fn node(&self, id: NodeId) -> Option<&ThreadNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ThreadNode> {
        self.nodes.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, post: &PostId) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|node| &node.comment.id == post)
            .map(|node| node.id)
    }

    pub fn listing(&self, owner: ListOwner) -> Option<&Listing> {
        match owner {
            ListOwner::Top => Some(&self.top),
            ListOwner::Node(id) => self.nodes.get(&id).map(|n| &n.listing),
        }
    }

    pub fn state(&self, owner: ListOwner) -> Option<RepliesState> {
        match owner {
            ListOwner::Top => Some(self.top_state),
            ListOwner::Node(id) => self.nodes.get(&id).map(|n| n.state),
        }
    }

    pub fn children(&self, owner: ListOwner) -> &[NodeId] {
        self.listing(owner).map(Listing::children).unwrap_or_default()
    }

    /// Post ids of the children of `owner`, in display order.
    pub fn child_posts(&self, owner: ListOwner) -> Vec<PostId> {
        self.children(owner)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| n.comment.id.clone())
            .collect()
    }

    /// Deep-link support: a node created for `post` expands its replies right away.
    pub fn auto_expand(&mut self, post: PostId) {
        self.auto_expand.insert(post);
    }

    pub fn is_composing(&self, owner: ListOwner) -> bool {
        match owner {
            ListOwner::Top => self.top_composing,
            ListOwner::Node(id) => self.nodes.get(&id).is_some_and(|n| n.composing),
        }
    }

    pub fn toggle_composer(&mut self, owner: ListOwner) -> bool {
        let flag = match owner {
            ListOwner::Top => &mut self.top_composing,
            ListOwner::Node(id) => match self.nodes.get_mut(&id) {
                Some(node) => &mut node.composing,
                None => return false,
            },
        };
        *flag = !*flag;
        *flag
    }

    pub fn composer(&self, owner: ListOwner) -> Option<&ReplyComposer> {
        match owner {
            ListOwner::Top => Some(&self.top_composer),
            ListOwner::Node(id) => self.nodes.get(&id).map(|n| &n.composer),
        }
    }

    pub fn composer_mut(&mut self, owner: ListOwner) -> Option<&mut ReplyComposer> {
        match owner {
            ListOwner::Top => Some(&mut self.top_composer),
            ListOwner::Node(id) => self.nodes.get_mut(&id).map(|n| &mut n.composer),
        }
    }

    fn listing_mut(&mut self, owner: ListOwner) -> Option<(&mut Listing, &mut RepliesState)> {
        match owner {
            ListOwner::Top => Some((&mut self.top, &mut self.top_state)),
            ListOwner::Node(id) => self
                .nodes
                .get_mut(&id)
                .map(|n| (&mut n.listing, &mut n.state)),
        }
    }

    fn depth_of(&self, owner: ListOwner) -> u32 {
        match owner {
            ListOwner::Top => 0,
            ListOwner::Node(id) => self.nodes.get(&id).map_or(0, |n| n.nesting_level),
        }
    }

    fn begin(&mut self, owner: ListOwner, next: RepliesState) -> Option<(FetchTicket, PageRequest)> {
        let epoch = self.epoch;
        let (listing, state) = self.listing_mut(owner)?;
        let request = listing.fetcher.begin()?;
        *state = next;
        Some((
            FetchTicket {
                owner,
                epoch,
                generation: listing.generation,
            },
            request,
        ))
    }

    /// First page of the top-level post's replies. `None` once loaded or while loading.
    pub fn load_top(&mut self) -> Option<(FetchTicket, PageRequest)> {
        if self.top.loaded {
            return None;
        }
        self.begin(ListOwner::Top, RepliesState::ExpandingReplies)
    }

    pub fn show_replies(&mut self, id: NodeId) -> ShowReplies {
        let max_nesting = self.max_nesting;
        let Some(node) = self.nodes.get_mut(&id) else {
            return ShowReplies::Missing;
        };
        if node.nesting_level >= max_nesting {
            return ShowReplies::MaxNestingReached(node.comment.id.clone());
        }
        let loaded = node.listing.loaded;
        match node.state {
            RepliesState::ExpandingReplies => ShowReplies::Busy,
            RepliesState::Expanded | RepliesState::LoadingMoreReplies => {
                node.state = RepliesState::Collapsed;
                ShowReplies::Hidden
            }
            RepliesState::Collapsed if loaded => {
                node.state = RepliesState::Expanded;
                ShowReplies::Shown
            }
            RepliesState::Collapsed => {
                match self.begin(ListOwner::Node(id), RepliesState::ExpandingReplies) {
                    Some((ticket, request)) => ShowReplies::Fetch(ticket, request),
                    None => {
                        if let Some(node) = self.nodes.get_mut(&id) {
                            node.state = RepliesState::Expanded;
                        }
                        ShowReplies::Shown
                    }
                }
            }
        }
    }

    /// Next page for an expanded owner. Appends; never replaces.
    pub fn load_more(&mut self, owner: ListOwner) -> Option<(FetchTicket, PageRequest)> {
        let (listing, state) = self.listing_mut(owner)?;
        if *state != RepliesState::Expanded || !listing.loaded {
            return None;
        }
        self.begin(owner, RepliesState::LoadingMoreReplies)
    }

    /// Asks for the first page of `owner` again. Current children are set aside and
    /// reused, drafts and expansion included, when their post is listed again.
    pub fn refresh(&mut self, owner: ListOwner) -> Option<(FetchTicket, PageRequest)> {
        let (listing, state) = self.listing_mut(owner)?;
        listing.generation += 1;
        listing.loaded = false;
        listing.load_failed = false;
        listing.fetcher.reset();
        *state = RepliesState::Collapsed;
        let children = std::mem::take(&mut listing.children);
        listing.retained.extend(children);
        debug!(?owner, retained = listing.retained.len(), "Refreshing replies");
        self.begin(owner, RepliesState::ExpandingReplies)
    }

    fn take_retained(&mut self, owner: ListOwner, post: &PostId) -> Option<NodeId> {
        let index = self
            .listing(owner)?
            .retained
            .iter()
            .position(|id| self.nodes.get(id).is_some_and(|n| &n.comment.id == post))?;
        let (listing, _) = self.listing_mut(owner)?;
        Some(listing.retained.remove(index))
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                stack.extend(node.listing.children);
                stack.extend(node.listing.retained);
            }
        }
    }

    pub fn apply(
        &mut self,
        ticket: FetchTicket,
        response: Result<Paginated<AnyPost>, RemoteError>,
    ) -> Applied {
        if ticket.epoch != self.epoch {
            debug!(?ticket, epoch = self.epoch, "Dropping response for a previous thread");
            return Applied::Stale;
        }
        let owner = ticket.owner;
        let Some((listing, state)) = self.listing_mut(owner) else {
            debug!(?owner, "Dropping response for a removed node");
            return Applied::Stale;
        };
        if listing.generation != ticket.generation {
            debug!(?owner, "Dropping response for a refreshed listing");
            return Applied::Stale;
        }
        let posts = match listing.fetcher.finish(response) {
            FetchOutcome::Loaded(posts) => posts,
            FetchOutcome::Failed(error) => {
                listing.load_failed = true;
                state.settle();
                return Applied::Failed { owner, error };
            }
            FetchOutcome::Skipped => return Applied::Stale,
        };
        listing.loaded = true;
        listing.load_failed = false;
        state.settle();

        let depth = self.depth_of(owner) + 1;
        let mut seen = self.child_posts(owner).into_iter().collect::<HashSet<_>>();
        let mut added = Vec::with_capacity(posts.len());
        let mut follow_ups = Vec::new();
        for post in posts {
            if !seen.insert(post.id.clone()) {
                trace!(post = %post.id, "Skipping duplicate reply");
                continue;
            }
            if let Some(id) = self.take_retained(owner, &post.id) {
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.update_comment(post);
                }
                added.push(id);
                continue;
            }
            let id = NodeId(self.next_id);
            self.next_id += 1;
            let expand = self.auto_expand.remove(&post.id);
            self.nodes.insert(id, ThreadNode::new(id, post, depth, owner));
            added.push(id);
            if expand && let ShowReplies::Fetch(ticket, request) = self.show_replies(id) {
                follow_ups.push((ticket, request));
            }
        }
        let count = added.len();
        let mut gone = Vec::new();
        if let Some((listing, _)) = self.listing_mut(owner) {
            listing.children.extend(added);
            if !listing.has_more() {
                gone = std::mem::take(&mut listing.retained);
            }
        }
        for id in gone {
            debug!(?id, "Dropping reply that is no longer listed");
            self.remove_subtree(id);
        }
        Applied::Appended {
            owner,
            added: count,
            follow_ups,
        }
    }

    /// Depth-first rows to render. `top_limit` caps the visible top-level replies.
    pub fn rows(&self, top_limit: Option<usize>) -> Vec<ThreadRow> {
        let mut rows = Vec::new();
        if self.top_composing {
            rows.push(ThreadRow::Composer {
                owner: ListOwner::Top,
                depth: 1,
            });
        }
        let visible = top_limit.map_or(self.top.children.len(), |limit| {
            limit.min(self.top.children.len())
        });
        for id in &self.top.children[..visible] {
            self.push_node(*id, &mut rows);
        }
        if self.top_state.is_loading() {
            rows.push(ThreadRow::Loading {
                owner: ListOwner::Top,
                depth: 1,
            });
        } else if self.top.load_failed {
            rows.push(ThreadRow::LoadFailed {
                owner: ListOwner::Top,
                depth: 1,
            });
        } else if top_limit.is_some() {
            let hidden = self.top.children.len() - visible;
            if hidden > 0 || (self.top.loaded && self.top.has_more()) {
                rows.push(ThreadRow::ViewAll { hidden });
            }
        } else if self.top.loaded && self.top.has_more() {
            rows.push(ThreadRow::MoreReplies {
                owner: ListOwner::Top,
                depth: 1,
            });
        }
        if self.top.loaded && self.top.children.is_empty() && !self.top_state.is_loading() {
            rows.push(ThreadRow::Empty);
        }
        rows
    }

    fn push_node(&self, id: NodeId, rows: &mut Vec<ThreadRow>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let depth = node.nesting_level + 1;
        let owner = ListOwner::Node(id);
        rows.push(ThreadRow::Comment {
            id,
            depth: node.nesting_level,
        });
        if node.composing {
            rows.push(ThreadRow::Composer { owner, depth });
        }
        if node.state == RepliesState::Collapsed {
            return;
        }
        for child in &node.listing.children {
            self.push_node(*child, rows);
        }
        if node.state.is_loading() {
            rows.push(ThreadRow::Loading { owner, depth });
        } else if node.listing.load_failed {
            rows.push(ThreadRow::LoadFailed { owner, depth });
        } else if node.listing.loaded && node.listing.has_more() {
            rows.push(ThreadRow::MoreReplies { owner, depth });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{
        Cursor, ReferenceQuery, RemoteContentClient,
        snapshot::{Operation, Snapshot, SnapshotClient},
    };

    fn client() -> SnapshotClient {
        SnapshotClient::new(
            Snapshot::new(3)
                .with_post("p1", None, "post")
                .with_post("c1", Some("p1"), "1")
                .with_post("c1a", Some("c1"), "1a")
                .with_post("c1b", Some("c1"), "1b")
                .with_post("c1a1", Some("c1a"), "1a1")
                .with_post("c2", Some("p1"), "2")
                .with_post("c3", Some("p1"), "3")
                .with_post("c4", Some("p1"), "4")
                .with_post("c5", Some("p1"), "5"),
        )
    }

    async fn run(
        tree: &mut ThreadTree,
        client: &SnapshotClient,
        (ticket, request): (FetchTicket, PageRequest),
    ) -> Applied {
        let response = request.send(client).await;
        tree.apply(ticket, response)
    }

    async fn loaded_tree(client: &SnapshotClient, max_nesting: u32) -> ThreadTree {
        let mut tree = ThreadTree::new(PostId::new("p1"), max_nesting, 1);
        let fetch = tree.load_top().unwrap();
        run(&mut tree, client, fetch).await;
        tree
    }

    fn posts(tree: &ThreadTree, owner: ListOwner) -> Vec<String> {
        tree.child_posts(owner)
            .into_iter()
            .map(|p| p.to_string())
            .collect()
    }

    fn node_for(tree: &ThreadTree, post: &str) -> NodeId {
        tree.find(&PostId::new(post)).expect("node exists")
    }

    #[tokio::test]
    async fn load_more_appends_and_exhausts() {
        let client = client();
        let mut tree = loaded_tree(&client, 4).await;
        let before = posts(&tree, ListOwner::Top);
        assert_eq!(before, ["c1", "c2", "c3"]);
        assert!(tree.listing(ListOwner::Top).unwrap().has_more());

        let fetch = tree.load_more(ListOwner::Top).unwrap();
        assert_eq!(tree.state(ListOwner::Top), Some(RepliesState::LoadingMoreReplies));
        run(&mut tree, &client, fetch).await;

        let after = posts(&tree, ListOwner::Top);
        assert_eq!(after.len(), 5);
        assert_eq!(&after[..before.len()], &before[..]);
        assert!(!tree.listing(ListOwner::Top).unwrap().has_more());
        assert_eq!(tree.state(ListOwner::Top), Some(RepliesState::Expanded));
    }

    #[tokio::test]
    async fn expand_collapse_expand_fetches_once() {
        let client = client();
        let mut tree = loaded_tree(&client, 4).await;
        let c1 = node_for(&tree, "c1");

        let ShowReplies::Fetch(ticket, request) = tree.show_replies(c1) else {
            panic!("first expand should fetch");
        };
        assert_eq!(tree.show_replies(c1), ShowReplies::Busy);
        run(&mut tree, &client, (ticket, request)).await;
        assert_eq!(posts(&tree, ListOwner::Node(c1)), ["c1a", "c1b"]);

        assert_eq!(tree.show_replies(c1), ShowReplies::Hidden);
        assert_eq!(tree.state(ListOwner::Node(c1)), Some(RepliesState::Collapsed));
        assert_eq!(tree.show_replies(c1), ShowReplies::Shown);
        assert_eq!(posts(&tree, ListOwner::Node(c1)), ["c1a", "c1b"]);
        assert_eq!(client.calls(Operation::FetchReferences), 2);
    }

    #[tokio::test]
    async fn nesting_levels_increase_by_one() {
        let client = client();
        let mut tree = loaded_tree(&client, 4).await;
        let c1 = node_for(&tree, "c1");
        let ShowReplies::Fetch(t, r) = tree.show_replies(c1) else {
            panic!()
        };
        run(&mut tree, &client, (t, r)).await;
        let c1a = node_for(&tree, "c1a");
        assert_eq!(tree.node(c1).unwrap().nesting_level(), 1);
        assert_eq!(tree.node(c1a).unwrap().nesting_level(), 2);
        assert_eq!(tree.node(c1a).unwrap().parent(), ListOwner::Node(c1));
    }

    #[tokio::test]
    async fn max_nesting_blocks_inline_expansion() {
        let client = client();
        let mut tree = loaded_tree(&client, 1).await;
        let c1 = node_for(&tree, "c1");
        assert_eq!(
            tree.show_replies(c1),
            ShowReplies::MaxNestingReached(PostId::new("c1"))
        );
        assert_eq!(tree.state(ListOwner::Node(c1)), Some(RepliesState::Collapsed));
    }

    #[tokio::test]
    async fn failed_expand_is_retryable() {
        let client = client();
        let mut tree = loaded_tree(&client, 4).await;
        let c1 = node_for(&tree, "c1");
        let ShowReplies::Fetch(ticket, _) = tree.show_replies(c1) else {
            panic!()
        };
        let applied = tree.apply(ticket, Err(RemoteError::Network("down".to_string())));
        assert!(matches!(applied, Applied::Failed { .. }));
        assert_eq!(tree.state(ListOwner::Node(c1)), Some(RepliesState::Expanded));
        assert!(tree.listing(ListOwner::Node(c1)).unwrap().load_failed());
        assert!(tree.rows(None).contains(&ThreadRow::LoadFailed {
            owner: ListOwner::Node(c1),
            depth: 2
        }));

        assert_eq!(tree.show_replies(c1), ShowReplies::Hidden);
        assert!(matches!(tree.show_replies(c1), ShowReplies::Fetch(..)));
    }

    #[tokio::test]
    async fn failed_load_more_keeps_children() {
        let client = client();
        let mut tree = loaded_tree(&client, 4).await;
        let (ticket, _) = tree.load_more(ListOwner::Top).unwrap();
        tree.apply(ticket, Err(RemoteError::Protocol("rate limited".to_string())));
        assert_eq!(posts(&tree, ListOwner::Top), ["c1", "c2", "c3"]);
        assert!(tree.listing(ListOwner::Top).unwrap().has_more());
    }

    #[tokio::test]
    async fn stale_epoch_and_refreshed_listing_are_dropped() {
        let client = client();
        let mut tree = ThreadTree::new(PostId::new("p1"), 4, 7);
        let (ticket, request) = tree.load_top().unwrap();
        let response = request.send(&client).await;

        let mut other = ThreadTree::new(PostId::new("p1"), 4, 8);
        assert_eq!(other.apply(ticket, response.clone()), Applied::Stale);

        let _ = tree.refresh(ListOwner::Top).unwrap();
        assert_eq!(tree.apply(ticket, response), Applied::Stale);
        assert!(tree.is_empty());
    }

    #[tokio::test]
    async fn duplicate_posts_are_not_appended_twice() {
        let client = client();
        let mut tree = loaded_tree(&client, 4).await;
        let (ticket, _) = tree.load_more(ListOwner::Top).unwrap();
        let repeat = client
            .fetch_references(
                &PostId::new("p1"),
                ReferenceQuery::comments(None),
            )
            .await
            .unwrap();
        let applied = tree.apply(ticket, Ok(repeat));
        assert!(matches!(applied, Applied::Appended { added: 0, .. }));
        assert_eq!(posts(&tree, ListOwner::Top), ["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn refresh_reuses_listed_nodes_and_drops_the_rest() {
        let client = client();
        let mut tree = loaded_tree(&client, 4).await;
        let c1 = node_for(&tree, "c1");
        let ShowReplies::Fetch(t, r) = tree.show_replies(c1) else {
            panic!()
        };
        run(&mut tree, &client, (t, r)).await;
        assert_eq!(tree.len(), 5);

        let fetch = tree.refresh(ListOwner::Top).unwrap();
        assert!(tree.rows(None).iter().all(|r| !matches!(r, ThreadRow::Comment { .. })));
        run(&mut tree, &client, fetch).await;
        assert_eq!(posts(&tree, ListOwner::Top), ["c1", "c2", "c3"]);
        assert_eq!(node_for(&tree, "c1"), c1);
        assert_eq!(posts(&tree, ListOwner::Node(c1)), ["c1a", "c1b"]);
        assert_eq!(tree.len(), 5);

        let (ticket, _) = tree.refresh(ListOwner::Top).unwrap();
        tree.apply(
            ticket,
            Ok(Paginated {
                items: Vec::new(),
                next: None::<Cursor>,
            }),
        );
        assert!(tree.is_empty());
        assert_eq!(tree.find(&PostId::new("c1a")), None);
    }

    #[tokio::test]
    async fn draft_and_expansion_survive_parent_refresh() {
        let client = client();
        let mut tree = loaded_tree(&client, 4).await;
        let c1 = node_for(&tree, "c1");
        let ShowReplies::Fetch(t, r) = tree.show_replies(c1) else {
            panic!()
        };
        run(&mut tree, &client, (t, r)).await;
        assert!(tree.toggle_composer(ListOwner::Node(c1)));
        tree.composer_mut(ListOwner::Node(c1))
            .unwrap()
            .set_content("half-written draft");

        let fetch = tree.refresh(ListOwner::Top).unwrap();
        run(&mut tree, &client, fetch).await;

        let c1 = node_for(&tree, "c1");
        assert!(tree.is_composing(ListOwner::Node(c1)));
        assert_eq!(
            tree.composer(ListOwner::Node(c1)).unwrap().content(),
            "half-written draft"
        );
        assert_eq!(tree.state(ListOwner::Node(c1)), Some(RepliesState::Expanded));
        assert_eq!(posts(&tree, ListOwner::Node(c1)), ["c1a", "c1b"]);
    }

    #[tokio::test]
    async fn auto_expand_fetches_children_on_creation() {
        let client = client();
        let mut tree = ThreadTree::new(PostId::new("p1"), 4, 1);
        tree.auto_expand(PostId::new("c1"));
        let fetch = tree.load_top().unwrap();
        let Applied::Appended { follow_ups, .. } = run(&mut tree, &client, fetch).await else {
            panic!()
        };
        assert_eq!(follow_ups.len(), 1);
        let c1 = node_for(&tree, "c1");
        assert_eq!(
            tree.state(ListOwner::Node(c1)),
            Some(RepliesState::ExpandingReplies)
        );
        for fetch in follow_ups {
            run(&mut tree, &client, fetch).await;
        }
        assert_eq!(posts(&tree, ListOwner::Node(c1)), ["c1a", "c1b"]);
    }

    #[tokio::test]
    async fn preview_rows_cap_top_level_and_offer_view_all() {
        let client = client();
        let tree = loaded_tree(&client, 2).await;
        let rows = tree.rows(Some(2));
        let comments = rows
            .iter()
            .filter(|r| matches!(r, ThreadRow::Comment { .. }))
            .count();
        assert_eq!(comments, 2);
        assert_eq!(rows.last(), Some(&ThreadRow::ViewAll { hidden: 1 }));

        let full = tree.rows(None);
        assert_eq!(
            full.last(),
            Some(&ThreadRow::MoreReplies {
                owner: ListOwner::Top,
                depth: 1
            })
        );
    }

    #[test]
    fn empty_thread_renders_empty_row() {
        let mut tree = ThreadTree::new(PostId::new("p1"), 4, 1);
        let (ticket, _) = tree.load_top().unwrap();
        tree.apply(
            ticket,
            Ok(Paginated {
                items: Vec::new(),
                next: None::<Cursor>,
            }),
        );
        assert_eq!(tree.rows(None), vec![ThreadRow::Empty]);
    }
}
