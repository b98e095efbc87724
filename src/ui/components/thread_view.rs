use std::collections::HashMap;

use async_trait::async_trait;
use ratatui::{
    buffer::Buffer,
    crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    layout::Rect,
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, BorderType, List, ListItem, ListState, Paragraph, StatefulWidget, Widget, Wrap,
    },
};
use ratatui_macros::vertical;
use throbber_widgets_tui::{BRAILLE_SIX_DOUBLE, Throbber, ThrobberState, WhichUse};
use tokio::sync::mpsc::{Sender, UnboundedSender};
use tracing::{debug, info, instrument, warn};

use crate::{
    errors::AppError,
    help_keybind, help_text,
    remote::{AccountAddress, AnyPost, Post, PostId},
    thread::{
        CommentThreadRoot, ComposerView, ListOwner, Notice, NodeId, ReactionSummary,
        ReplyComposer, RepliesState, ScrollPosition, SubmitBlocked, ThreadEvent, ThreadMode,
        ThreadRow,
        arena::ThreadNode,
        root::{PendingFetch, PendingReply, PendingToggle},
    },
    ui::{
        Action, AppState,
        components::{Component, help::HelpElementKind},
        layout::Layout,
        markdown::render_markdown_lines,
    },
};

pub const HELP: &[HelpElementKind] = &[
    help_text!("Thread"),
    help_keybind!("Up/Down, j/k", "select row"),
    help_keybind!("Enter/Space", "show or hide replies, load more, retry"),
    help_keybind!("r", "reply to the selected comment"),
    help_keybind!("c", "comment on the post"),
    help_keybind!("l / L", "like the comment / the post"),
    help_keybind!("Ctrl+Enter", "send reply"),
    help_keybind!("Esc", "stop typing or leave an opened thread"),
];

type MarkdownCache = HashMap<(PostId, usize), Vec<Line<'static>>>;

/// One thread on the escalation stack. Results of spawned work carry the slot id
/// so they reach the thread that asked for them.
struct ThreadSlot {
    id: u64,
    root: CommentThreadRoot,
    rows: Vec<ThreadRow>,
    list_state: ListState,
    visible_rows: usize,
}

impl ThreadSlot {
    fn new(id: u64, root: CommentThreadRoot) -> Self {
        let mut slot = Self {
            id,
            root,
            rows: Vec::new(),
            list_state: ListState::default(),
            visible_rows: 0,
        };
        slot.refresh_rows();
        slot
    }

    /// Rebuilds rows, keeping the selection on the same row when it survives.
    fn refresh_rows(&mut self) {
        let previous = self.selected_row();
        let index = self.list_state.selected();
        self.rows = self.root.rows();
        if self.rows.is_empty() {
            self.list_state.select(None);
            return;
        }
        let next = previous
            .and_then(|row| self.rows.iter().position(|r| *r == row))
            .or(index.map(|i| i.min(self.rows.len() - 1)))
            .unwrap_or(0);
        self.list_state.select(Some(next));
    }

    fn selected_row(&self) -> Option<ThreadRow> {
        self.list_state
            .selected()
            .and_then(|i| self.rows.get(i).copied())
    }

    fn select_composer(&mut self, owner: ListOwner) {
        let position = self
            .rows
            .iter()
            .position(|row| matches!(row, ThreadRow::Composer { owner: o, .. } if *o == owner));
        if position.is_some() {
            self.list_state.select(position);
        }
    }

    fn scroll_position(&self) -> ScrollPosition {
        ScrollPosition {
            offset: self.list_state.offset(),
            viewport: self.visible_rows.max(1),
            content: self.rows.len(),
        }
    }
}

pub struct ThreadView {
    action_tx: Option<Sender<Action>>,
    state: AppState,
    events: UnboundedSender<ThreadEvent>,
    stack: Vec<ThreadSlot>,
    next_thread: u64,
    editing: Option<ListOwner>,
    markdown_cache: MarkdownCache,
    markdown_width: usize,
    throbber_state: ThrobberState,
}

impl ThreadView {
    pub fn new(state: AppState, events: UnboundedSender<ThreadEvent>) -> Self {
        let root = CommentThreadRoot::new(
            state.client.clone(),
            state.session.clone(),
            state.settings,
            state.mode,
            state.post.clone(),
            events.clone(),
        );
        Self {
            action_tx: None,
            events,
            stack: vec![ThreadSlot::new(0, root)],
            next_thread: 1,
            editing: None,
            markdown_cache: HashMap::new(),
            markdown_width: 0,
            throbber_state: ThrobberState::default(),
            state,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    fn current(&self) -> Option<&ThreadSlot> {
        self.stack.last()
    }

    fn slot_mut(&mut self, thread: u64) -> Option<&mut ThreadSlot> {
        self.stack.iter_mut().find(|slot| slot.id == thread)
    }

    fn notify(&self, notice: Notice) {
        if self.events.send(ThreadEvent::Notice(notice)).is_err() {
            debug!("Notice dropped; nobody is listening");
        }
    }

    /// Tells the status bar how many comments the focused thread holds.
    fn update_count(&self) {
        let count = self.current().map_or(0, |slot| slot.root.tree().len());
        if let Some(tx) = &self.action_tx {
            let _ = tx.try_send(Action::LoadedCount { count });
        }
    }

    fn announce_focus(&self) {
        self.update_count();
        if let (Some(tx), Some(slot)) = (&self.action_tx, self.current()) {
            let _ = tx.try_send(Action::ThreadFocused {
                post: slot.root.post().clone(),
                depth: self.stack.len(),
            });
        }
    }

    /// Starts the focused thread's first page and, if needed, its subject post.
    fn mount_current(&mut self) {
        let Some(slot) = self.stack.last_mut() else {
            return;
        };
        let thread = slot.id;
        let pending = slot.root.mount();
        let missing_subject = slot
            .root
            .subject()
            .is_none()
            .then(|| slot.root.post().clone());
        slot.refresh_rows();
        if let Some(pending) = pending {
            self.spawn_fetch(thread, pending);
        }
        if let Some(post) = missing_subject {
            self.spawn_subject(thread, post);
        }
        self.announce_focus();
    }

    fn spawn_fetch(&self, thread: u64, pending: PendingFetch) {
        let Some(action_tx) = self.action_tx.clone() else {
            return;
        };
        let client = self.state.client.clone();
        tokio::spawn(async move {
            if let Some(done) = pending.run(client.as_ref()).await {
                let _ = action_tx.send(Action::RepliesLoaded { thread, done }).await;
            }
        });
    }

    fn spawn_reply(&self, thread: u64, pending: PendingReply) {
        let Some(action_tx) = self.action_tx.clone() else {
            return;
        };
        let client = self.state.client.clone();
        tokio::spawn(async move {
            if let Some(done) = pending.run(client.as_ref()).await {
                let _ = action_tx.send(Action::ReplyFinished { thread, done }).await;
            }
        });
    }

    fn spawn_like(&self, thread: u64, pending: PendingToggle) {
        let Some(action_tx) = self.action_tx.clone() else {
            return;
        };
        let client = self.state.client.clone();
        tokio::spawn(async move {
            if let Some(done) = pending.run(client.as_ref()).await {
                let _ = action_tx.send(Action::LikeFinished { thread, done }).await;
            }
        });
    }

    fn spawn_subject(&self, thread: u64, post: PostId) {
        let Some(action_tx) = self.action_tx.clone() else {
            return;
        };
        let client = self.state.client.clone();
        tokio::spawn(async move {
            let action = match client.fetch_post(&post).await {
                Ok(AnyPost::Post(post)) => Action::SubjectLoaded { thread, post },
                Ok(AnyPost::Repost { id, .. }) => {
                    debug!(%id, "Thread subject is a repost; showing replies only");
                    return;
                }
                Err(err) => Action::Thread(ThreadEvent::Notice(Notice::warning(format!(
                    "Could not load post: {}",
                    err.user_message()
                )))),
            };
            let _ = action_tx.send(action).await;
        });
    }

    /// Opens the replies of `post` as a new full thread on top of the stack.
    #[instrument(skip(self))]
    fn escalate(&mut self, post: PostId) {
        let subject = self.current().and_then(|slot| {
            let tree = slot.root.tree();
            tree.find(&post)
                .and_then(|id| tree.node(id))
                .map(|node| node.comment().clone())
        });
        let mut root = CommentThreadRoot::new(
            self.state.client.clone(),
            self.state.session.clone(),
            self.state.settings,
            ThreadMode::Full,
            post,
            self.events.clone(),
        );
        if let Some(subject) = subject {
            root.set_subject(subject);
        }
        let id = self.next_thread;
        self.next_thread += 1;
        self.editing = None;
        self.stack.push(ThreadSlot::new(id, root));
        info!(depth = self.stack.len(), "Opened nested thread");
        self.mount_current();
    }

    fn go_back(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        if let Some(slot) = self.stack.pop() {
            slot.root.shutdown();
        }
        self.editing = None;
        self.announce_focus();
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if let Some(owner) = self.editing {
            self.handle_composer_key(owner, key);
            return;
        }
        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(false),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(true),
            KeyCode::Enter | KeyCode::Char(' ') => self.activate(),
            KeyCode::Char('r') if plain => {
                let target = match self.current().and_then(ThreadSlot::selected_row) {
                    Some(ThreadRow::Comment { id, .. }) => Some(ListOwner::Node(id)),
                    Some(ThreadRow::Composer { owner, .. }) => Some(owner),
                    _ => None,
                };
                if let Some(owner) = target {
                    self.toggle_composer(owner);
                }
            }
            KeyCode::Char('c') if plain => self.toggle_composer(ListOwner::Top),
            KeyCode::Char('l') if plain => {
                if let Some(ThreadRow::Comment { id, .. }) =
                    self.current().and_then(ThreadSlot::selected_row)
                {
                    self.like(ListOwner::Node(id));
                }
            }
            KeyCode::Char('L') => self.like(ListOwner::Top),
            KeyCode::Esc => self.go_back(),
            _ => {}
        }
    }

    fn move_selection(&mut self, down: bool) {
        let Some(slot) = self.stack.last_mut() else {
            return;
        };
        if slot.rows.is_empty() {
            return;
        }
        let current = slot.list_state.selected().unwrap_or(0);
        let next = if down {
            (current + 1).min(slot.rows.len() - 1)
        } else {
            current.saturating_sub(1)
        };
        slot.list_state.select(Some(next));
        let thread = slot.id;
        let position = slot.scroll_position();
        let pending = slot.root.on_scroll(position);
        if let Some(pending) = pending {
            slot.refresh_rows();
            self.spawn_fetch(thread, pending);
        }
    }

    fn activate(&mut self) {
        let Some(slot) = self.stack.last_mut() else {
            return;
        };
        let thread = slot.id;
        let Some(row) = slot.selected_row() else {
            return;
        };
        let pending = match row {
            ThreadRow::Comment { id, .. } => slot.root.show_replies(id),
            ThreadRow::MoreReplies { owner, .. } => slot.root.load_more(owner),
            ThreadRow::LoadFailed { owner, .. } => slot.root.retry(owner),
            ThreadRow::ViewAll { .. } => {
                slot.root.view_all();
                None
            }
            ThreadRow::Composer { owner, .. } => {
                if slot.root.is_logged_in() {
                    self.editing = Some(owner);
                }
                None
            }
            ThreadRow::Loading { .. } | ThreadRow::Empty => None,
        };
        slot.refresh_rows();
        if let Some(pending) = pending {
            self.spawn_fetch(thread, pending);
        }
    }

    fn toggle_composer(&mut self, owner: ListOwner) {
        let Some(slot) = self.stack.last_mut() else {
            return;
        };
        if !slot.root.can_reply(owner) {
            self.notify(Notice::info(
                "Replies are closed at this depth. Press Enter to open the thread.",
            ));
            return;
        }
        let open = slot.root.toggle_composer(owner);
        let logged_in = slot.root.is_logged_in();
        slot.refresh_rows();
        if open {
            slot.select_composer(owner);
            if logged_in {
                self.editing = Some(owner);
            }
        } else if self.editing == Some(owner) {
            self.editing = None;
        }
    }

    fn like(&mut self, owner: ListOwner) {
        let Some(slot) = self.stack.last_mut() else {
            return;
        };
        let thread = slot.id;
        if !slot.root.is_logged_in() {
            self.notify(Notice::info("Log in to like posts."));
            return;
        }
        if let Some(pending) = slot.root.begin_toggle_like(owner) {
            self.spawn_like(thread, pending);
        }
    }

    fn handle_composer_key(&mut self, owner: ListOwner, key: KeyEvent) {
        let modified = key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);
        if key.code == KeyCode::Esc {
            self.editing = None;
            return;
        }
        let Some(slot) = self.stack.last_mut() else {
            return;
        };
        let thread = slot.id;
        if key.code == KeyCode::Enter && modified {
            match slot.root.begin_reply(owner) {
                Ok(pending) => {
                    slot.refresh_rows();
                    self.spawn_reply(thread, pending);
                }
                Err(SubmitBlocked::Unauthenticated) => {
                    self.notify(Notice::warning(SubmitBlocked::Unauthenticated.message()))
                }
                Err(blocked) => debug!(?blocked, "Reply not sent"),
            }
            return;
        }
        let Some(composer) = slot.root.composer_mut(owner) else {
            self.editing = None;
            return;
        };
        if composer.is_submitting() {
            return;
        }
        match key.code {
            KeyCode::Enter => composer.insert('\n'),
            KeyCode::Backspace => composer.backspace(),
            KeyCode::Char(ch) if !modified => composer.insert(ch),
            _ => {}
        }
    }

    fn is_busy(&self) -> bool {
        let Some(slot) = self.current() else {
            return false;
        };
        slot.rows.iter().any(|row| match row {
            ThreadRow::Loading { .. } => true,
            ThreadRow::Composer { owner, .. } => slot
                .root
                .composer(*owner)
                .is_some_and(ReplyComposer::is_submitting),
            _ => false,
        })
    }

    fn render_view(&mut self, area: Rect, buf: &mut Buffer) {
        let width = area.width.saturating_sub(2) as usize;
        if self.markdown_width != width {
            self.markdown_width = width;
            self.markdown_cache.clear();
        }
        let depth = self.stack.len();
        let me = self
            .state
            .session
            .as_ref()
            .map(|session| session.account.address.clone());
        let context = RowContext {
            me: me.as_ref(),
            editing: self.editing,
            throbber: &self.throbber_state,
            width,
        };
        let Some(slot) = self.stack.last_mut() else {
            return;
        };

        let subject = slot.root.subject().map(|post| {
            let summary = slot
                .root
                .reactions(ListOwner::Top)
                .map(|r| r.summary(slot.root.is_logged_in()));
            subject_lines(post, summary, &mut self.markdown_cache, &context)
        });
        let header_height = subject
            .as_ref()
            .map_or(0, |lines| {
                u16::try_from(lines.len())
                    .unwrap_or(u16::MAX)
                    .saturating_add(2)
                    .min(area.height / 3)
            });
        let [header_area, list_area] = vertical![==header_height, *=1].areas(area);
        if let Some(lines) = subject {
            let title = match slot.root.subject() {
                Some(post) if post.comment_on.is_some() => " Comment ",
                _ => " Post ",
            };
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .block(
                    Block::bordered()
                        .border_type(BorderType::Rounded)
                        .title(title),
                )
                .render(header_area, buf);
        }

        let items = slot
            .rows
            .iter()
            .map(|row| row_item(&slot.root, *row, &mut self.markdown_cache, &context))
            .collect::<Vec<_>>();
        let heights = items.iter().map(ListItem::height).collect::<Vec<_>>();
        let mode = match slot.root.mode() {
            ThreadMode::Preview => "preview",
            ThreadMode::Full => "all",
        };
        let title = if depth > 1 {
            format!(" Replies to {} ({mode}) ", slot.root.post())
        } else {
            format!(" Comments ({mode}) ")
        };
        let list = List::new(items)
            .block(
                Block::bordered()
                    .border_type(BorderType::Rounded)
                    .title(title),
            )
            .highlight_style(Style::new().add_modifier(Modifier::REVERSED));
        StatefulWidget::render(list, list_area, buf, &mut slot.list_state);
        let inner_height = list_area.height.saturating_sub(2) as usize;
        slot.visible_rows = visible_count(&heights, slot.list_state.offset(), inner_height);
    }
}

struct RowContext<'a> {
    me: Option<&'a AccountAddress>,
    editing: Option<ListOwner>,
    throbber: &'a ThrobberState,
    width: usize,
}

fn visible_count(heights: &[usize], offset: usize, height: usize) -> usize {
    let mut used = 0;
    let mut count = 0;
    for h in heights.iter().skip(offset) {
        if used + h > height && count > 0 {
            break;
        }
        used += h;
        count += 1;
    }
    count
}

fn gutter(depth: u32) -> Span<'static> {
    Span::styled(
        "│ ".repeat(depth.saturating_sub(1) as usize),
        Style::new().fg(Color::DarkGray),
    )
}

fn with_gutter(depth: u32, line: Line<'static>) -> Line<'static> {
    let mut spans = vec![gutter(depth)];
    spans.extend(line.spans);
    Line::from(spans)
}

fn throbber_line(label: &'static str, state: &ThrobberState) -> Line<'static> {
    Throbber::default()
        .label(label)
        .style(Style::new().fg(Color::Cyan))
        .throbber_set(BRAILLE_SIX_DOUBLE)
        .use_type(WhichUse::Spin)
        .to_line(state)
}

fn body_lines(
    post: &Post,
    width: usize,
    cache: &mut MarkdownCache,
) -> Vec<Line<'static>> {
    cache
        .entry((post.id.clone(), width))
        .or_insert_with(|| match post.body.text() {
            Some(text) => render_markdown_lines(text, width, 0),
            None => vec![Line::from(Span::styled(
                "(unsupported content)",
                Style::new().dim().italic(),
            ))],
        })
        .clone()
}

fn author_line(post: &Post, me: Option<&AccountAddress>) -> Line<'static> {
    let author_style = if me == Some(&post.author.address) {
        Style::new().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    };
    Line::from(vec![
        Span::styled(post.author.handle(), author_style),
        Span::raw("  "),
        Span::styled(post.created_at(), Style::new().dim()),
    ])
}

fn stats_line(summary: ReactionSummary, pending: bool, hint: Option<&'static str>) -> Line<'static> {
    let like_style = if summary.has_upvoted {
        Style::new().fg(Color::Red)
    } else {
        Style::new().dim()
    };
    let mut spans = vec![
        Span::styled(format!("♥ {}", summary.upvote_count), like_style),
        Span::raw("  "),
        Span::styled(format!("↩ {}", summary.comment_count), Style::new().dim()),
    ];
    if pending {
        spans.push(Span::styled(" …", Style::new().dim()));
    }
    if let Some(hint) = hint {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(hint, Style::new().fg(Color::Blue)));
    }
    Line::from(spans)
}

fn replies_hint(node: &ThreadNode, max_nesting: u32) -> Option<&'static str> {
    let has_replies =
        node.comment().stats.comments > 0 || !node.listing().children().is_empty();
    if node.nesting_level() >= max_nesting {
        return has_replies.then_some("⤴ open thread");
    }
    match node.state() {
        RepliesState::Collapsed => has_replies.then_some("▸ show replies"),
        RepliesState::ExpandingReplies => Some("loading replies"),
        RepliesState::Expanded | RepliesState::LoadingMoreReplies => Some("▾ hide replies"),
    }
}

fn subject_lines(
    post: &Post,
    summary: Option<ReactionSummary>,
    cache: &mut MarkdownCache,
    context: &RowContext,
) -> Vec<Line<'static>> {
    let mut lines = vec![author_line(post, context.me)];
    lines.extend(body_lines(post, context.width, cache));
    if let Some(summary) = summary {
        lines.push(stats_line(summary, false, None));
    }
    lines
}

fn row_item(
    root: &CommentThreadRoot,
    row: ThreadRow,
    cache: &mut MarkdownCache,
    context: &RowContext,
) -> ListItem<'static> {
    match row {
        ThreadRow::Comment { id, depth } => comment_item(root, id, depth, cache, context),
        ThreadRow::Composer { owner, depth } => match root.composer(owner) {
            Some(composer) => composer_item(
                composer,
                root.composer_view(),
                depth,
                context.editing == Some(owner),
                context.throbber,
            ),
            None => ListItem::new(Line::default()),
        },
        ThreadRow::Loading { depth, .. } => ListItem::new(with_gutter(
            depth,
            throbber_line("Loading replies", context.throbber),
        )),
        ThreadRow::LoadFailed { depth, .. } => ListItem::new(with_gutter(
            depth,
            Line::from(Span::styled(
                "Could not load replies. Press Enter to retry.",
                Style::new().fg(Color::Red),
            )),
        )),
        ThreadRow::MoreReplies { depth, .. } => ListItem::new(with_gutter(
            depth,
            Line::from(Span::styled("Show more replies", Style::new().fg(Color::Blue))),
        )),
        ThreadRow::ViewAll { hidden } => {
            let label = if hidden > 0 {
                format!("View all comments ({hidden} more)")
            } else {
                "View all comments".to_string()
            };
            ListItem::new(Line::from(Span::styled(
                label,
                Style::new().fg(Color::Blue).bold(),
            )))
        }
        ThreadRow::Empty => ListItem::new(Line::from(Span::styled(
            "No comments yet. Press c to write the first one.",
            Style::new().dim(),
        ))),
    }
}

fn comment_item(
    root: &CommentThreadRoot,
    id: NodeId,
    depth: u32,
    cache: &mut MarkdownCache,
    context: &RowContext,
) -> ListItem<'static> {
    let Some(node) = root.tree().node(id) else {
        return ListItem::new(Line::default());
    };
    let comment = node.comment();
    let indent = 2 * depth.saturating_sub(1) as usize;
    let width = context.width.saturating_sub(indent);
    let mut lines = vec![with_gutter(depth, author_line(comment, context.me))];
    lines.extend(
        body_lines(comment, width, cache)
            .into_iter()
            .map(|line| with_gutter(depth, line)),
    );
    let reactions = node.reactions();
    lines.push(with_gutter(
        depth,
        stats_line(
            reactions.summary(root.is_logged_in()),
            reactions.is_pending(),
            replies_hint(node, root.tree().max_nesting()),
        ),
    ));
    ListItem::new(lines)
}

fn composer_item(
    composer: &ReplyComposer,
    view: ComposerView,
    depth: u32,
    editing: bool,
    throbber: &ThrobberState,
) -> ListItem<'static> {
    let mut lines = Vec::new();
    match view {
        ComposerView::LoginRequired => lines.push(Line::from(Span::styled(
            "Log in to reply.",
            Style::new().fg(Color::Yellow),
        ))),
        ComposerView::Editing => {
            lines.push(Line::from(Span::styled(
                format!("✎ Reply to {}", composer.parent()),
                Style::new().bold(),
            )));
            let mut body = composer
                .content()
                .split('\n')
                .map(|line| Line::from(format!("> {line}")))
                .collect::<Vec<_>>();
            if editing && let Some(last) = body.last_mut() {
                last.spans
                    .push(Span::styled("▏", Style::new().fg(Color::Cyan)));
            }
            lines.extend(body);
            if composer.is_submitting() {
                lines.push(throbber_line("Sending", throbber));
            } else if let Some(error) = composer.last_error() {
                lines.push(Line::from(Span::styled(
                    error.to_string(),
                    Style::new().fg(Color::Red),
                )));
            }
            let hint = if editing {
                "Ctrl+Enter to send, Esc to stop typing"
            } else {
                "Enter to type"
            };
            lines.push(Line::from(Span::styled(hint, Style::new().dim())));
        }
    }
    ListItem::new(
        lines
            .into_iter()
            .map(|line| with_gutter(depth, line))
            .collect::<Vec<_>>(),
    )
}

#[async_trait(?Send)]
impl Component for ThreadView {
    fn render(&mut self, area: Layout, buf: &mut Buffer) {
        self.render_view(area.main_content, buf);
    }

    fn register_action_tx(&mut self, action_tx: Sender<Action>) {
        self.action_tx = Some(action_tx);
        self.mount_current();
    }

    async fn handle_event(&mut self, event: Action) -> Result<(), AppError> {
        match event {
            Action::AppEvent(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                self.handle_key(key)
            }
            Action::RepliesLoaded { thread, done } => {
                let Some(slot) = self.slot_mut(thread) else {
                    debug!(thread, "Dropping replies for a closed thread");
                    return Ok(());
                };
                let follow_ups = slot.root.apply(done);
                slot.refresh_rows();
                for pending in follow_ups {
                    self.spawn_fetch(thread, pending);
                }
                self.update_count();
            }
            Action::ReplyFinished { thread, done } => {
                let owner = done.owner;
                let Some(slot) = self.slot_mut(thread) else {
                    debug!(thread, "Dropping reply result for a closed thread");
                    return Ok(());
                };
                let refresh = slot.root.finish_reply(done);
                let still_open = slot.root.tree().is_composing(owner);
                slot.refresh_rows();
                if !still_open && self.editing == Some(owner) {
                    self.editing = None;
                }
                if let Some(pending) = refresh {
                    self.spawn_fetch(thread, pending);
                }
                self.update_count();
            }
            Action::LikeFinished { thread, done } => {
                if let Some(slot) = self.slot_mut(thread) {
                    slot.root.finish_toggle_like(done);
                }
            }
            Action::SubjectLoaded { thread, post } => {
                if let Some(slot) = self.slot_mut(thread) {
                    slot.root.set_subject(*post);
                }
            }
            Action::Thread(ThreadEvent::MaxNestingReached { post }) => self.escalate(post),
            Action::Thread(ThreadEvent::ViewAll { post }) => {
                if let Some(slot) = self.stack.last_mut()
                    && slot.root.post() == &post
                {
                    slot.root.set_mode(ThreadMode::Full);
                    slot.refresh_rows();
                } else {
                    warn!(%post, "View all for a thread that is not focused");
                }
            }
            Action::Tick if self.is_busy() => self.throbber_state.calc_next(),
            _ => {}
        }
        Ok(())
    }

    fn is_animating(&self) -> bool {
        self.is_busy()
    }

    fn capture_focus_event(&self, event: &Event) -> bool {
        self.editing.is_some() && matches!(event, Event::Key(_))
    }

    fn set_global_help(&self) {
        if let Some(action_tx) = &self.action_tx {
            let _ = action_tx.try_send(Action::SetHelp(HELP));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::mpsc::{Receiver, UnboundedReceiver};

    use super::*;
    use crate::{
        config::ThreadSettings,
        remote::{
            RemoteContentClient,
            snapshot::{Operation, Snapshot, SnapshotClient},
        },
    };

    fn snapshot() -> Snapshot {
        Snapshot::new(10)
            .with_session("0xme", "me")
            .with_post("p1", None, "The **post** itself")
            .with_post("c1", Some("p1"), "first comment")
            .with_post("c1a", Some("c1"), "a reply")
            .with_post("c1a1", Some("c1a"), "deep reply")
            .with_post("c2", Some("p1"), "second comment")
    }

    struct Harness {
        view: ThreadView,
        actions: Receiver<Action>,
        events: UnboundedReceiver<ThreadEvent>,
        client: Arc<SnapshotClient>,
    }

    async fn harness(settings: ThreadSettings) -> Harness {
        let client = Arc::new(SnapshotClient::new(snapshot()));
        let session = client.current_session().await.unwrap();
        let state = AppState {
            client: client.clone(),
            session,
            settings,
            post: PostId::new("p1"),
            mode: ThreadMode::Full,
        };
        let (events_tx, events) = tokio::sync::mpsc::unbounded_channel();
        let (action_tx, actions) = tokio::sync::mpsc::channel(100);
        let mut view = ThreadView::new(state, events_tx);
        view.register_action_tx(action_tx);
        Harness {
            view,
            actions,
            events,
            client,
        }
    }

    impl Harness {
        /// Feeds queued actions back into the view until it goes quiet.
        async fn settle(&mut self) {
            while let Ok(Some(action)) =
                tokio::time::timeout(Duration::from_millis(100), self.actions.recv()).await
            {
                self.view.handle_event(action).await.unwrap();
            }
        }

        async fn key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
            self.view
                .handle_event(Action::AppEvent(Event::Key(KeyEvent::new(code, modifiers))))
                .await
                .unwrap();
        }

        fn screen(&mut self) -> String {
            let area = Rect::new(0, 0, 80, 40);
            let mut buf = Buffer::empty(area);
            Component::render(&mut self.view, Layout::new(area), &mut buf);
            (0..area.height)
                .map(|y| {
                    (0..area.width)
                        .map(|x| buf[(x, y)].symbol().to_string())
                        .collect::<String>()
                })
                .collect::<Vec<_>>()
                .join("\n")
        }

        fn select_comment(&mut self, post: &str) {
            let slot = self.view.stack.last_mut().unwrap();
            let id = slot.root.tree().find(&PostId::new(post)).unwrap();
            let index = slot
                .rows
                .iter()
                .position(|row| matches!(row, ThreadRow::Comment { id: i, .. } if *i == id))
                .unwrap();
            slot.list_state.select(Some(index));
        }
    }

    #[tokio::test]
    async fn loads_subject_and_comments() {
        let mut h = harness(ThreadSettings::default()).await;
        h.settle().await;
        let screen = h.screen();
        assert!(screen.contains("post itself"));
        assert!(screen.contains("first comment"));
        assert!(screen.contains("second comment"));
        assert!(!screen.contains("a reply"));
        assert_eq!(h.view.current().unwrap().root.tree().len(), 2);
    }

    #[tokio::test]
    async fn loaded_count_reaches_the_status_bar_as_an_action() {
        let mut h = harness(ThreadSettings::default()).await;
        h.settle().await;
        h.select_comment("c1");
        h.key(KeyCode::Enter, KeyModifiers::NONE).await;
        let mut counts = Vec::new();
        while let Ok(Some(action)) =
            tokio::time::timeout(Duration::from_millis(100), h.actions.recv()).await
        {
            if let Action::LoadedCount { count } = action {
                counts.push(count);
            }
            h.view.handle_event(action).await.unwrap();
        }
        assert_eq!(counts.last(), Some(&3));
    }

    #[tokio::test]
    async fn enter_expands_nested_replies() {
        let mut h = harness(ThreadSettings::default()).await;
        h.settle().await;
        h.select_comment("c1");
        h.key(KeyCode::Enter, KeyModifiers::NONE).await;
        h.settle().await;
        assert!(h.screen().contains("a reply"));
        assert_eq!(h.client.calls(Operation::FetchReferences), 2);
    }

    #[tokio::test]
    async fn max_nesting_opens_a_nested_thread() {
        let settings = ThreadSettings {
            max_nesting_full: 1,
            ..ThreadSettings::default()
        };
        let mut h = harness(settings).await;
        h.settle().await;
        h.select_comment("c1");
        h.key(KeyCode::Enter, KeyModifiers::NONE).await;
        let event = h.events.recv().await.unwrap();
        assert_eq!(
            event,
            ThreadEvent::MaxNestingReached {
                post: PostId::new("c1")
            }
        );
        h.view.handle_event(Action::Thread(event)).await.unwrap();
        h.settle().await;
        assert_eq!(h.view.depth(), 2);
        let screen = h.screen();
        assert!(screen.contains("first comment"));
        assert!(screen.contains("a reply"));
        assert!(!screen.contains("second comment"));

        h.key(KeyCode::Esc, KeyModifiers::NONE).await;
        assert_eq!(h.view.depth(), 1);
        assert!(h.screen().contains("second comment"));
    }

    #[tokio::test]
    async fn composer_captures_keys_and_posts() {
        let mut h = harness(ThreadSettings::default()).await;
        h.settle().await;
        h.key(KeyCode::Char('c'), KeyModifiers::NONE).await;
        assert!(h.view.is_editing());
        let q = Event::Key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(h.view.capture_focus_event(&q));
        for ch in "quite good".chars() {
            h.key(KeyCode::Char(ch), KeyModifiers::NONE).await;
        }
        assert!(h.screen().contains("> quite good"));

        h.key(KeyCode::Enter, KeyModifiers::CONTROL).await;
        h.settle().await;
        assert!(!h.view.is_editing());
        let mut posted = None;
        while let Ok(event) = h.events.try_recv() {
            if let ThreadEvent::ReplyPosted { content, .. } = event {
                posted = Some(content);
            }
        }
        assert_eq!(posted.as_deref(), Some("quite good"));
        assert!(h.screen().contains("quite good"));
        assert_eq!(
            h.client.reply_texts(&PostId::new("p1")).await,
            vec!["first comment", "second comment", "quite good"]
        );
    }

    #[tokio::test]
    async fn esc_leaves_the_composer_but_keeps_the_draft() {
        let mut h = harness(ThreadSettings::default()).await;
        h.settle().await;
        h.key(KeyCode::Char('c'), KeyModifiers::NONE).await;
        h.key(KeyCode::Char('h'), KeyModifiers::NONE).await;
        h.key(KeyCode::Esc, KeyModifiers::NONE).await;
        assert!(!h.view.is_editing());
        assert_eq!(h.view.depth(), 1);
        assert!(h.screen().contains("> h"));
    }

    #[test]
    fn visible_count_stops_at_viewport() {
        assert_eq!(visible_count(&[3, 3, 3], 0, 7), 2);
        assert_eq!(visible_count(&[3, 3, 3], 1, 10), 2);
        assert_eq!(visible_count(&[12], 0, 5), 1);
        assert_eq!(visible_count(&[], 0, 5), 0);
    }
}
