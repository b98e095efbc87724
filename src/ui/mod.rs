pub mod components;
pub mod layout;
pub mod markdown;

pub use crate::app::state::AppState;

use crate::{
    errors::AppError,
    remote::{Post, PostId},
    thread::{
        ThreadEvent,
        root::{FetchDone, ReplyDone, ToggleDone},
    },
    ui::components::{
        Component, DumbComponent,
        help::{GLOBAL_HELP, HelpElementKind, HelpOverlay},
        notice::NoticeToast,
        status_bar::StatusBar,
        thread_view::ThreadView,
    },
};
use crossterm::{
    event::{
        EventStream, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    execute,
};
use futures::{StreamExt, future::FutureExt};
use ratatui::{
    crossterm,
    prelude::*,
    widgets::{Block, BorderType, Paragraph},
};
use ratatui_macros::line;
use std::io::stdout;
use tokio::{
    select,
    sync::mpsc::{Receiver, Sender, UnboundedReceiver},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

const TICK_RATE: std::time::Duration = std::time::Duration::from_millis(100);

pub async fn run(state: AppState) -> Result<(), AppError> {
    let mut terminal = ratatui::init();
    let (action_tx, action_rx) = tokio::sync::mpsc::channel(100);
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let thread_view = ThreadView::new(state.clone(), events_tx);
    let mut app = App::new(action_tx, action_rx, events_rx, &state, thread_view);
    let result = app.run(&mut terminal).await;
    ratatui::restore();
    result
}

struct App {
    action_tx: Sender<Action>,
    action_rx: Receiver<Action>,
    events_rx: Option<UnboundedReceiver<ThreadEvent>>,
    cancel_action: CancellationToken,
    components: Vec<Box<dyn Component>>,
    dumb_components: Vec<Box<dyn DumbComponent>>,
    help: &'static [HelpElementKind],
    in_help: bool,
}

impl App {
    fn new(
        action_tx: Sender<Action>,
        action_rx: Receiver<Action>,
        events_rx: UnboundedReceiver<ThreadEvent>,
        state: &AppState,
        thread_view: ThreadView,
    ) -> Self {
        Self {
            action_tx,
            action_rx,
            events_rx: Some(events_rx),
            cancel_action: Default::default(),
            components: vec![Box::new(thread_view)],
            dumb_components: vec![
                Box::new(StatusBar::new(state)),
                Box::new(NoticeToast::default()),
            ],
            help: &[],
            in_help: false,
        }
    }

    pub async fn run(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<impl std::io::Write>>,
    ) -> Result<(), AppError> {
        let action_tx = self.action_tx.clone();
        for component in self.components.iter_mut() {
            component.register_action_tx(action_tx.clone());
        }
        for component in self.dumb_components.iter_mut() {
            component.register_action_tx(action_tx.clone());
        }
        execute!(
            stdout(),
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )?;
        self.spawn_input(action_tx.clone());
        if let Some(events_rx) = self.events_rx.take() {
            self.spawn_event_forwarder(events_rx, action_tx);
        }
        for component in self.components.iter() {
            component.set_global_help();
        }
        self.draw(terminal)?;

        let result = self.event_loop(terminal).await;
        self.cancel_action.cancel();
        execute!(stdout(), PopKeyboardEnhancementFlags)?;
        result
    }

    fn spawn_input(&self, action_tx: Sender<Action>) {
        let ctok = self.cancel_action.clone();
        tokio::spawn(async move {
            let mut tick_interval = tokio::time::interval(TICK_RATE);
            let mut event_stream = EventStream::new();

            loop {
                let event = select! {
                    _ = ctok.cancelled() => break,
                    _ = tick_interval.tick() => Action::Tick,
                    kevent = event_stream.next().fuse() => {
                        match kevent {
                            Some(Ok(kevent)) => Action::AppEvent(kevent),
                            Some(Err(..)) => Action::None,
                            None => break,
                        }
                    }
                };
                if action_tx.send(event).await.is_err() {
                    break;
                }
            }
        });
    }

    /// Thread events arrive on their own channel; they re-enter the loop as actions.
    fn spawn_event_forwarder(
        &self,
        mut events_rx: UnboundedReceiver<ThreadEvent>,
        action_tx: Sender<Action>,
    ) {
        let ctok = self.cancel_action.clone();
        tokio::spawn(async move {
            loop {
                let event = select! {
                    _ = ctok.cancelled() => break,
                    event = events_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                if action_tx.send(Action::Thread(event)).await.is_err() {
                    break;
                }
            }
        });
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<impl std::io::Write>>,
    ) -> Result<(), AppError> {
        loop {
            let action = self.action_rx.recv().await;
            if let Some(ref action) = action {
                let swallowed = self.in_help && matches!(action, Action::AppEvent(_));
                if !swallowed {
                    for component in self.components.iter_mut() {
                        if let Err(err) = component.handle_event(action.clone()).await {
                            error!(%err, "Component failed to handle action");
                        }
                    }
                }
                for component in self.dumb_components.iter_mut() {
                    if let Err(err) = component.handle_event(action.clone()).await {
                        error!(%err, "Component failed to handle action");
                    }
                }
            }
            let should_draw = match &action {
                Some(Action::Tick) => self.has_animated_components(),
                Some(Action::None) => false,
                Some(Action::Quit) | None => false,
                _ => true,
            };
            match action {
                Some(Action::None) | Some(Action::Tick) => {}
                Some(Action::AppEvent(ref event)) => {
                    self.handle_event(event).await?;
                }
                Some(Action::SetHelp(help)) => {
                    self.help = help;
                }
                Some(Action::Quit) | None => {
                    self.cancel_action.cancel();
                    break;
                }
                _ => {}
            }
            if should_draw || matches!(action, Some(Action::ForceRender)) {
                self.draw(terminal)?;
            }
            if self.cancel_action.is_cancelled() {
                break;
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn handle_event(&mut self, event: &crossterm::event::Event) -> Result<(), AppError> {
        use crossterm::event::{Event::Key, KeyCode::*, KeyEventKind, KeyModifiers};
        let Key(key) = event else {
            return Ok(());
        };
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, Char('c' | 'q')) {
            info!("Quitting");
            self.cancel_action.cancel();
            return Ok(());
        }
        if self.in_help {
            if matches!(key.code, Esc | Char('?') | Char('q')) {
                self.in_help = false;
            }
            return Ok(());
        }
        let captured = self
            .components
            .iter()
            .any(|c| c.should_render() && c.capture_focus_event(event));
        if captured {
            return Ok(());
        }
        match key.code {
            Char('q') => self.cancel_action.cancel(),
            Char('?') => self.in_help = true,
            _ => {}
        }
        Ok(())
    }

    fn has_animated_components(&self) -> bool {
        self.components
            .iter()
            .any(|component| component.should_render() && component.is_animating())
    }

    fn draw(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<impl std::io::Write>>,
    ) -> Result<(), AppError> {
        terminal.draw(|f| {
            let area = f.area();
            let layout = layout::Layout::new(area);
            for component in self.components.iter() {
                if component.should_render()
                    && let Some(p) = component.cursor()
                {
                    f.set_cursor_position(p);
                }
            }
            let buf = f.buffer_mut();
            Paragraph::new(line!["Threadline"].style(Style::new().bold()))
                .centered()
                .render(layout.title_bar, buf);

            for component in self.components.iter_mut() {
                if component.should_render() {
                    component.render(layout, buf);
                }
            }
            for component in self.dumb_components.iter_mut() {
                component.render(layout, buf);
            }
            if self.in_help {
                let sections = [GLOBAL_HELP, self.help];
                HelpOverlay::new(&sections)
                    .percent_width(60)
                    .block(
                        Block::bordered()
                            .title("Help")
                            .border_type(BorderType::Rounded),
                    )
                    .render(area, buf);
            }
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Action {
    None,
    Tick,
    Quit,
    AppEvent(crossterm::event::Event),
    ForceRender,
    RepliesLoaded {
        thread: u64,
        done: FetchDone,
    },
    ReplyFinished {
        thread: u64,
        done: ReplyDone,
    },
    LikeFinished {
        thread: u64,
        done: ToggleDone,
    },
    SubjectLoaded {
        thread: u64,
        post: Box<Post>,
    },
    Thread(ThreadEvent),
    ThreadFocused {
        post: PostId,
        depth: usize,
    },
    LoadedCount {
        count: usize,
    },
    HideNotice {
        seq: u64,
    },
    SetHelp(&'static [HelpElementKind]),
}
