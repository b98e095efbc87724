use std::time::Duration;

use async_trait::async_trait;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, BorderType, Clear, Paragraph, Widget, Wrap},
};
use tokio::sync::mpsc::Sender;
use tracing::debug;

use crate::{
    errors::AppError,
    thread::{Notice, NoticeLevel, ThreadEvent},
    ui::{Action, components::DumbComponent, layout::Layout},
};

const DEFAULT_DURATION: Duration = Duration::from_secs(3);

impl From<NoticeLevel> for Color {
    fn from(value: NoticeLevel) -> Self {
        match value {
            NoticeLevel::Info => Color::Blue,
            NoticeLevel::Success => Color::Green,
            NoticeLevel::Warning => Color::Yellow,
            NoticeLevel::Error => Color::Red,
        }
    }
}

fn title(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Info => "Info",
        NoticeLevel::Success => "Done",
        NoticeLevel::Warning => "Warning",
        NoticeLevel::Error => "Error",
    }
}

/// Timed toast for thread notices. Each notice hides itself after the default
/// duration unless a newer one replaced it.
pub struct NoticeToast {
    action_tx: Option<Sender<Action>>,
    current_toast: Option<(u64, Notice)>,
    next_seq: u64,
    default_duration: Duration,
}

pub struct NoticeToastBuilder {
    default_duration: Duration,
    action_tx: Option<Sender<Action>>,
}

impl NoticeToastBuilder {
    pub fn new() -> Self {
        Self {
            default_duration: DEFAULT_DURATION,
            action_tx: None,
        }
    }

    pub fn default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    /// Channel the hide timer reports back on. Without one, toasts stay until replaced.
    pub fn action_tx(mut self, tx: Sender<Action>) -> Self {
        self.action_tx = Some(tx);
        self
    }

    pub fn build(self) -> NoticeToast {
        NoticeToast {
            action_tx: self.action_tx,
            current_toast: None,
            next_seq: 0,
            default_duration: self.default_duration,
        }
    }
}

impl Default for NoticeToastBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for NoticeToast {
    fn default() -> Self {
        NoticeToastBuilder::new().build()
    }
}

impl NoticeToast {
    pub fn current_toast(&self) -> Option<&Notice> {
        self.current_toast.as_ref().map(|(_, notice)| notice)
    }

    pub fn has_toast(&self) -> bool {
        self.current_toast.is_some()
    }

    pub fn show_toast(&mut self, notice: Notice) {
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(?notice, seq, "Showing notice");
        self.current_toast = Some((seq, notice));
        if let Some(tx) = self.action_tx.clone() {
            let duration = self.default_duration;
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let _ = tx.send(Action::HideNotice { seq }).await;
            });
        }
    }

    /// Hides the toast shown as `seq`. Timers of replaced toasts do nothing.
    pub fn hide_toast(&mut self, seq: u64) {
        if self
            .current_toast
            .as_ref()
            .is_some_and(|(current, _)| *current == seq)
        {
            self.current_toast = None;
        }
    }

    fn render_in(&self, area: Rect, buf: &mut Buffer) {
        let Some((_, notice)) = &self.current_toast else {
            return;
        };
        let color = Color::from(notice.level);
        let width = area.width.saturating_sub(2).max(1) as usize;
        let height = textwrap::wrap(&notice.message, width).len() as u16 + 2;
        let area = Rect {
            height: height.min(area.height),
            ..area
        };
        Clear.render(area, buf);
        Paragraph::new(notice.message.as_str())
            .wrap(Wrap { trim: true })
            .block(
                Block::bordered()
                    .border_type(BorderType::Rounded)
                    .border_style(Style::new().fg(color))
                    .title(title(notice.level)),
            )
            .render(area, buf);
    }
}

#[async_trait(?Send)]
impl DumbComponent for NoticeToast {
    fn render(&mut self, area: Layout, buf: &mut Buffer) {
        self.render_in(area.notice, buf);
    }

    fn register_action_tx(&mut self, action_tx: Sender<Action>) {
        self.action_tx = Some(action_tx);
    }

    async fn handle_event(&mut self, event: Action) -> Result<(), AppError> {
        match event {
            Action::Thread(ThreadEvent::Notice(notice)) => self.show_toast(notice),
            Action::Thread(ThreadEvent::ReplyPosted { .. }) => {
                self.show_toast(Notice::success("Reply posted."))
            }
            Action::HideNotice { seq } => self.hide_toast(seq),
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hides_after_duration() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let mut toast = NoticeToastBuilder::new()
            .default_duration(Duration::from_millis(10))
            .action_tx(tx)
            .build();
        toast
            .handle_event(Action::Thread(ThreadEvent::Notice(Notice::error("nope"))))
            .await
            .unwrap();
        assert_eq!(toast.current_toast().map(|n| n.message.as_str()), Some("nope"));

        let action = rx.recv().await.unwrap();
        assert!(matches!(action, Action::HideNotice { seq: 0 }));
        toast.handle_event(action).await.unwrap();
        assert!(!toast.has_toast());
    }

    #[tokio::test]
    async fn stale_hide_keeps_newer_notice() {
        let mut toast = NoticeToast::default();
        toast.show_toast(Notice::info("first"));
        toast.show_toast(Notice::warning("second"));
        toast.hide_toast(0);
        assert_eq!(toast.current_toast().map(|n| n.message.as_str()), Some("second"));
    }

    #[test]
    fn renders_message_with_level_title() {
        let mut toast = NoticeToast::default();
        toast.show_toast(Notice::error("could not post"));
        let area = Rect::new(0, 0, 30, 5);
        let mut buf = Buffer::empty(area);
        toast.render_in(area, &mut buf);
        let text = buf
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>();
        assert!(text.contains("Error"));
        assert!(text.contains("could not post"));
        assert_eq!(buf[(0, 0)].fg, Color::Red);
    }
}
