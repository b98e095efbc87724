use async_trait::async_trait;
use ratatui::buffer::Buffer;

use crate::errors::AppError;
use crate::ui::{Action, layout::Layout};
use ratatui::crossterm::event::Event;

pub mod help;
pub mod notice;
pub mod status_bar;
pub mod thread_view;

#[async_trait(?Send)]
pub trait DumbComponent {
    fn render(&mut self, area: Layout, buf: &mut Buffer);
    fn register_action_tx(&mut self, action_tx: tokio::sync::mpsc::Sender<Action>) {
        let _ = action_tx;
    }
    async fn handle_event(&mut self, event: Action) -> Result<(), AppError> {
        let _ = event;
        Ok(())
    }
}

#[async_trait(?Send)]
pub trait Component {
    fn render(&mut self, area: Layout, buf: &mut Buffer);
    fn register_action_tx(&mut self, action_tx: tokio::sync::mpsc::Sender<Action>) {
        let _ = action_tx;
    }
    async fn handle_event(&mut self, event: Action) -> Result<(), AppError> {
        let _ = event;
        Ok(())
    }
    fn cursor(&self) -> Option<(u16, u16)> {
        None
    }
    fn should_render(&self) -> bool {
        true
    }
    fn is_animating(&self) -> bool {
        false
    }
    /// True when the component consumes keys the app would otherwise handle (`q`, `?`).
    fn capture_focus_event(&self, _event: &Event) -> bool {
        false
    }
    fn set_global_help(&self) {}
}
