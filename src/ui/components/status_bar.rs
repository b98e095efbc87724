use ratatui::buffer::Buffer;
use ratatui::layout::Alignment;
use ratatui::style::{Style, Stylize};
use ratatui::text::Line;
use ratatui::widgets::Widget;
use ratatui_macros::{horizontal, span};

use async_trait::async_trait;

use crate::errors::AppError;
use crate::remote::PostId;
use crate::ui::components::DumbComponent;
use crate::ui::{Action, AppState, layout::Layout};

pub struct StatusBar {
    user_label: String,
    post_label: String,
    loaded: usize,
}

impl StatusBar {
    pub fn new(app_state: &AppState) -> Self {
        let user_label = match &app_state.session {
            Some(session) => format!(" Logged in as {} ", session.account.handle()),
            None => " Not logged in ".to_string(),
        };
        Self {
            user_label,
            post_label: post_label(&app_state.post, 1),
            loaded: 0,
        }
    }

    pub fn render(&mut self, area: Layout, buf: &mut Buffer) {
        let count_text = format!(" Comments: {} ", self.loaded);
        let [start, end] = horizontal![*=1, ==(count_text.len() as u16)].areas(area.status_bar);
        let user_style = if self.user_label.starts_with(" Logged in") {
            Style::new().black().on_green()
        } else {
            Style::new().black().on_yellow()
        };
        Line::from(vec![
            span!(user_style; "{}", self.user_label),
            span!(" "),
            span!(Style::new(); "{}", self.post_label),
        ])
        .render(start, buf);
        Line::from(span!(Style::new().black().on_blue(); "{}", count_text))
            .alignment(Alignment::Right)
            .render(end, buf);
    }
}

fn post_label(post: &PostId, depth: usize) -> String {
    if depth > 1 {
        format!("Thread {post} (depth {depth}, Esc to go back)")
    } else {
        format!("Thread {post}")
    }
}

#[async_trait(?Send)]
impl DumbComponent for StatusBar {
    fn render(&mut self, area: Layout, buf: &mut Buffer) {
        self.render(area, buf);
    }

    async fn handle_event(&mut self, event: Action) -> Result<(), AppError> {
        match event {
            Action::ThreadFocused { post, depth } => self.post_label = post_label(&post, depth),
            Action::LoadedCount { count } => self.loaded = count,
            _ => {}
        }
        Ok(())
    }
}
