use ratatui::layout::Rect;
use ratatui_macros::{horizontal, vertical};

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub title_bar: Rect,
    pub main_content: Rect,
    pub status_bar: Rect,
    /// Top-right corner of the main area, where notices appear.
    pub notice: Rect,
}

impl Layout {
    pub fn new(area: Rect) -> Self {
        let [title_bar, main_content, status_bar] = vertical![==1, *=1, ==1].areas(area);
        let [_, notice_column] = horizontal![*=1, ==50].areas(main_content);
        let [notice, _] = vertical![==5, *=1].areas(notice_column);
        Self {
            title_bar,
            main_content,
            status_bar,
            notice,
        }
    }
}
