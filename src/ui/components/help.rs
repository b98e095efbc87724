use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BlockExt, Clear, Widget},
};
use textwrap::core::display_width;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpElementKind {
    Keybind(&'static str, &'static str),
    Text(&'static str),
}

#[macro_export]
macro_rules! help_keybind {
    ($key:expr, $description:expr) => {
        $crate::ui::components::help::HelpElementKind::Keybind($key, $description)
    };
}

#[macro_export]
macro_rules! help_text {
    ($text:expr) => {
        $crate::ui::components::help::HelpElementKind::Text($text)
    };
}

pub const GLOBAL_HELP: &[HelpElementKind] = &[
    help_text!("Global"),
    help_keybind!("?", "toggle this help"),
    help_keybind!("q / Ctrl+C", "quit"),
    help_keybind!("Esc", "close help"),
];

/// Key column left, description right, padded to `width`.
pub fn help_elements_to_text(elements: &[HelpElementKind], width: u16) -> Text<'static> {
    let width = width as usize;
    let lines = elements.iter().flat_map(|element| match element {
        HelpElementKind::Keybind(key, description) => {
            let used = display_width(key) + display_width(description);
            let padding = width.saturating_sub(used).max(1);
            vec![Line::from(vec![
                Span::styled(
                    *key,
                    Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::raw(" ".repeat(padding)),
                Span::raw(*description),
            ])]
        }
        HelpElementKind::Text(text) => textwrap::wrap(text, width.max(1))
            .into_iter()
            .map(|line| Line::from(line.into_owned()).centered())
            .collect(),
    });
    Text::from(lines.collect::<Vec<_>>())
}

/// Centered help popup sized to its content.
pub struct HelpOverlay<'a> {
    sections: &'a [&'a [HelpElementKind]],
    percent_width: u16,
    block: Option<Block<'a>>,
}

impl<'a> HelpOverlay<'a> {
    pub fn new(sections: &'a [&'a [HelpElementKind]]) -> Self {
        Self {
            sections,
            percent_width: 50,
            block: None,
        }
    }

    pub fn percent_width(self, percent_width: u16) -> Self {
        Self {
            percent_width: percent_width.clamp(10, 100),
            ..self
        }
    }

    pub fn block(self, block: Block<'a>) -> Self {
        Self {
            block: Some(block),
            ..self
        }
    }
}

impl Widget for HelpOverlay<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let width = area.width * self.percent_width / 100;
        let inner_width = self
            .block
            .inner_if_some(Rect::new(0, 0, width, area.height))
            .width;
        let mut text = Text::default();
        for (idx, section) in self.sections.iter().enumerate() {
            if idx > 0 {
                text.lines.push(Line::default());
            }
            text.lines
                .extend(help_elements_to_text(section, inner_width).lines);
        }
        let frame = if self.block.is_some() { 2 } else { 0 };
        let height = (text.height() as u16 + frame).min(area.height);
        let popup = Rect {
            x: area.x + area.width.saturating_sub(width) / 2,
            y: area.y + area.height.saturating_sub(height) / 2,
            width,
            height,
        };
        Clear.render(popup, buf);
        let inner = self.block.inner_if_some(popup);
        self.block.render(popup, buf);
        text.render(inner, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keybinds_are_padded_to_width() {
        let text = help_elements_to_text(&[help_keybind!("q", "quit")], 10);
        let line: String = text.lines[0]
            .spans
            .iter()
            .map(|s| s.content.as_ref())
            .collect();
        assert_eq!(line, "q     quit");
    }

    #[test]
    fn overlay_renders_all_sections() {
        let area = Rect::new(0, 0, 60, 20);
        let mut buf = Buffer::empty(area);
        HelpOverlay::new(&[GLOBAL_HELP, &[help_keybind!("l", "like")]])
            .percent_width(80)
            .block(Block::bordered().title("Help"))
            .render(area, &mut buf);
        let text = buf
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>();
        assert!(text.contains("Help"));
        assert!(text.contains("quit"));
        assert!(text.contains("like"));
    }
}
