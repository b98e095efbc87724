//! Comment bodies rendered as wrapped, styled terminal lines.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use textwrap::core::display_width;

/// Renders `text` into lines no wider than `width`, each prefixed by `indent` spaces.
pub fn render_markdown_lines(text: &str, width: usize, indent: usize) -> Vec<Line<'static>> {
    let mut renderer = BlockRenderer::new(width.max(10), indent);
    let parser = Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH);
    for event in parser {
        match event {
            Event::Start(tag) => renderer.start(tag),
            Event::End(tag) => renderer.end(tag),
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => {
                renderer.text(&text)
            }
            Event::Code(code) => renderer.inline_code(&code),
            Event::SoftBreak => renderer.words.push(Word::Space),
            Event::HardBreak => renderer.words.push(Word::Break),
            _ => {}
        }
    }
    renderer.finish()
}

#[derive(Debug, Clone)]
enum Word {
    Text(String, Style),
    Space,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Paragraph,
    Quote,
    Code,
}

struct BlockRenderer {
    lines: Vec<Line<'static>>,
    words: Vec<Word>,
    width: usize,
    indent: usize,
    styles: Vec<Style>,
    quote_depth: usize,
    in_code: bool,
    bullet: Option<String>,
    ordered: Option<u64>,
}

impl BlockRenderer {
    fn new(width: usize, indent: usize) -> Self {
        Self {
            lines: Vec::new(),
            words: Vec::new(),
            width,
            indent,
            styles: vec![Style::new()],
            quote_depth: 0,
            in_code: false,
            bullet: None,
            ordered: None,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, style: Style) {
        let next = self.style().patch(style);
        self.styles.push(next);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Emphasis => self.push_style(Style::new().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::new().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => self.push_style(Style::new().add_modifier(Modifier::CROSSED_OUT)),
            Tag::Link { .. } => self.push_style(
                Style::new()
                    .fg(Color::Blue)
                    .add_modifier(Modifier::UNDERLINED),
            ),
            Tag::Heading { .. } => {
                self.flush(Block::Paragraph);
                self.push_style(Style::new().add_modifier(Modifier::BOLD));
            }
            Tag::BlockQuote(_) => {
                self.flush(Block::Paragraph);
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.flush(Block::Paragraph);
                self.in_code = true;
            }
            Tag::List(start) => {
                self.flush(Block::Paragraph);
                self.ordered = start;
            }
            Tag::Item => {
                self.flush(Block::Paragraph);
                self.bullet = Some(match self.ordered.as_mut() {
                    Some(n) => {
                        let label = format!("{n}. ");
                        *n += 1;
                        label
                    }
                    None => "• ".to_string(),
                });
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                self.pop_style()
            }
            TagEnd::Heading(_) => {
                self.flush(Block::Paragraph);
                self.pop_style();
                self.blank();
            }
            TagEnd::Paragraph => {
                let block = if self.quote_depth > 0 {
                    Block::Quote
                } else {
                    Block::Paragraph
                };
                self.flush(block);
                if self.bullet.is_none() {
                    self.blank();
                }
            }
            TagEnd::BlockQuote { .. } => {
                self.flush(Block::Quote);
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank();
            }
            TagEnd::CodeBlock => {
                self.in_code = false;
                self.blank();
            }
            TagEnd::Item => {
                self.flush(Block::Paragraph);
                self.bullet = None;
            }
            TagEnd::List(_) => {
                self.ordered = None;
                self.blank();
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_code {
            let style = Style::new().fg(Color::LightYellow);
            for line in text.trim_end_matches('\n').split('\n') {
                self.emit(Block::Code, vec![Span::styled(line.to_string(), style)]);
            }
            return;
        }
        let style = self.style();
        let mut first = true;
        for piece in text.split(char::is_whitespace) {
            if !first {
                self.words.push(Word::Space);
            }
            first = false;
            if !piece.is_empty() {
                self.words.push(Word::Text(piece.to_string(), style));
            }
        }
    }

    fn inline_code(&mut self, code: &str) {
        let style = self
            .style()
            .patch(Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        self.words.push(Word::Text(code.to_string(), style));
    }

    fn prefix(&self, block: Block, first: bool) -> Vec<Span<'static>> {
        let mut spans = Vec::new();
        if self.indent > 0 {
            spans.push(Span::raw(" ".repeat(self.indent)));
        }
        for _ in 0..self.quote_depth {
            spans.push(Span::styled("▎ ", Style::new().fg(Color::DarkGray)));
        }
        if block == Block::Code {
            spans.push(Span::styled("│ ", Style::new().fg(Color::DarkGray)));
        }
        if let Some(bullet) = &self.bullet {
            let marker = if first {
                bullet.clone()
            } else {
                " ".repeat(display_width(bullet))
            };
            spans.push(Span::raw(marker));
        }
        spans
    }

    fn emit(&mut self, block: Block, body: Vec<Span<'static>>) {
        let mut spans = self.prefix(block, true);
        spans.extend(body);
        self.lines.push(Line::from(spans));
    }

    /// Lays out the pending words of the current block.
    fn flush(&mut self, block: Block) {
        if self.words.iter().all(|w| matches!(w, Word::Space)) {
            self.words.clear();
            return;
        }
        let words = std::mem::take(&mut self.words);
        let mut first = true;
        let mut line = self.prefix(block, first);
        let prefix_width = line_width(&line);
        let available = self.width.saturating_sub(prefix_width).max(1);
        let mut used = 0;
        let mut space = false;
        for word in words {
            match word {
                Word::Space => space = used > 0,
                Word::Break => {
                    self.lines.push(Line::from(std::mem::take(&mut line)));
                    first = false;
                    line = self.prefix(block, first);
                    used = 0;
                    space = false;
                }
                Word::Text(text, style) => {
                    for part in split_long(&text, available) {
                        let width = display_width(&part);
                        let gap = usize::from(space);
                        if used > 0 && used + gap + width > available {
                            self.lines.push(Line::from(std::mem::take(&mut line)));
                            first = false;
                            line = self.prefix(block, first);
                            used = 0;
                        } else if gap == 1 {
                            line.push(Span::raw(" "));
                            used += 1;
                        }
                        line.push(Span::styled(part, style));
                        used += width;
                        space = false;
                    }
                }
            }
        }
        if used > 0 {
            self.lines.push(Line::from(line));
        }
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| l.spans.is_empty()) || self.lines.is_empty() {
            return;
        }
        self.lines.push(Line::default());
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush(Block::Paragraph);
        while self.lines.last().is_some_and(|l| l.spans.is_empty()) {
            self.lines.pop();
        }
        if self.lines.is_empty() {
            self.lines.push(Line::from(Span::styled(
                "(empty)",
                Style::new().add_modifier(Modifier::DIM),
            )));
        }
        self.lines
    }
}

fn line_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|s| display_width(&s.content)).sum()
}

fn split_long(word: &str, available: usize) -> Vec<String> {
    if display_width(word) <= available {
        return vec![word.to_string()];
    }
    textwrap::wrap(word, textwrap::Options::new(available).break_words(true))
        .into_iter()
        .map(|part| part.into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn wraps_paragraphs_to_width() {
        let lines = render_markdown_lines("one two three four five six", 12, 0);
        assert_eq!(plain(&lines), ["one two", "three four", "five six"]);
    }

    #[test]
    fn indents_every_line() {
        let lines = render_markdown_lines("alpha beta", 10, 2);
        assert!(plain(&lines).iter().all(|l| l.starts_with("  ")));
    }

    #[test]
    fn lists_and_code_get_markers() {
        let text = "- first\n- second\n\n```\nlet x = 1;\n```";
        let out = plain(&render_markdown_lines(text, 40, 0));
        assert_eq!(out[0], "• first");
        assert_eq!(out[1], "• second");
        assert!(out.contains(&"│ let x = 1;".to_string()));
    }

    #[test]
    fn strong_text_is_bold() {
        let lines = render_markdown_lines("**loud** quiet", 40, 0);
        let loud = lines[0]
            .spans
            .iter()
            .find(|s| s.content == "loud")
            .unwrap();
        assert!(loud.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn empty_body_has_placeholder() {
        assert_eq!(plain(&render_markdown_lines("   ", 20, 0)), ["(empty)"]);
    }
}
