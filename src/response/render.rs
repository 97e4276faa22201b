//! Rendering of assistant text.
//!
//! A cheap regex decides whether a buffer carries markup worth rendering;
//! only then is it run through a [`MarkupRenderer`].

use pulldown_cmark::{Event, Options, Parser, html};
use regex::Regex;
use std::sync::LazyLock;

/// Emphasis, headings, code fences, links, list items, tables and block quotes.
static RICH_FORMAT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?m)(\*\*|__|##|```|~~|\[[^\]]*\]\([^)]*\)|^\s*[-*+]\s|^\s*\d+\.\s|\|[-:| ]+\||^\s*>\s)")
        .ok()
});

/// Whether `text` contains markup that plain rendering would lose.
pub fn is_rich_format(text: &str) -> bool {
    RICH_FORMAT
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(text))
}

/// Trait for converting markup into the presenter's display format.
pub trait MarkupRenderer: Send + Sync {
    /// Render `text`; with `breaks`, single newlines become line breaks.
    fn render(&self, text: &str, breaks: bool) -> String;
}

/// CommonMark to HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl MarkupRenderer for HtmlRenderer {
    fn render(&self, text: &str, breaks: bool) -> String {
        let parser = Parser::new_ext(text, Options::all()).map(|event| match event {
            Event::SoftBreak if breaks => Event::HardBreak,
            other => other,
        });

        let mut output = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut output, parser);
        output.trim_end().to_owned()
    }
}

/// Renders nothing; returns the text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderer;

impl MarkupRenderer for PlainRenderer {
    fn render(&self, text: &str, _breaks: bool) -> String {
        text.to_owned()
    }
}
