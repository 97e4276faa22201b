//! Assembly of streamed response fragments into one assistant message.
//!
//! Fragments are arbitrary slices of model output: word pieces, whole
//! sentences, or the two halves of a markdown token. Joining them with a
//! plain space breaks markup, joining them with nothing glues words. The
//! boundary rule in [`separator`] sits between the two.

use crate::conversation::Message;
use crate::error::VoxturnError;
use crate::response::render::{MarkupRenderer, is_rich_format};
use serde_json::Value;

/// Characters that open or close inline formatting.
const DELIMITERS: &[char] = &['*', '_', '`', '~'];

/// Punctuation that attaches to the preceding word.
const CLOSING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}'];

/// Current display state of the message being assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageUpdate {
    pub rendered: String,
    pub rich: bool,
}

pub struct ResponseAssembler {
    renderer: Box<dyn MarkupRenderer>,
    buffer: String,
    open: bool,
    fragments: usize,
    rendered: String,
    rich: bool,
}

impl ResponseAssembler {
    pub fn new(renderer: Box<dyn MarkupRenderer>) -> Self {
        Self {
            renderer,
            buffer: String::new(),
            open: false,
            fragments: 0,
            rendered: String::new(),
            rich: false,
        }
    }

    /// Open a new assistant message seeded with the first fragment.
    ///
    /// Any previously open message is dropped.
    pub fn start_stream(&mut self, text: &str) -> MessageUpdate {
        if self.open {
            tracing::debug!("Discarding unfinished stream of {} fragments", self.fragments);
        }
        self.reset();
        self.open = true;
        self.fragments = 1;
        self.buffer.push_str(text);
        self.refresh()
    }

    /// Join one more fragment, opening a stream if none is open.
    pub fn append_fragment(&mut self, text: &str) -> MessageUpdate {
        if !self.open {
            return self.start_stream(text);
        }
        let sep = separator(&self.buffer, text);
        self.buffer.push_str(sep);
        self.buffer.push_str(text);
        self.fragments += 1;
        self.refresh()
    }

    /// Close the stream and return the finished message, if one was open.
    pub fn complete_stream(&mut self) -> Option<Message> {
        self.finish(false)
    }

    /// Close the stream early; the message keeps what arrived so far.
    pub fn interrupt_stream(&mut self) -> Option<Message> {
        self.finish(true)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    fn finish(&mut self, interrupted: bool) -> Option<Message> {
        if !self.open {
            return None;
        }
        self.refresh();
        let mut message = Message::assistant(
            std::mem::take(&mut self.buffer),
            std::mem::take(&mut self.rendered),
            self.rich,
        );
        message.interrupted = interrupted;
        self.reset();
        Some(message)
    }

    fn refresh(&mut self) -> MessageUpdate {
        self.rich = is_rich_format(&self.buffer);
        self.rendered = if self.rich {
            self.renderer.render(&self.buffer, true)
        } else {
            self.buffer.clone()
        };
        MessageUpdate {
            rendered: self.rendered.clone(),
            rich: self.rich,
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.rendered.clear();
        self.open = false;
        self.fragments = 0;
        self.rich = false;
    }
}

/// Text placed between the accumulated buffer and the next fragment.
pub fn separator(left: &str, right: &str) -> &'static str {
    let (Some(last), Some(first)) = (left.chars().last(), right.chars().next()) else {
        return "";
    };

    if starts_structural(right) || ends_with_closed_fence(left) {
        return if last == '\n' || first == '\n' { "" } else { "\n" };
    }
    if last == '\n' || first == '\n' {
        return "";
    }
    if DELIMITERS.contains(&last) || DELIMITERS.contains(&first) {
        return "";
    }
    if last.is_whitespace() || first.is_whitespace() {
        return "";
    }
    if CLOSING_PUNCTUATION.contains(&first) {
        return "";
    }
    " "
}

/// Newline, list item, heading or code fence at the start of a fragment.
fn starts_structural(text: &str) -> bool {
    if text.starts_with('\n') || text.starts_with("```") {
        return true;
    }
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some('-' | '*' | '+'), Some(' ')) => true,
        (Some('#'), Some('#' | ' ')) => true,
        (Some(c), _) if c.is_ascii_digit() => {
            let rest = text.trim_start_matches(|c: char| c.is_ascii_digit());
            rest.starts_with(". ")
        }
        _ => false,
    }
}

/// Buffer ends on a fence that closes a code block.
fn ends_with_closed_fence(text: &str) -> bool {
    text.ends_with("```") && text.matches("```").count() % 2 == 0
}

/// Text of a fragment's `text` field.
///
/// JSON-quoted strings are unquoted; anything that fails to unquote, or is
/// not a string at all, is used literally.
pub fn decode_fragment_text(value: &Value) -> String {
    match value {
        Value::String(text) => match unquote(text) {
            Ok(Some(unquoted)) => unquoted,
            Ok(None) => text.clone(),
            Err(e) => {
                tracing::warn!("{}; using fragment text literally", e);
                text.clone()
            }
        },
        Value::Null => String::new(),
        other => {
            tracing::debug!("Non-string fragment text, using it literally");
            other.to_string()
        }
    }
}

fn unquote(text: &str) -> std::result::Result<Option<String>, VoxturnError> {
    let trimmed = text.trim();
    if trimmed.len() < 2 || !trimmed.starts_with('"') || !trimmed.ends_with('"') {
        return Ok(None);
    }
    serde_json::from_str::<String>(trimmed)
        .map(Some)
        .map_err(|e| VoxturnError::StreamParse {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Sender;
    use crate::response::render::{HtmlRenderer, PlainRenderer};
    use serde_json::json;

    fn assembler() -> ResponseAssembler {
        ResponseAssembler::new(Box::new(HtmlRenderer))
    }

    fn assemble(fragments: &[&str]) -> Message {
        let mut assembler = assembler();
        for fragment in fragments {
            assembler.append_fragment(fragment);
        }
        assembler.complete_stream().unwrap()
    }

    #[test]
    fn test_words_join_with_single_space() {
        assert_eq!(assemble(&["Hello", "world"]).text, "Hello world");
    }

    #[test]
    fn test_split_stream_renders_like_single_fragment() {
        let split = assemble(&["Hello", "world"]);
        let whole = assemble(&["Hello world"]);
        assert_eq!(split.rendered, whole.rendered);
        assert_eq!(split.rich, whole.rich);
    }

    #[test]
    fn test_delimiters_concatenate() {
        assert_eq!(assemble(&["**bold", "**"]).text, "**bold**");
        assert_eq!(assemble(&["call", "`f()`"]).text, "call`f()`");
        assert_eq!(assemble(&["snake", "_case"]).text, "snake_case");
    }

    #[test]
    fn test_list_item_gets_line_break() {
        let message = assemble(&["Options:", "- one", "- two"]);
        assert_eq!(message.text, "Options:\n- one\n- two");
        assert!(message.rich);
        assert!(message.rendered.contains("<li>one</li>"));
    }

    #[test]
    fn test_heading_and_numbered_list_get_line_break() {
        assert_eq!(assemble(&["Intro", "## Part"]).text, "Intro\n## Part");
        assert_eq!(assemble(&["Steps", "1. go"]).text, "Steps\n1. go");
    }

    #[test]
    fn test_existing_newline_is_not_doubled() {
        assert_eq!(assemble(&["Options:\n", "- one"]).text, "Options:\n- one");
        assert_eq!(assemble(&["line", "\nnext"]).text, "line\nnext");
    }

    #[test]
    fn test_code_fences() {
        let message = assemble(&["Example:", "```rust", "\nlet x = 1;\n", "```", "Done"]);
        assert_eq!(message.text, "Example:\n```rust\nlet x = 1;\n```\nDone");
        assert!(message.rendered.contains("<pre>"));
    }

    #[test]
    fn test_punctuation_and_whitespace_attach() {
        assert_eq!(assemble(&["Hello", ", world", "!"]).text, "Hello, world!");
        assert_eq!(assemble(&["Hello ", "world"]).text, "Hello world");
        assert_eq!(assemble(&["(see", "below)"]).text, "(see below)");
    }

    #[test]
    fn test_plain_text_is_not_rendered() {
        let message = assemble(&["Just", "words"]);
        assert!(!message.rich);
        assert_eq!(message.rendered, "Just words");
        assert_eq!(message.sender, Sender::Assistant);
    }

    #[test]
    fn test_rich_detected_incrementally() {
        let mut assembler = assembler();
        assert!(!assembler.start_stream("Voici").rich);
        let update = assembler.append_fragment("**important**");
        assert!(update.rich);
        assert!(update.rendered.contains("<strong>important</strong>"));
    }

    #[test]
    fn test_buffer_length_never_decreases() {
        let mut assembler = ResponseAssembler::new(Box::new(PlainRenderer));
        assembler.start_stream("a");
        let mut previous = assembler.buffer().len();
        for fragment in ["b", "", "**", "\n", "- c", ".", "d"] {
            assembler.append_fragment(fragment);
            assert!(assembler.buffer().len() >= previous);
            previous = assembler.buffer().len();
        }
        assert_eq!(assembler.fragment_count(), 8);
    }

    #[test]
    fn test_complete_resets_state() {
        let mut assembler = assembler();
        assembler.start_stream("one");
        assert!(assembler.complete_stream().is_some());
        assert!(!assembler.is_open());
        assert_eq!(assembler.buffer(), "");
        assert!(assembler.complete_stream().is_none(), "no stream open");
    }

    #[test]
    fn test_interrupt_keeps_partial_text() {
        let mut assembler = assembler();
        assembler.start_stream("The answer");
        assembler.append_fragment("is");
        let message = assembler.interrupt_stream().unwrap();
        assert_eq!(message.text, "The answer is");
        assert!(message.interrupted);
        assert!(!assembler.is_open());
    }

    #[test]
    fn test_start_stream_discards_previous() {
        let mut assembler = assembler();
        assembler.start_stream("old");
        assembler.start_stream("new");
        assert_eq!(assembler.complete_stream().unwrap().text, "new");
    }

    #[test]
    fn test_decode_quoted_text() {
        assert_eq!(decode_fragment_text(&json!("\"Bonjour\\n\"")), "Bonjour\n");
        assert_eq!(decode_fragment_text(&json!("plain")), "plain");
    }

    #[test]
    fn test_decode_malformed_quote_is_literal() {
        assert_eq!(decode_fragment_text(&json!("\"broken\\x\"")), "\"broken\\x\"");
    }

    #[test]
    fn test_decode_non_string_is_literal() {
        assert_eq!(decode_fragment_text(&json!(42)), "42");
        assert_eq!(decode_fragment_text(&json!(null)), "");
        assert_eq!(decode_fragment_text(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
