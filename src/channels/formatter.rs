//! Response formatting for Telegram delivery.
//!
//! Telegram caps messages at 4096 characters and its MarkdownV2 parse mode
//! requires aggressive escaping. Long responses are split at natural
//! boundaries; code spans and fences are passed through unescaped.

use std::sync::LazyLock;

use regex::Regex;

/// Telegram message length limit.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// Characters MarkdownV2 requires escaping outside code.
const SPECIAL_CHARS: &str = r"_*[]()~`>#+-=|{}.!";

/// Inline code spans and fenced code blocks.
static CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```|`[^`]+`").expect("code regex is valid"));

/// A message chunk ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedMessage {
    pub text: String,
    /// Telegram parse mode; `None` sends plain text.
    pub parse_mode: Option<&'static str>,
}

impl FormattedMessage {
    fn markdown(text: String) -> Self {
        Self { text, parse_mode: Some("MarkdownV2") }
    }

    fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), parse_mode: None }
    }
}

/// Escape special characters for MarkdownV2, leaving code untouched.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() * 2);
    let mut last_end = 0;

    for m in CODE.find_iter(text) {
        escape_into(&mut escaped, &text[last_end..m.start()]);
        escaped.push_str(m.as_str());
        last_end = m.end();
    }
    escape_into(&mut escaped, &text[last_end..]);

    escaped
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        if SPECIAL_CHARS.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Format a response for Telegram, splitting it when necessary.
pub fn format_for_telegram(text: &str) -> Vec<FormattedMessage> {
    if text.is_empty() {
        return vec![FormattedMessage::plain("No response")];
    }

    let escaped = escape_markdown_v2(text);
    if escaped.chars().count() <= MAX_MESSAGE_LENGTH {
        return vec![FormattedMessage::markdown(escaped)];
    }

    split_message(&escaped, MAX_MESSAGE_LENGTH)
}

/// Split a long message into chunks at natural boundaries.
fn split_message(text: &str, max_length: usize) -> Vec<FormattedMessage> {
    let mut messages = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_length {
            messages.push(FormattedMessage::markdown(remaining.to_string()));
            break;
        }

        let split_point = find_split_point(remaining, max_length);
        messages.push(FormattedMessage::markdown(remaining[..split_point].trim_end().to_string()));
        remaining = remaining[split_point..].trim_start();
    }

    messages
}

/// Byte offset of the best split point within the first `max_length`
/// characters, preferring paragraph, line, sentence, clause, and word
/// boundaries (never before the halfway mark).
fn find_split_point(text: &str, max_length: usize) -> usize {
    let window_end = text
        .char_indices()
        .nth(max_length)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let window = &text[..window_end];

    for pattern in ["\n\n", "\n", ". ", ", ", " "] {
        if let Some(pos) = window.rfind(pattern) {
            if window[..pos].chars().count() > max_length / 2 {
                return pos + pattern.len();
            }
        }
    }

    window_end
}

/// Format an execution failure. Plain text, so nothing needs escaping.
pub fn format_error(error: &str) -> FormattedMessage {
    FormattedMessage::plain(format!("❌ Error: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape_markdown_v2("a.b!c"), r"a\.b\!c");
        assert_eq!(escape_markdown_v2("(1+2)=3"), r"\(1\+2\)\=3");
    }

    #[test]
    fn leaves_inline_code_untouched() {
        assert_eq!(escape_markdown_v2("run `cargo check` now."), r"run `cargo check` now\.");
    }

    #[test]
    fn leaves_fenced_code_untouched() {
        let text = "before.\n```rust\nlet x = a * b;\n```\nafter.";
        let escaped = escape_markdown_v2(text);
        assert!(escaped.contains("let x = a * b;"));
        assert!(escaped.starts_with(r"before\."));
        assert!(escaped.ends_with(r"after\."));
    }

    #[test]
    fn empty_response_becomes_placeholder() {
        assert_eq!(format_for_telegram(""), vec![FormattedMessage::plain("No response")]);
    }

    #[test]
    fn short_response_is_single_markdown_message() {
        let messages = format_for_telegram("hello world");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].parse_mode, Some("MarkdownV2"));
        assert_eq!(messages[0].text, "hello world");
    }

    #[test]
    fn long_response_is_split_under_limit() {
        let paragraph = "word ".repeat(300);
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let messages = format_for_telegram(&text);

        assert!(messages.len() > 1);
        for message in &messages {
            assert!(message.text.chars().count() <= MAX_MESSAGE_LENGTH);
            assert!(!message.text.is_empty());
        }
    }

    #[test]
    fn split_prefers_paragraph_boundaries() {
        let first = "a".repeat(3000);
        let second = "b".repeat(3000);
        let text = format!("{first}\n\n{second}");
        let messages = format_for_telegram(&text);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, first);
        assert_eq!(messages[1].text, second);
    }

    #[test]
    fn forced_split_when_no_boundary_exists() {
        let text = "x".repeat(MAX_MESSAGE_LENGTH + 100);
        let messages = format_for_telegram(&text);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text.chars().count(), MAX_MESSAGE_LENGTH);
        assert_eq!(messages[1].text.chars().count(), 100);
    }

    #[test]
    fn split_respects_multibyte_boundaries() {
        let text = "é".repeat(MAX_MESSAGE_LENGTH + 10);
        let messages = format_for_telegram(&text);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text.chars().count(), MAX_MESSAGE_LENGTH);
    }

    #[test]
    fn error_message_is_plain_text() {
        let message = format_error("agent exploded");
        assert_eq!(message.text, "❌ Error: agent exploded");
        assert_eq!(message.parse_mode, None);
    }
}
