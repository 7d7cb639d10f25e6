//! Classification of heartbeat responses.
//!
//! The agent is instructed to lead (or end) its reply with `HEARTBEAT_OK`
//! when a check finds nothing noteworthy. The classifier detects that marker,
//! strips it, and decides whether the remainder is worth delivering.

use std::sync::LazyLock;

use regex::Regex;

/// Marker token the agent emits when all checks pass.
pub const OK_MARKER: &str = "HEARTBEAT_OK";

/// Marker anchored at the very start or very end of the response.
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*heartbeat_ok\s*|\s*heartbeat_ok\s*$").expect("marker regex is valid")
});

/// Classification of a single heartbeat response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    /// Whether the response carried the acknowledgment marker.
    pub is_ok: bool,
    /// Response content with the marker stripped (untouched when unmarked).
    pub content: String,
    /// Whether the content should reach the user.
    pub should_deliver: bool,
}

/// Classify a heartbeat response.
///
/// A marker at the start or end of the (possibly whitespace-padded) text makes
/// the response an acknowledgment; markers only in the interior do not count.
/// Acknowledgments are suppressed unless the remaining content is strictly
/// longer than `ack_max_chars` characters. Unmarked responses are always
/// delivered unmodified, even when empty.
pub fn classify_response(response: &str, ack_max_chars: usize) -> HeartbeatOutcome {
    let is_ok = MARKER.is_match(response);

    if is_ok {
        let content = MARKER.replace_all(response, "").trim().to_string();
        let should_deliver = content.chars().count() > ack_max_chars;
        HeartbeatOutcome { is_ok, content, should_deliver }
    } else {
        HeartbeatOutcome {
            is_ok: false,
            content: response.to_string(),
            should_deliver: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_prefix_marker_any_case() {
        for response in ["HEARTBEAT_OK all clear", "heartbeat_ok all clear", "HeArTbEaT_oK all clear"] {
            let outcome = classify_response(response, 300);
            assert!(outcome.is_ok);
            assert_eq!(outcome.content, "all clear");
            assert!(!outcome.should_deliver);
        }
    }

    #[test]
    fn detects_suffix_marker() {
        let outcome = classify_response("all clear HEARTBEAT_OK", 300);
        assert!(outcome.is_ok);
        assert_eq!(outcome.content, "all clear");
    }

    #[test]
    fn strips_marker_at_both_ends() {
        let outcome = classify_response("HEARTBEAT_OK nothing to report HEARTBEAT_OK", 300);
        assert!(outcome.is_ok);
        assert_eq!(outcome.content, "nothing to report");
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let outcome = classify_response("  HEARTBEAT_OK  \n", 300);
        assert!(outcome.is_ok);
        assert_eq!(outcome.content, "");
        assert!(!outcome.should_deliver);
    }

    #[test]
    fn standalone_marker_is_suppressed() {
        let outcome = classify_response("HEARTBEAT_OK", 300);
        assert!(outcome.is_ok);
        assert_eq!(outcome.content, "");
        assert!(!outcome.should_deliver);
    }

    #[test]
    fn interior_marker_does_not_count() {
        let outcome = classify_response("status: HEARTBEAT_OK was expected", 300);
        assert!(!outcome.is_ok);
        assert_eq!(outcome.content, "status: HEARTBEAT_OK was expected");
        assert!(outcome.should_deliver);
    }

    #[test]
    fn unmarked_response_is_always_delivered() {
        let outcome = classify_response("status nominal", 300);
        assert!(!outcome.is_ok);
        assert!(outcome.should_deliver);
    }

    #[test]
    fn long_acknowledgment_is_delivered() {
        let response = format!("{} {}", OK_MARKER, "A".repeat(301));
        let outcome = classify_response(&response, 300);
        assert!(outcome.is_ok);
        assert!(outcome.should_deliver);
    }

    #[test]
    fn content_at_threshold_is_suppressed() {
        let response = format!("{} {}", OK_MARKER, "A".repeat(300));
        let outcome = classify_response(&response, 300);
        assert!(outcome.is_ok);
        assert!(!outcome.should_deliver);
    }

    #[test]
    fn content_one_over_threshold_is_delivered() {
        let response = format!("{} {}", OK_MARKER, "A".repeat(301));
        assert!(classify_response(&response, 300).should_deliver);
    }

    #[test]
    fn custom_threshold_is_honored() {
        let response = format!("{} {}", OK_MARKER, "A".repeat(50));
        assert!(classify_response(&response, 10).should_deliver);
        assert!(!classify_response(&response, 100).should_deliver);
    }

    #[test]
    fn empty_response_is_delivered_as_unmarked() {
        let outcome = classify_response("", 300);
        assert!(!outcome.is_ok);
        assert!(outcome.should_deliver);
    }

    #[test]
    fn whitespace_only_response_is_delivered_as_unmarked() {
        let outcome = classify_response("   \n  ", 300);
        assert!(!outcome.is_ok);
        assert!(outcome.should_deliver);
    }

    #[test]
    fn multiline_acknowledgment() {
        let outcome = classify_response("HEARTBEAT_OK\nEverything checked out.", 300);
        assert!(outcome.is_ok);
        assert_eq!(outcome.content, "Everything checked out.");
    }

    #[test]
    fn threshold_counts_characters_not_bytes() {
        let response = format!("{} {}", OK_MARKER, "é".repeat(300));
        assert!(!classify_response(&response, 300).should_deliver);
    }

    #[test]
    fn leading_marker_followed_by_punctuation_still_counts() {
        // The anchor only requires whitespace after the token at the start, so
        // "HEARTBEAT_OK." is an acknowledgment with "." as its content.
        let outcome = classify_response("HEARTBEAT_OK.", 300);
        assert!(outcome.is_ok);
        assert_eq!(outcome.content, ".");
        assert!(!outcome.should_deliver);
    }

    #[test]
    fn trailing_marker_followed_by_punctuation_does_not_count() {
        let outcome = classify_response("all clear, HEARTBEAT_OK.", 300);
        assert!(!outcome.is_ok);
        assert!(outcome.should_deliver);
    }
}
