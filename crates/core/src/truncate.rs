//! Head+tail truncation.
//!
//! Long text keeps its beginning and its end with a marker in between that
//! says how much of each side survived. Lengths are counted in characters,
//! never bytes, so multi-byte text is never split mid-character.

use serde::{Deserialize, Serialize};

/// Share of the kept characters given to the head when the configured
/// head/tail lengths do not fit the maximum.
const HEAD_SHARE_NUM: usize = 6;
const HEAD_SHARE_DEN: usize = 10;

/// Marker placed between the preserved head and tail.
pub fn marker(head: usize, tail: usize) -> String {
    format!("\n\n... [Content truncated - showing first {head} and last {tail} chars] ...\n\n")
}

/// A truncation policy with fixed head and tail lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadTail {
    /// Texts at or under this length are returned unchanged
    pub max_len: usize,
    pub head: usize,
    pub tail: usize,
}

/// Result of applying a truncation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub text: String,
    pub truncated: bool,
    /// Character count before truncation
    pub original_len: usize,
    /// Character count of `text`, marker included
    pub len: usize,
}

impl HeadTail {
    pub fn new(max_len: usize, head: usize, tail: usize) -> Self {
        Self { max_len, head, tail }
    }

    /// Head and tail lengths actually used. Falls back to a 60/40 split of
    /// `max_len` when `head + tail` exceeds it.
    pub fn effective_lengths(&self) -> (usize, usize) {
        if self.head + self.tail > self.max_len {
            let head = self.max_len * HEAD_SHARE_NUM / HEAD_SHARE_DEN;
            (head, self.max_len - head)
        } else {
            (self.head, self.tail)
        }
    }

    pub fn apply(&self, text: &str) -> Truncated {
        let original_len = text.chars().count();
        if original_len <= self.max_len {
            return Truncated {
                text: text.to_string(),
                truncated: false,
                original_len,
                len: original_len,
            };
        }

        let (head, tail) = self.effective_lengths();
        let out = join_head_tail(text, original_len, head, tail);
        let len = out.chars().count();
        Truncated {
            text: out,
            truncated: true,
            original_len,
            len,
        }
    }
}

/// Shrink `text` so that the result, marker included, is at most
/// `max_chars` characters long.
///
/// Returns `None` when fewer than `min_content` characters of the original
/// would survive next to the marker.
pub fn squeeze(text: &str, max_chars: usize, min_content: usize) -> Option<String> {
    let original_len = text.chars().count();
    if original_len <= max_chars {
        return Some(text.to_string());
    }

    // Head and tail never exceed max_chars, so a marker rendered with
    // max_chars in both slots is an upper bound on the real marker.
    let marker_bound = marker(max_chars, max_chars).chars().count();
    let content = max_chars.checked_sub(marker_bound)?;
    if content < min_content.max(1) {
        return None;
    }

    let head = content * HEAD_SHARE_NUM / HEAD_SHARE_DEN;
    let tail = content - head;
    Some(join_head_tail(text, original_len, head, tail))
}

fn join_head_tail(text: &str, char_len: usize, head: usize, tail: usize) -> String {
    let head_end = byte_offset(text, head.min(char_len));
    let tail_start = byte_offset(text, char_len.saturating_sub(tail).max(head.min(char_len)));

    let mut out = String::with_capacity(head_end + (text.len() - tail_start) + 96);
    out.push_str(&text[..head_end]);
    out.push_str(&marker(head, tail));
    out.push_str(&text[tail_start..]);
    out
}

/// Byte offset of the `n`-th character (or the end of the string).
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_text_is_untouched() {
        let policy = HeadTail::new(5000, 3000, 2000);
        let out = policy.apply("short page");
        assert!(!out.truncated);
        assert_eq!(out.text, "short page");
        assert_eq!(out.len, 10);
    }

    #[test]
    fn long_text_keeps_exact_head_and_tail() {
        let text: String = (0..8000)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let policy = HeadTail::new(5000, 3000, 2000);
        let out = policy.apply(&text);

        assert!(out.truncated);
        assert_eq!(out.original_len, 8000);
        let m = marker(3000, 2000);
        assert!(out.text.starts_with(&text[..3000]));
        assert!(out.text.ends_with(&text[6000..]));
        assert_eq!(&out.text[3000..3000 + m.len()], m);
        assert_eq!(out.len, 3000 + m.chars().count() + 2000);
    }

    #[test]
    fn oversized_head_tail_falls_back_to_split() {
        let policy = HeadTail::new(1000, 900, 900);
        assert_eq!(policy.effective_lengths(), (600, 400));
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let text = "é".repeat(50);
        let out = HeadTail::new(10, 6, 4).apply(&text);
        assert!(out.text.starts_with(&"é".repeat(6)));
        assert!(out.text.ends_with(&"é".repeat(4)));
    }

    #[test]
    fn zero_tail_keeps_only_head() {
        let text = "x".repeat(100);
        let out = HeadTail::new(10, 10, 0).apply(&text);
        assert!(out.text.ends_with(&marker(10, 0)));
    }

    #[test]
    fn squeeze_refuses_when_too_little_survives() {
        let text = "y".repeat(500);
        assert!(squeeze(&text, 40, 16).is_none());
        assert_eq!(squeeze("tiny", 40, 16).as_deref(), Some("tiny"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn squeeze_never_exceeds_limit(len in 0usize..3000, limit in 0usize..2000) {
            let text = "z".repeat(len);
            if let Some(out) = squeeze(&text, limit, 1) {
                prop_assert!(out.chars().count() <= limit);
            }
        }
    }
}
