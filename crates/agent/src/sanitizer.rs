//! Response sanitizer: strips control markers and leaked reasoning from raw
//! model output before it is stored or shown as final text.
//!
//! Cleaning runs these steps until the text stops changing, so the result
//! is stable under a second pass and no removal can splice together a new
//! marker:
//!
//! 1. Channel cleanup. With a `final` channel present only the text after
//!    the last `<|channel|>final<|message|>` is kept; otherwise `analysis`
//!    and `commentary` segments are removed. `<think>` blocks go too.
//! 2. Every `<|...|>` control marker (and legacy `</s>`) is removed.
//! 3. Reasoning spans are removed: a line starting with a configured opener
//!    through the next paragraph boundary.
//! 4. Blank-line runs collapse to one blank line; the ends are trimmed.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use rustscout_config::{ConfigError, SanitizerConfig};

static FINAL_CHANNEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\|channel\|>\s*final\s*(?:<\|constrain\|>[^<]*)?<\|message\|>")
        .expect("valid regex")
});

static HIDDEN_CHANNEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\|channel\|>\s*(?:analysis|commentary)\b.*?(?:<\|end\|>|<\|start\|>|\z)")
        .expect("valid regex")
});

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(think|thinking)>.*?</(?:think|thinking)>").expect("valid regex")
});

static OPEN_THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(?:think|thinking)>.*\z").expect("valid regex"));

static CONTROL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[^|\n]*\|>|</s>").expect("valid regex"));

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+\n").expect("valid regex"));

/// Meta-discourse openers removed when no list is configured. Matched
/// case-insensitively at the start of a line.
pub const DEFAULT_REASONING_OPENERS: &[&str] = &[
    r"we have a conversation",
    r"the answer should",
    r"we need to",
    r"we should",
    r"we'll comply",
    r"we must",
    r"let's think",
    r"let me think",
    r"step[- ]by[- ]step reasoning",
    r"as an ai\b.*\bi (?:cannot|can't|can not)",
    r"#{1,6}\s*(?:reasoning|analysis|thinking|thought process)\b",
    r"\.\.\.\?\s*$",
];

static DEFAULT_OPENER_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(DEFAULT_REASONING_OPENERS.iter().map(|p| anchored(p))).expect("valid regex")
});

fn anchored(pattern: &str) -> String {
    format!(r"(?i)^\s*(?:{pattern})")
}

/// Pure, idempotent output cleaner. Build once, share freely.
#[derive(Debug, Clone)]
pub struct ResponseSanitizer {
    openers: RegexSet,
}

impl Default for ResponseSanitizer {
    fn default() -> Self {
        Self {
            openers: DEFAULT_OPENER_SET.clone(),
        }
    }
}

impl ResponseSanitizer {
    /// Build from a list of opener patterns (regex syntax, no anchor).
    pub fn with_openers<I, S>(openers: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = openers.into_iter().map(|p| anchored(p.as_ref())).collect();
        let openers = RegexSet::new(&patterns).map_err(|e| {
            ConfigError::ValidationError(format!("invalid sanitizer reasoning opener: {e}"))
        })?;
        Ok(Self { openers })
    }

    pub fn from_config(config: &SanitizerConfig) -> Result<Self, ConfigError> {
        let base: Vec<String> = match &config.reasoning_openers {
            Some(list) => list.clone(),
            None => DEFAULT_REASONING_OPENERS.iter().map(|s| s.to_string()).collect(),
        };
        Self::with_openers(base.into_iter().chain(config.extra_openers.iter().cloned()))
    }

    pub fn sanitize(&self, raw: &str) -> String {
        let mut current = self.pass(raw);
        // Every step only deletes, so this terminates.
        loop {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn pass(&self, text: &str) -> String {
        let text = strip_channels(text);
        let text = THINK_BLOCK.replace_all(&text, "");
        let text = OPEN_THINK.replace(&text, "");
        let text = strip_markers(&text);
        let text = self.strip_reasoning(&text);
        let text = BLANK_RUN.replace_all(&text, "\n\n");
        text.trim().to_string()
    }

    /// Drop each opener line plus its continuation lines. A continuation
    /// ends at a blank line, a line starting with a capital letter, or a
    /// heading. An opener with no boundary after it removes only its own line.
    fn strip_reasoning(&self, text: &str) -> String {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut kept = Vec::with_capacity(lines.len());
        let mut i = 0;

        while i < lines.len() {
            if !self.openers.is_match(lines[i]) {
                kept.push(lines[i]);
                i += 1;
                continue;
            }

            let boundary = lines[i + 1..]
                .iter()
                .position(|l| is_paragraph_boundary(l))
                .map(|offset| i + 1 + offset);
            i = boundary.unwrap_or(i + 1);
        }

        kept.join("\n")
    }
}

fn is_paragraph_boundary(line: &str) -> bool {
    let trimmed = line.trim_start();
    match trimmed.chars().next() {
        None => true,
        Some(c) => c.is_uppercase() || c == '#',
    }
}

fn strip_channels(text: &str) -> String {
    if let Some(last) = FINAL_CHANNEL.find_iter(text).last() {
        return text[last.end()..].to_string();
    }
    HIDDEN_CHANNEL.replace_all(text, "").into_owned()
}

fn strip_markers(text: &str) -> String {
    let mut current = CONTROL_MARKER.replace_all(text, "").into_owned();
    while CONTROL_MARKER.is_match(&current) {
        current = CONTROL_MARKER.replace_all(&current, "").into_owned();
    }
    current
}
