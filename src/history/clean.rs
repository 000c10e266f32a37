//! Thinking-segment scrubbing for stored replies.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::OnceLock;

/// What to do with `<think>` / `<thinking>` segments in a reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingPolicy {
    /// Leave the reply untouched.
    Keep,
    /// Drop the delimiter tags, keep the reasoning text.
    StripTags,
    /// Drop tags and everything between them.
    #[default]
    StripAll,
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?think(?:ing)?>").expect("valid tag pattern"))
}

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<think(?:ing)?>.*?</think(?:ing)?>").expect("valid block pattern")
    })
}

fn unclosed_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think(?:ing)?>.*$").expect("valid unclosed pattern"))
}

impl ThinkingPolicy {
    /// Policy implied by a graph's `includeThinking` flag.
    pub fn from_include_flag(include_thinking: bool) -> Self {
        if include_thinking {
            Self::Keep
        } else {
            Self::StripAll
        }
    }

    /// Apply the policy to `text`.
    ///
    /// Surrounding whitespace is trimmed only when a segment was removed;
    /// replies without thinking tags come back unchanged.
    pub fn apply(&self, text: &str) -> String {
        let stripped = match self {
            Self::Keep => return text.to_string(),
            Self::StripTags => tag_regex().replace_all(text, ""),
            Self::StripAll => match block_regex().replace_all(text, "") {
                // A reply cut off mid-reasoning leaves an unterminated segment.
                Cow::Borrowed(untouched) => unclosed_regex().replace(untouched, ""),
                Cow::Owned(closed) => Cow::Owned(unclosed_regex().replace(&closed, "").into_owned()),
            },
        };
        match stripped {
            Cow::Borrowed(untouched) => untouched.to_string(),
            Cow::Owned(cleaned) => cleaned.trim().to_string(),
        }
    }
}
