//! Commit subject composition.
//!
//! Every interpolated field may come from user edits or agent output, so each
//! is flattened to one line and capped before it reaches `git commit -m`.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

use crate::core::config::DEFAULT_COMMIT_PREFIX;

pub const PREFIX_MAX_CHARS: usize = 60;
pub const ACTOR_MAX_CHARS: usize = 24;
pub const REASON_MAX_CHARS: usize = 30;
pub const HINT_MAX_CHARS: usize = 48;
/// Length of an RFC 3339 UTC timestamp with milliseconds.
pub const TIMESTAMP_CHARS: usize = "2000-01-01T00:00:00.000Z".len();

/// Upper bound on the composed subject, separators included.
pub const MAX_SUBJECT_CHARS: usize = PREFIX_MAX_CHARS
    + " [".len()
    + ACTOR_MAX_CHARS
    + "] (".len()
    + REASON_MAX_CHARS
    + ") ".len()
    + HINT_MAX_CHARS
    + " ".len()
    + TIMESTAMP_CHARS;

#[derive(Debug, Clone, Copy)]
pub struct CommitFields<'a> {
    pub prefix: &'a str,
    pub actor_name: &'a str,
    pub reason: &'a str,
    pub hint: &'a str,
}

/// `<prefix> [<actor>] (<reason>) <hint> <timestamp>`; the hint segment is
/// omitted when it sanitizes to nothing.
pub fn compose(fields: CommitFields<'_>, timestamp: &str) -> String {
    let prefix = non_empty_or(
        sanitize(fields.prefix, PREFIX_MAX_CHARS),
        DEFAULT_COMMIT_PREFIX,
    );
    let actor = non_empty_or(sanitize(fields.actor_name, ACTOR_MAX_CHARS), "Agent");
    let reason = non_empty_or(sanitize(fields.reason, REASON_MAX_CHARS), "scheduled");
    let hint = sanitize(fields.hint, HINT_MAX_CHARS);
    if hint.is_empty() {
        format!("{prefix} [{actor}] ({reason}) {timestamp}")
    } else {
        format!("{prefix} [{actor}] ({reason}) {hint} {timestamp}")
    }
}

/// Collapse line breaks to single spaces, trim, and cap at `max_chars`.
pub fn sanitize(raw: &str, max_chars: usize) -> String {
    static LINE_BREAKS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[\r\n]+").expect("line break pattern is valid"));
    let flattened = LINE_BREAKS.replace_all(raw, " ");
    let capped: String = flattened.trim().chars().take(max_chars).collect();
    capped.trim_end().to_string()
}

pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}
