//! Locate a JSON object inside noisy CLI output.
//!
//! Agent CLIs print banners, progress lines, and warnings around their
//! `--json` payload. [`extract_object`] returns the first balanced top-level
//! object that parses, trying each `{` in order of appearance.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("no JSON object found in output")]
    NoObject,
    #[error("unterminated JSON object in output")]
    Unbalanced,
    #[error("invalid JSON object in output: {0}")]
    Invalid(String),
}

/// Parse the first well-formed JSON object embedded in `raw`.
pub fn extract_object(raw: &str) -> Result<Value, RegionError> {
    let bytes = raw.as_bytes();
    let mut ends = HashMap::new();
    let mut last_error = RegionError::NoObject;
    for (start, _) in raw.match_indices('{') {
        if !ends.contains_key(&start) {
            scan_objects(bytes, start, &mut ends);
        }
        let Some(end) = ends.get(&start).copied().flatten() else {
            if last_error == RegionError::NoObject {
                last_error = RegionError::Unbalanced;
            }
            continue;
        };
        match serde_json::from_str::<Value>(&raw[start..=end]) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => {}
            Err(err) => last_error = RegionError::Invalid(err.to_string()),
        }
    }
    Err(last_error)
}

/// Scan from the `{` at `start`, honouring strings and escapes, until that
/// object closes or the input ends.
///
/// Records the closing index (or `None` when unclosed) for `start` and for
/// every `{` met outside a string on the way: a scan begun at any of those
/// would see exactly the same bytes in the same string state.
fn scan_objects(bytes: &[u8], start: usize, ends: &mut HashMap<usize, Option<usize>>) {
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (index, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => open.push(index),
            b'}' => {
                if let Some(opened) = open.pop() {
                    ends.insert(opened, Some(index));
                }
                if open.is_empty() {
                    return;
                }
            }
            _ => {}
        }
    }
    for opened in open {
        ends.insert(opened, None);
    }
}
