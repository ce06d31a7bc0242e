//! Two-tier `key=value` config text.
//!
//! A line splits at its first `=`. When the part before it is `param` or
//! `msg`, the line splits again at the second `=` and the key becomes
//! `param-<name>` / `msg-<name>`.

use crate::error::ProtocolError;
use std::collections::HashMap;

const COMPOUND_KEYS: [&str; 2] = ["param", "msg"];

pub(crate) fn parse_lines(text: &str) -> Result<HashMap<String, String>, ProtocolError> {
    let mut values = HashMap::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || ProtocolError::MalformedConfig {
            line: i + 1,
            text: line.to_string(),
        };
        let (first, rest) = line.split_once('=').ok_or_else(malformed)?;
        let (key, value) = if COMPOUND_KEYS.contains(&first) {
            let (second, value) = rest.split_once('=').ok_or_else(malformed)?;
            (format!("{}-{}", first, second), value)
        } else {
            (first.to_string(), rest)
        };
        values.insert(key, value.to_string());
    }
    Ok(values)
}
