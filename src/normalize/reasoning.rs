// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::sync::LazyLock;

use regex::Regex;

static THINKING_INNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<thinking>(.*?)</thinking>").expect("built-in pattern is valid")
});

static THOUGHT_INNER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<thought>(.*?)</thought>").expect("built-in pattern is valid")
});

/// Collect the inner text of every closed `<thinking>` block, then every
/// closed `<thought>` block, joined by a single newline and trimmed.
///
/// Returns an empty string when `text` has no closed block. Unclosed tags
/// are ignored; the block is picked up once its closing tag has arrived.
pub fn extract_reasoning(text: &str) -> String {
    if !text.contains('<') {
        return String::new();
    }

    let parts: Vec<&str> = THINKING_INNER
        .captures_iter(text)
        .chain(THOUGHT_INNER.captures_iter(text))
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    parts.join("\n").trim().to_string()
}
