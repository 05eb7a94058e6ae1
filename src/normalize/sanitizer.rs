// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use super::Sanitizer;
use crate::config::{default_leak_patterns, CompiledPattern};

static LANG_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<lang primary="[^"]*"\s*/>\n*"#).expect("built-in pattern is valid")
});

static THINKING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<thinking>.*?</thinking>\s*").expect("built-in pattern is valid")
});

static THOUGHT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<thought>.*?</thought>\s*").expect("built-in pattern is valid")
});

// ---------------------------------------------------------------------------
// Implementation: ArtifactSanitizer
// ---------------------------------------------------------------------------

/// Sanitizer that applies, in order:
///
/// 1. Language-marker tag removal (`<lang primary="..."/>` plus trailing newlines)
/// 2. Closed `<thinking>` / `<thought>` block removal, including trailing whitespace
/// 3. Leak-phrase removal, only when reasoning artifacts are to be stripped
/// 4. Whitespace trim
///
/// The passes are repeated until the text stops changing, so output fed
/// back in is returned unchanged.
#[derive(Debug, Clone)]
pub struct ArtifactSanitizer {
    leak_patterns: Vec<CompiledPattern>,
}

impl ArtifactSanitizer {
    pub fn new(leak_patterns: Vec<CompiledPattern>) -> Self {
        Self { leak_patterns }
    }

    /// Sanitizer using only the built-in leak-phrase catalogue.
    pub fn with_default_patterns() -> Self {
        Self::new(default_leak_patterns())
    }

    pub fn leak_patterns(&self) -> &[CompiledPattern] {
        &self.leak_patterns
    }

    fn single_pass(&self, text: &str, strip_reasoning_artifacts: bool) -> String {
        let mut out: Cow<'_, str> = LANG_TAG.replace_all(text, "");
        if let Cow::Owned(s) = THINKING_BLOCK.replace_all(&out, "") {
            out = Cow::Owned(s);
        }
        if let Cow::Owned(s) = THOUGHT_BLOCK.replace_all(&out, "") {
            out = Cow::Owned(s);
        }

        if strip_reasoning_artifacts {
            for pattern in &self.leak_patterns {
                if let Some(rest) = pattern.strip_prefix(&out) {
                    out = Cow::Owned(rest.to_string());
                }
            }
        }

        out.trim().to_string()
    }
}

impl Default for ArtifactSanitizer {
    fn default() -> Self {
        Self::with_default_patterns()
    }
}

impl Sanitizer for ArtifactSanitizer {
    fn sanitize(&self, text: &str, strip_reasoning_artifacts: bool) -> String {
        if text.is_empty() {
            return String::new();
        }

        // Every pass either shortens the text or leaves it unchanged.
        let mut current = self.single_pass(text, strip_reasoning_artifacts);
        loop {
            let next = self.single_pass(&current, strip_reasoning_artifacts);
            if next == current {
                return current;
            }
            current = next;
        }
    }
}
