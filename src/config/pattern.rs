// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use regex::Regex;

use super::error::ConfigError;

/// A pre-compiled leak-phrase pattern.
///
/// Leak patterns are always applied case-insensitively with `.` matching
/// newlines, and are anchored at the start of the text: the compiled regex
/// is `(?is)^(?:<pattern>)`. The original pattern string is kept for
/// logging and equality.
#[derive(Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    pub regex: Regex,
}

impl CompiledPattern {
    /// Compile an anchored, case-insensitive, dot-all pattern.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        let anchored = format!("(?is)^(?:{pattern})");
        let regex = Regex::new(&anchored).map_err(|e| ConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Test whether the pattern matches at the start of `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Remove the anchored match, if any. Returns `None` when nothing matched
    /// or the match was empty.
    pub fn strip_prefix<'a>(&self, text: &'a str) -> Option<&'a str> {
        let m = self.regex.find(text)?;
        if m.end() == 0 {
            return None;
        }
        Some(&text[m.end()..])
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}
