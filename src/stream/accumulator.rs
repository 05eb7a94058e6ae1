// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

use super::types::{Fragment, FragmentKind};

/// Running transcript for one request.
///
/// `Final` replaces the answer, `Incremental` appends to it, and `Reasoning`
/// appends to the reasoning trace. Duplicate reasoning fragments are kept;
/// the emitter decides what is sent.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    answer: String,
    reasoning: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, fragment: &Fragment) {
        match fragment.kind {
            FragmentKind::Final => {
                self.answer.clear();
                self.answer.push_str(&fragment.text);
            }
            FragmentKind::Incremental => self.answer.push_str(&fragment.text),
            FragmentKind::Reasoning => self.reasoning.push_str(&fragment.text),
        }
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }
}
