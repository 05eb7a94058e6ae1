// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Text transforms applied to upstream answer text.
//
// Both transforms are pure: no I/O, no shared mutable state. The sanitizer is
// idempotent, which the chunk emitter depends on because it re-sanitizes the
// already-emitted prefix on every round.

mod reasoning;
mod sanitizer;

pub use reasoning::extract_reasoning;
pub use sanitizer::ArtifactSanitizer;

// ---------------------------------------------------------------------------
// Trait: Sanitizer
// ---------------------------------------------------------------------------

/// Pure answer-text sanitizer. Implementations must be Send + Sync so one
/// instance can be shared by every in-flight request.
pub trait Sanitizer: Send + Sync {
    /// Remove upstream artifacts from `text`. When `strip_reasoning_artifacts`
    /// is true, leaked-reasoning preambles are removed as well.
    ///
    /// The result must be idempotent:
    /// `sanitize(sanitize(x, f), f) == sanitize(x, f)` for all `x` and `f`.
    fn sanitize(&self, text: &str, strip_reasoning_artifacts: bool) -> String;
}
