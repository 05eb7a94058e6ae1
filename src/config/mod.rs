// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator.
//
// Loads chatbridge.yaml, validates structure, resolves `${VAR}` interpolation
// in credential fields, compiles leak-phrase patterns, and computes a
// deterministic config hash.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod pattern;
mod raw;
mod source;
mod types;

pub use defaults::{default_leak_patterns, default_models, DEFAULT_MODEL};
pub use error::ConfigError;
pub use loader::{compute_hash, cookie_header, load_config};
pub use pattern::CompiledPattern;
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::*;
