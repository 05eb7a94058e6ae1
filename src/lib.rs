// Copyright 2026 The Chatbridge Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod message;
pub mod normalize;
pub mod proxy;
pub mod ratelimit;
pub mod stream;
pub mod upstream;
