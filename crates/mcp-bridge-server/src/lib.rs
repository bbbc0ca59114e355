// ABOUTME: Library root re-exporting server modules for integration testing
// ABOUTME: Enables tests/ to access router, state, handlers, and CLI configuration
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

pub mod api_types;
pub mod cli;
pub mod errors;
pub mod health;
pub mod router;
pub mod sse;
pub mod state;
pub mod tools;
