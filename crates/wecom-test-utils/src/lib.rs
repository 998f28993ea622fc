// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for WeCom gateway tests.
//!
//! Provides scripted implementations of the gateway's trait seams so the
//! token manager, dispatcher, and webhook can be exercised without the
//! Platform.
//!
//! # Components
//!
//! - [`MockPlatform`] - Scripted `PlatformApi` with call accounting
//! - [`RecordingSink`] - `ConversationSink` that captures delivered messages

pub mod mock_platform;
pub mod recording_sink;

pub use mock_platform::{MockPlatform, SentJob};
pub use recording_sink::RecordingSink;
