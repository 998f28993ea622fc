// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams of the gateway.
//!
//! Adapters extend [`PluginAdapter`] and use `#[async_trait]` for dynamic
//! dispatch. [`PlatformApi`] and [`ConversationSink`] are the two boundaries
//! that tests replace with mocks.

pub mod adapter;
pub mod channel;
pub mod conversation;
pub mod platform;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use conversation::ConversationSink;
pub use platform::PlatformApi;
