// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for the host runtime.

use async_trait::async_trait;

use crate::error::WecomError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChannelCapabilities, InboundMessage, MessageId, OutboundMessage};

/// Bidirectional messaging channel as seen by a host runtime.
///
/// The host pulls decoded inbound messages with [`receive`](Self::receive)
/// and pushes replies with [`send`](Self::send).
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Returns the capabilities supported by this channel.
    fn capabilities(&self) -> ChannelCapabilities;

    /// Starts accepting inbound traffic.
    async fn connect(&mut self) -> Result<(), WecomError>;

    /// Sends a message. Long text is split into several Platform messages,
    /// so one call may yield several ids, in order.
    async fn send(&self, msg: OutboundMessage) -> Result<Vec<MessageId>, WecomError>;

    /// Receives the next inbound message from the channel.
    async fn receive(&self) -> Result<InboundMessage, WecomError>;
}
