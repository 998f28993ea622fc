// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hand-off point from the inbound pipeline to the conversation side.

use async_trait::async_trait;

use crate::error::WecomError;
use crate::types::InboundMessage;

/// Receives decoded inbound messages.
///
/// Delivery is fire-and-forget from the webhook's point of view: the Platform
/// has already been acknowledged when `deliver` runs, so an error here is
/// only logged.
#[async_trait]
pub trait ConversationSink: Send + Sync + 'static {
    async fn deliver(&self, message: InboundMessage) -> Result<(), WecomError>;
}
