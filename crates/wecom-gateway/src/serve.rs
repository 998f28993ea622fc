// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wecom-gateway serve`: runs the callback endpoint until a shutdown signal.
//!
//! Decoded inbound messages are drained from the channel and logged. A host
//! that embeds `wecom-channel` replaces this loop with its own conversation
//! handling.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wecom_channel::WecomChannel;
use wecom_config::model::GatewayConfig;
use wecom_core::error::WecomError;
use wecom_core::traits::{ChannelAdapter, PluginAdapter};
use wecom_core::types::{InboundMessage, MessageBody};

use crate::shutdown;

pub async fn run_serve(config: GatewayConfig) -> Result<(), WecomError> {
    info!(name = %config.service.name, "starting wecom-gateway serve");

    wecom_channel::metrics::register_metrics();
    let mut channel = WecomChannel::new(config)?;
    channel.connect().await?;

    let cancel = shutdown::install_signal_handler();
    receive_loop(&channel, &cancel).await;

    channel.shutdown().await?;
    info!("wecom-gateway serve shutdown complete");
    Ok(())
}

/// Drains inbound messages until `cancel` fires or the queue closes.
/// Returns the number of messages received.
pub async fn receive_loop(channel: &WecomChannel, cancel: &CancellationToken) -> usize {
    let mut received = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = channel.receive() => match next {
                Ok(inbound) => {
                    received += 1;
                    log_inbound(&inbound);
                }
                Err(e) => {
                    warn!(error = %e, "inbound queue closed");
                    break;
                }
            },
        }
    }
    received
}

fn log_inbound(inbound: &InboundMessage) {
    let message = &inbound.message;
    let detail = match &message.body {
        MessageBody::Text { content } => format!("{} bytes", content.len()),
        MessageBody::Image { media_id, .. }
        | MessageBody::Voice { media_id, .. }
        | MessageBody::Video { media_id, .. }
        | MessageBody::File { media_id, .. } => format!("media_id={media_id}"),
        MessageBody::Link { url, .. } => format!("url={url}"),
    };
    info!(
        account = %inbound.account,
        sender = %message.sender,
        kind = %message.body.kind(),
        msg_id = message.msg_id.as_deref().unwrap_or(""),
        detail = %detail,
        "inbound message"
    );
}
