// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation sink that records every delivered message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use wecom_core::error::WecomError;
use wecom_core::traits::ConversationSink;
use wecom_core::types::InboundMessage;

#[derive(Clone, Default)]
pub struct RecordingSink {
    delivered: Arc<Mutex<Vec<InboundMessage>>>,
    notify: Arc<Notify>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn delivered(&self) -> Vec<InboundMessage> {
        self.delivered.lock().await.clone()
    }

    /// Waits until at least `count` messages arrived or `timeout` elapses,
    /// then returns what was recorded.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<InboundMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            {
                let delivered = self.delivered.lock().await;
                if delivered.len() >= count {
                    return delivered.clone();
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.delivered().await;
            }
        }
    }
}

#[async_trait]
impl ConversationSink for RecordingSink {
    async fn deliver(&self, message: InboundMessage) -> Result<(), WecomError> {
        self.delivered.lock().await.push(message);
        self.notify.notify_waiters();
        Ok(())
    }
}
