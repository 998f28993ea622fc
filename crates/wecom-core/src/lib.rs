// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the WeCom gateway.
//!
//! Provides the error taxonomy, the domain types passed between the inbound
//! and outbound pipelines, and the trait seams ([`PlatformApi`],
//! [`ConversationSink`], [`ChannelAdapter`]) the channel crate is built on.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{
    ConfigError, DecodeError, DecryptError, SendError, TokenError, TransportError, WecomError,
};
pub use types::{
    AccountId, ChannelCapabilities, DecodedMessage, HealthStatus, InboundMessage, MediaKind,
    MediaUpload, MessageBody, MessageId, MessageKind, OutboundJob, OutboundMessage,
    OutboundPayload, Recipient, SendReceipt, TokenGrant, DEFAULT_ACCOUNT,
};

pub use traits::{ChannelAdapter, ConversationSink, PlatformApi, PluginAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wecom_error_has_all_variants() {
        let _config = WecomError::Config(ConfigError::UnknownAccount("x".into()));
        let _decrypt = WecomError::Decrypt(DecryptError::InvalidPadding);
        let _decode = WecomError::Decode(DecodeError::Forbidden);
        let _token = WecomError::Token(TokenError::RefreshFailed {
            account: "default".into(),
            reason: "test".into(),
        });
        let _send = WecomError::Send(SendError::Transient("test".into()));
        let _transport = WecomError::Transport(TransportError::Network("test".into()));
        let _channel = WecomError::Channel {
            message: "test".into(),
            source: None,
        };
        let _timeout = WecomError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = WecomError::Internal("test".into());
    }

    #[test]
    fn default_account_id() {
        assert_eq!(AccountId::default_account().as_str(), DEFAULT_ACCOUNT);
        assert_eq!(AccountId::from("sales").to_string(), "sales");
    }
}
