// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the inbound and outbound halves of the gateway.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Synthetic identifier used for the flat single-account configuration shape.
pub const DEFAULT_ACCOUNT: &str = "default";

/// Identifier of one configured Platform account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    /// The id the flat configuration shape always resolves to.
    pub fn default_account() -> Self {
        Self(DEFAULT_ACCOUNT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Platform-assigned identifier of a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// Tag of a decoded inbound message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    File,
    Link,
}

/// Variant-specific content of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    Text {
        content: String,
    },
    Image {
        pic_url: String,
        media_id: String,
    },
    Voice {
        media_id: String,
        format: String,
    },
    Video {
        media_id: String,
        thumb_media_id: String,
    },
    File {
        media_id: String,
        file_name: Option<String>,
    },
    Link {
        title: String,
        description: String,
        url: String,
        pic_url: Option<String>,
    },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text { .. } => MessageKind::Text,
            MessageBody::Image { .. } => MessageKind::Image,
            MessageBody::Voice { .. } => MessageKind::Voice,
            MessageBody::Video { .. } => MessageKind::Video,
            MessageBody::File { .. } => MessageKind::File,
            MessageBody::Link { .. } => MessageKind::Link,
        }
    }
}

/// A callback payload after decryption and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedMessage {
    /// `FromUserName`: the member who sent the message.
    pub sender: String,
    /// `ToUserName`: the receiving corp.
    pub receiver: String,
    /// `CreateTime`, converted from epoch seconds.
    pub created_at: DateTime<Utc>,
    pub msg_id: Option<String>,
    pub agent_id: Option<String>,
    pub body: MessageBody,
}

impl DecodedMessage {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

/// A decoded message handed to the conversation side, tagged with the
/// account it arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub account: AccountId,
    pub message: DecodedMessage,
    pub received_at: DateTime<Utc>,
}

/// Who an outbound message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Explicit member ids.
    Users(Vec<String>),
    /// Every member visible to the agent.
    All,
}

impl Recipient {
    /// Parses the CLI/notify form: `@all`, or member ids separated by `|` or `,`.
    pub fn parse(value: &str) -> Self {
        if value.trim() == "@all" {
            return Recipient::All;
        }
        Recipient::Users(
            value
                .split(['|', ','])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// True when no member would receive the message (`--to ""`, `--to ","`).
    pub fn is_empty(&self) -> bool {
        matches!(self, Recipient::Users(users) if users.is_empty())
    }

    /// Renders the `touser` wire value.
    pub fn to_touser(&self) -> String {
        match self {
            Recipient::All => "@all".to_string(),
            Recipient::Users(users) => users.join("|"),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_touser())
    }
}

/// Media categories accepted by the upload endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Voice,
    Video,
    File,
}

/// Content of one outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    Media { kind: MediaKind, media_id: String },
}

impl OutboundPayload {
    /// The `msgtype` wire value.
    pub fn msg_type(&self) -> &'static str {
        match self {
            OutboundPayload::Text(_) => "text",
            OutboundPayload::Media { kind, .. } => match kind {
                MediaKind::Image => "image",
                MediaKind::Voice => "voice",
                MediaKind::Video => "video",
                MediaKind::File => "file",
            },
        }
    }
}

/// A caller-level outbound message. Text may exceed the Platform's byte limit;
/// the channel segments it into several jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// `None` selects the default account.
    pub account: Option<AccountId>,
    pub recipient: Recipient,
    pub payload: OutboundPayload,
}

/// One unit of work for the dispatcher. Text payloads are already within the
/// byte limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundJob {
    pub account: AccountId,
    pub recipient: Recipient,
    pub payload: OutboundPayload,
    pub enqueued_at: tokio::time::Instant,
}

impl OutboundJob {
    pub fn new(account: AccountId, recipient: Recipient, payload: OutboundPayload) -> Self {
        Self {
            account,
            recipient,
            payload,
            enqueued_at: tokio::time::Instant::now(),
        }
    }

    pub fn text(account: AccountId, recipient: Recipient, text: impl Into<String>) -> Self {
        Self::new(account, recipient, OutboundPayload::Text(text.into()))
    }
}

/// A binary payload to upload as temporary media.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub kind: MediaKind,
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for MediaUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaUpload")
            .field("kind", &self.kind)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// A freshly fetched access token and its declared lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: Duration,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[redacted]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Result of a successful send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub msg_id: Option<MessageId>,
    /// Network send calls made for the job (1, or 2 after a credential retry).
    pub attempts: u8,
}

/// Capabilities reported by a channel adapter.
#[derive(Debug, Clone)]
pub struct ChannelCapabilities {
    pub supports_images: bool,
    pub supports_documents: bool,
    pub supports_voice: bool,
    pub supports_video: bool,
    /// Maximum text size in UTF-8 bytes for a single Platform message.
    pub max_message_bytes: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn recipient_parse_and_render() {
        assert_eq!(Recipient::parse("@all"), Recipient::All);
        assert_eq!(Recipient::parse("@all").to_touser(), "@all");

        let users = Recipient::parse("alice| bob,carol");
        assert_eq!(
            users,
            Recipient::Users(vec!["alice".into(), "bob".into(), "carol".into()])
        );
        assert_eq!(users.to_touser(), "alice|bob|carol");
        assert!(!users.is_empty());
        assert!(!Recipient::All.is_empty());
    }

    #[test]
    fn blank_recipient_lists_are_empty() {
        assert!(Recipient::parse("").is_empty());
        assert!(Recipient::parse(",").is_empty());
        assert!(Recipient::parse(" | , ").is_empty());
    }

    #[test]
    fn message_kind_round_trips_through_strings() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::Voice,
            MessageKind::Video,
            MessageKind::File,
            MessageKind::Link,
        ] {
            let s = kind.to_string();
            assert_eq!(s, s.to_lowercase());
            assert_eq!(MessageKind::from_str(&s).unwrap(), kind);
        }
        assert!(MessageKind::from_str("event").is_err());
    }

    #[test]
    fn payload_msg_types() {
        assert_eq!(OutboundPayload::Text("hi".into()).msg_type(), "text");
        let media = OutboundPayload::Media {
            kind: MediaKind::File,
            media_id: "m".into(),
        };
        assert_eq!(media.msg_type(), "file");
    }

    #[test]
    fn token_grant_debug_redacts_value() {
        let grant = TokenGrant {
            access_token: "super-secret-token".into(),
            expires_in: Duration::from_secs(7200),
        };
        let debug = format!("{grant:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn decoded_message_serializes_with_type_tag() {
        let msg = DecodedMessage {
            sender: "alice".into(),
            receiver: "ww123".into(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            msg_id: Some("1".into()),
            agent_id: Some("1000002".into()),
            body: MessageBody::Text {
                content: "hello".into(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["body"]["type"], "text");
        assert_eq!(json["body"]["content"], "hello");
        assert_eq!(msg.kind(), MessageKind::Text);
    }
}
