// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the WeCom gateway.
//!
//! Each pipeline stage owns a narrow error enum so callers can match on the
//! failure they care about. [`WecomError`] wraps all of them for code that
//! only needs to propagate.
//!
//! None of these errors carry plaintext payloads, access tokens, or secrets.
//! Security-sensitive variants (signature, padding, receiver mismatch) render
//! generic messages so they cannot be used as a decryption oracle.

use std::time::Duration;

use thiserror::Error;

/// Account resolution failures. Fatal at startup, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required credential field is absent or empty.
    #[error("account `{account}` is missing required field `{field}`")]
    MissingCredential {
        account: String,
        field: &'static str,
    },

    /// An explicit account id was requested but is not configured.
    #[error("unknown account `{0}`")]
    UnknownAccount(String),

    /// The callback key does not decode to the cipher's key size.
    #[error("account `{account}` has an invalid encoding_aes_key: {reason}")]
    InvalidKey { account: String, reason: String },
}

/// Callback decryption failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptError {
    /// Ciphertext is not valid base64 or not a whole number of cipher blocks.
    #[error("malformed ciphertext")]
    MalformedCiphertext,

    /// Padding bytes are out of range or inconsistent.
    #[error("invalid padding")]
    InvalidPadding,

    /// The embedded length field does not fit the recovered payload.
    #[error("length field does not match payload")]
    LengthMismatch,

    /// The embedded receiver id belongs to a different corp.
    #[error("receiver id mismatch")]
    ReceiverMismatch,

    /// The recovered message is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Structured-payload decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload exceeds the configured ceiling; it was not parsed.
    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    /// Document type declarations are never accepted.
    #[error("document type declarations are not permitted")]
    Forbidden,

    /// `MsgType` is not one of the supported variants.
    #[error("unsupported message type `{0}`")]
    UnsupportedType(String),

    /// A field required by the message type is missing.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// The payload is not well-formed.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Access-token lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The credential fetch failed or timed out. Shared by every caller that
    /// was waiting on the same refresh.
    #[error("token refresh for account `{account}` failed: {reason}")]
    RefreshFailed { account: String, reason: String },
}

/// Failures talking to the Platform REST API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The Platform answered with a nonzero `errcode`.
    #[error("platform error {code}: {message}")]
    Platform { code: i64, message: String },

    /// Connection, TLS, or HTTP-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be understood.
    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    /// The call did not finish within its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Outbound send failures, as seen by the caller of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Permanent rejection (recipient not permitted, payload too large, ...).
    #[error("rejected by platform{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Rejected { code: Option<i64>, message: String },

    /// The Platform throttled the call, even after the credential retry.
    #[error("rate limited by platform ({code})")]
    RateLimited { code: i64 },

    /// Network-level failure or timeout. The caller may retry with backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// No usable access token could be obtained.
    #[error(transparent)]
    Credential(#[from] TokenError),

    /// The job names an account that is not configured.
    #[error(transparent)]
    Account(#[from] ConfigError),
}

/// The umbrella error type for the gateway.
#[derive(Debug, Error)]
pub enum WecomError {
    /// Account or configuration errors.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("decrypt error: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("send error: {0}")]
    Send(#[from] SendError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel lifecycle errors (bind failure, closed queue, ...).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
