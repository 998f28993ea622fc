// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the WeCom gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level gateway configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Webhook listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Platform endpoint and account credentials.
    #[serde(default)]
    pub wecom: WecomConfig,

    /// Access-token lifecycle settings.
    #[serde(default)]
    pub token: TokenConfig,

    /// Outbound dispatch bounds.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Inbound pipeline limits.
    #[serde(default)]
    pub inbound: InboundConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Name reported by the channel adapter and in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "wecom-gateway".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Webhook listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Callback path for the default account. Named accounts are served at
    /// `{callback_path}/{account}`.
    #[serde(default = "default_callback_path")]
    pub callback_path: String,

    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            callback_path: default_callback_path(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_callback_path() -> String {
    "/wecom/callback".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Platform configuration.
///
/// Credentials come in one of two shapes. The flat shape sets the credential
/// fields directly in `[wecom]` and always resolves as the `default` account.
/// The multi-account shape lists `[wecom.accounts.<id>]` tables. Mixing the
/// two is rejected by validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WecomConfig {
    /// Base URL of the Platform REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub corp_id: Option<String>,

    #[serde(default)]
    pub corp_secret: Option<String>,

    #[serde(default)]
    pub agent_id: Option<u64>,

    #[serde(default)]
    pub callback_token: Option<String>,

    #[serde(default)]
    pub encoding_aes_key: Option<String>,

    /// Outbound HTTP(S) proxy for the flat account.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Account used when a caller does not name one (multi-account shape).
    #[serde(default)]
    pub default_account: Option<String>,

    /// Named accounts.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl Default for WecomConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            corp_id: None,
            corp_secret: None,
            agent_id: None,
            callback_token: None,
            encoding_aes_key: None,
            proxy: None,
            default_account: None,
            accounts: BTreeMap::new(),
        }
    }
}

impl WecomConfig {
    /// Returns `true` if any credential field is set directly in `[wecom]`.
    pub fn has_flat_fields(&self) -> bool {
        self.corp_id.is_some()
            || self.corp_secret.is_some()
            || self.agent_id.is_some()
            || self.callback_token.is_some()
            || self.encoding_aes_key.is_some()
    }

    /// Returns `true` if named accounts are configured.
    pub fn is_multi_account(&self) -> bool {
        !self.accounts.is_empty()
    }

    /// The flat credential fields viewed as an account entry.
    pub fn flat_account(&self) -> AccountConfig {
        AccountConfig {
            corp_id: self.corp_id.clone(),
            corp_secret: self.corp_secret.clone(),
            agent_id: self.agent_id,
            callback_token: self.callback_token.clone(),
            encoding_aes_key: self.encoding_aes_key.clone(),
            proxy: self.proxy.clone(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://qyapi.weixin.qq.com".to_string()
}

/// Credentials of one Platform account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    #[serde(default)]
    pub corp_id: Option<String>,

    #[serde(default)]
    pub corp_secret: Option<String>,

    #[serde(default)]
    pub agent_id: Option<u64>,

    /// Token used to sign callbacks.
    #[serde(default)]
    pub callback_token: Option<String>,

    /// 43-character base64 key used to encrypt callbacks.
    #[serde(default)]
    pub encoding_aes_key: Option<String>,

    #[serde(default)]
    pub proxy: Option<String>,
}

/// Access-token lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// A cached token is treated as stale this long before its declared expiry.
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: u64,

    /// Deadline for one credential fetch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            safety_margin_secs: default_safety_margin_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl TokenConfig {
    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn default_safety_margin_secs() -> u64 {
    300
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

/// Outbound dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Maximum concurrent Platform calls across all accounts.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Minimum spacing between the starts of two Platform calls.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    /// Maximum UTF-8 bytes in one text message.
    #[serde(default = "default_text_byte_limit")]
    pub text_byte_limit: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            min_interval_ms: default_min_interval_ms(),
            send_timeout_secs: default_send_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            text_byte_limit: default_text_byte_limit(),
        }
    }
}

impl DispatchConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

fn default_max_in_flight() -> usize {
    3
}

fn default_min_interval_ms() -> u64 {
    50
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_upload_timeout_secs() -> u64 {
    30
}

/// Platform hard limit for a text message body.
pub const PLATFORM_TEXT_BYTE_LIMIT: usize = 2048;

fn default_text_byte_limit() -> usize {
    PLATFORM_TEXT_BYTE_LIMIT
}

/// Inbound pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InboundConfig {
    /// Decrypted payloads above this size are dropped without parsing.
    #[serde(default = "default_max_plaintext_bytes")]
    pub max_plaintext_bytes: usize,

    /// Capacity of the queue between the webhook and `receive()`.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            max_plaintext_bytes: default_max_plaintext_bytes(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_max_plaintext_bytes() -> usize {
    512 * 1024
}

fn default_queue_capacity() -> usize {
    256
}
