// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracing setup. All log output passes through the redacting writer.

use tracing_subscriber::EnvFilter;
use wecom_config::model::WecomConfig;
use wecom_security::{RedactingMakeWriter, SecretSet};

/// Collects every configured secret value, for every account shape.
pub fn secret_set(config: &WecomConfig) -> SecretSet {
    let secrets = SecretSet::new();
    let entries = std::iter::once(config.flat_account()).chain(config.accounts.values().cloned());
    for entry in entries {
        for value in [entry.corp_secret, entry.callback_token, entry.encoding_aes_key]
            .into_iter()
            .flatten()
        {
            if !value.trim().is_empty() {
                secrets.insert(value);
            }
        }
    }
    secrets
}

/// Builds the default filter: `wecom*` targets at `log_level`, the rest at warn.
pub fn default_filter(log_level: &str) -> EnvFilter {
    EnvFilter::new(format!("wecom={log_level},warn"))
}

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(log_level: &str, secrets: SecretSet) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(RedactingMakeWriter::new(std::io::stderr, secrets))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use wecom_config::model::AccountConfig;

    #[test]
    fn collects_flat_and_named_secrets() {
        let mut config = WecomConfig {
            corp_secret: Some("flat-secret".into()),
            callback_token: Some("  ".into()),
            ..Default::default()
        };
        config.accounts.insert(
            "sales".into(),
            AccountConfig {
                corp_secret: Some("sales-secret".into()),
                encoding_aes_key: Some("sales-key".into()),
                ..Default::default()
            },
        );

        let secrets = secret_set(&config);
        assert_eq!(secrets.len(), 3);
    }

    #[test]
    fn default_filter_names_level() {
        let filter = default_filter("debug");
        assert!(filter.to_string().contains("wecom=debug"));
    }
}
