// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Credential completeness is checked later, when accounts are resolved;
//! this pass covers the shape of the file and the numeric bounds.

use crate::diagnostic::ConfigDiagnostic;
use crate::model::{GatewayConfig, PLATFORM_TEXT_BYTE_LIMIT};

/// Declared token lifetime on the Platform. A margin at or beyond it would
/// make every token stale on arrival.
const TOKEN_LIFETIME_SECS: u64 = 7200;

/// Returns `true` for ids usable as a URL path segment and map key.
pub fn is_valid_account_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ConfigDiagnostic>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ConfigDiagnostic::validation("server.host", "must not be empty"));
    }

    let path = &config.server.callback_path;
    if !path.starts_with('/') {
        errors.push(ConfigDiagnostic::validation(
            "server.callback_path",
            format!("`{path}` must start with `/`"),
        ));
    } else if path.len() > 1 && path.ends_with('/') {
        errors.push(ConfigDiagnostic::validation(
            "server.callback_path",
            format!("`{path}` must not end with `/`"),
        ));
    }

    if config.server.max_body_bytes == 0 {
        errors.push(ConfigDiagnostic::validation(
            "server.max_body_bytes",
            "must be greater than 0",
        ));
    }

    let base = &config.wecom.api_base_url;
    if !(base.starts_with("https://") || base.starts_with("http://")) {
        errors.push(ConfigDiagnostic::validation(
            "wecom.api_base_url",
            format!("`{base}` must be an http(s) URL"),
        ));
    }

    validate_accounts(config, &mut errors);

    if config.token.safety_margin_secs >= TOKEN_LIFETIME_SECS {
        errors.push(ConfigDiagnostic::validation(
            "token.safety_margin_secs",
            format!(
                "must be below the {TOKEN_LIFETIME_SECS}s token lifetime, got {}",
                config.token.safety_margin_secs
            ),
        ));
    }

    for (key, value) in [
        ("token.fetch_timeout_secs", config.token.fetch_timeout_secs),
        ("dispatch.send_timeout_secs", config.dispatch.send_timeout_secs),
        ("dispatch.upload_timeout_secs", config.dispatch.upload_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ConfigDiagnostic::validation(key, "must be greater than 0"));
        }
    }

    for (key, value) in [
        ("dispatch.max_in_flight", config.dispatch.max_in_flight),
        ("inbound.max_plaintext_bytes", config.inbound.max_plaintext_bytes),
        ("inbound.queue_capacity", config.inbound.queue_capacity),
    ] {
        if value == 0 {
            errors.push(ConfigDiagnostic::validation(key, "must be greater than 0"));
        }
    }

    let limit = config.dispatch.text_byte_limit;
    if limit == 0 || limit > PLATFORM_TEXT_BYTE_LIMIT {
        errors.push(ConfigDiagnostic::validation(
            "dispatch.text_byte_limit",
            format!("must be between 1 and {PLATFORM_TEXT_BYTE_LIMIT}, got {limit}"),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_accounts(config: &GatewayConfig, errors: &mut Vec<ConfigDiagnostic>) {
    let wecom = &config.wecom;

    if wecom.has_flat_fields() && wecom.is_multi_account() {
        errors.push(ConfigDiagnostic::validation(
            "wecom",
            "credentials are set both directly in [wecom] and in [wecom.accounts.*]; use one shape",
        ));
    }

    for id in wecom.accounts.keys() {
        if !is_valid_account_id(id) {
            errors.push(ConfigDiagnostic::validation(
                format!("wecom.accounts.{id}"),
                "account ids must be 1-64 characters of [A-Za-z0-9_-]",
            ));
        }
    }

    if let Some(default) = &wecom.default_account {
        if !wecom.is_multi_account() {
            errors.push(ConfigDiagnostic::validation(
                "wecom.default_account",
                "only applies when [wecom.accounts.*] tables are configured",
            ));
        } else if !wecom.accounts.contains_key(default) {
            errors.push(ConfigDiagnostic::validation(
                "wecom.default_account",
                format!("`{default}` is not one of the configured accounts"),
            ));
        }
    }
}
