// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./wecom-gateway.toml` >
//! `~/.config/wecom-gateway/wecom-gateway.toml` >
//! `/etc/wecom-gateway/wecom-gateway.toml`, with environment variable
//! overrides via the `WECOM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::GatewayConfig;

/// File name looked up in every layer of the hierarchy.
pub const CONFIG_FILE_NAME: &str = "wecom-gateway.toml";

/// System-wide configuration path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/wecom-gateway/wecom-gateway.toml";

/// Sections reachable through `WECOM_<SECTION>_<KEY>`. Anything else under the
/// prefix is a field of `[wecom]`, which keeps `WECOM_CORP_ID` and friends
/// working as in a plain environment-only deployment.
const ENV_SECTIONS: &[&str] = &["service", "server", "token", "dispatch", "inbound"];

/// Path of the per-user configuration file, if a config dir exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wecom-gateway").join(CONFIG_FILE_NAME))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wecom-gateway/wecom-gateway.toml` (system-wide)
/// 3. `~/.config/wecom-gateway/wecom-gateway.toml` (user XDG config)
/// 4. `./wecom-gateway.toml` (local directory)
/// 5. `WECOM_*` environment variables
pub fn load_config() -> Result<GatewayConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<GatewayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(GatewayConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<GatewayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(GatewayConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(GatewayConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(CONFIG_FILE_NAME))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env key to a dotted config path.
///
/// Uses an explicit mapping instead of `Env::split("_")` because field names
/// contain underscores: `WECOM_DISPATCH_MAX_IN_FLIGHT` must become
/// `dispatch.max_in_flight`, and `WECOM_CORP_ID` must become `wecom.corp_id`.
pub fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    format!("wecom.{key}")
}

fn env_provider() -> Env {
    Env::prefixed("WECOM_").map(|key| map_env_key(key.as_str()).into())
}
