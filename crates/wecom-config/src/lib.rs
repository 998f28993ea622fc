// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the WeCom gateway.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, `WECOM_*` environment variable overrides, and
//! miette diagnostics with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use wecom_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("listening on {}:{}", config.server.host, config.server.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{render_diagnostics, ConfigDiagnostic};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AccountConfig, DispatchConfig, GatewayConfig, InboundConfig, ServerConfig, ServiceConfig,
    TokenConfig, WecomConfig,
};

/// Load configuration from the XDG hierarchy and validate it.
pub fn load_and_validate() -> Result<GatewayConfig, Vec<ConfigDiagnostic>> {
    finish(loader::load_config(), collect_toml_sources)
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<GatewayConfig, Vec<ConfigDiagnostic>> {
    finish(loader::load_config_from_path(path), || {
        std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<GatewayConfig, Vec<ConfigDiagnostic>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

fn finish(
    loaded: Result<GatewayConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<GatewayConfig, Vec<ConfigDiagnostic>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            tracing::debug!(
                accounts = config.wecom.accounts.len(),
                flat = config.wecom.has_flat_fields(),
                "configuration loaded"
            );
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_diagnostics(err, &sources())),
    }
}

/// Collect TOML source file contents for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::env::current_dir()
        .map(|d| d.join(loader::CONFIG_FILE_NAME))
        .unwrap_or_else(|_| loader::CONFIG_FILE_NAME.into())];
    candidates.extend(loader::user_config_path());
    candidates.push(loader::SYSTEM_CONFIG_PATH.into());

    candidates
        .into_iter()
        .filter_map(|path| {
            std::fs::read_to_string(&path)
                .ok()
                .map(|content| (path.display().to_string(), content))
        })
        .collect()
}
