// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wecom-gateway check`: resolves every account and prints where the
//! Platform should deliver its callbacks.

use wecom_channel::AccountRegistry;
use wecom_config::model::GatewayConfig;
use wecom_core::error::WecomError;

/// One line of `check` output per account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub id: String,
    pub corp_id: String,
    pub agent_id: u64,
    pub is_default: bool,
    pub callback_url: String,
}

/// Callback URL for an account. The default account answers on the bare path
/// as well; named accounts are listed under their own sub-path.
fn callback_url(config: &GatewayConfig, account: &str, is_default: bool) -> String {
    let base = format!(
        "http://{}:{}{}",
        config.server.host, config.server.port, config.server.callback_path
    );
    if is_default && !config.wecom.is_multi_account() {
        base
    } else {
        format!("{base}/{account}")
    }
}

pub fn summarize(config: &GatewayConfig) -> Result<Vec<AccountSummary>, WecomError> {
    let registry = AccountRegistry::from_config(&config.wecom)?;
    let default_id = registry.default_id().clone();

    Ok(registry
        .ids()
        .into_iter()
        .filter_map(|id| registry.get(&id).ok())
        .map(|account| {
            let is_default = account.id == default_id;
            AccountSummary {
                id: account.id.to_string(),
                corp_id: account.corp_id.clone(),
                agent_id: account.agent_id,
                is_default,
                callback_url: callback_url(config, account.id.as_str(), is_default),
            }
        })
        .collect())
}

pub fn run_check(config: &GatewayConfig) -> Result<(), WecomError> {
    let accounts = summarize(config)?;
    println!("configuration OK: {} account(s)", accounts.len());
    for account in &accounts {
        let marker = if account.is_default { " (default)" } else { "" };
        println!(
            "  {}{marker}: corp_id={} agent_id={} callback={}",
            account.id, account.corp_id, account.agent_id, account.callback_url
        );
    }
    Ok(())
}
