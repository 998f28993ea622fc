// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account resolution.
//!
//! Accounts are resolved once, at startup, from either the flat `[wecom]`
//! shape (always the `default` account) or `[wecom.accounts.<id>]` tables.
//! A bad callback key rejects the account here rather than at first use.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use wecom_config::model::{AccountConfig, WecomConfig};
use wecom_core::error::ConfigError;
use wecom_core::types::{AccountId, DEFAULT_ACCOUNT};

use crate::crypto::CallbackKey;

/// One fully resolved Platform account. Immutable for the process lifetime.
#[derive(Debug)]
pub struct Account {
    pub id: AccountId,
    pub corp_id: String,
    pub agent_id: u64,
    pub proxy: Option<String>,
    corp_secret: SecretString,
    callback_token: SecretString,
    key: CallbackKey,
}

impl Account {
    pub fn corp_secret(&self) -> &str {
        self.corp_secret.expose_secret()
    }

    pub fn callback_token(&self) -> &str {
        self.callback_token.expose_secret()
    }

    pub fn callback_key(&self) -> &CallbackKey {
        &self.key
    }

    /// Secret values to scrub from log output.
    pub fn secret_values(&self) -> Vec<String> {
        vec![
            self.corp_secret().to_string(),
            self.callback_token().to_string(),
        ]
    }
}

/// Returns the id used when a caller does not name an account.
pub fn default_account_id(config: &WecomConfig) -> String {
    if config.is_multi_account() {
        config
            .default_account
            .clone()
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string())
    } else {
        DEFAULT_ACCOUNT.to_string()
    }
}

/// Lists configured account ids.
///
/// The flat shape lists `default` only once the fields needed for outbound
/// calls (`corp_id`, `corp_secret`, `agent_id`) are present.
pub fn list_account_ids(config: &WecomConfig) -> BTreeSet<String> {
    if config.is_multi_account() {
        return config.accounts.keys().cloned().collect();
    }
    let flat_ready = config.corp_id.as_deref().is_some_and(|v| !v.trim().is_empty())
        && config.corp_secret.as_deref().is_some_and(|v| !v.trim().is_empty())
        && config.agent_id.is_some();
    if flat_ready {
        BTreeSet::from([DEFAULT_ACCOUNT.to_string()])
    } else {
        BTreeSet::new()
    }
}

/// Resolves one account, or the default one when `id` is `None`.
pub fn resolve_account(config: &WecomConfig, id: Option<&str>) -> Result<Account, ConfigError> {
    let id = id.map_or_else(|| default_account_id(config), str::to_string);

    let entry = if config.is_multi_account() {
        config
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownAccount(id.clone()))?
    } else if id == DEFAULT_ACCOUNT {
        config.flat_account()
    } else {
        return Err(ConfigError::UnknownAccount(id));
    };

    build_account(id, &entry)
}

fn build_account(id: String, entry: &AccountConfig) -> Result<Account, ConfigError> {
    let required = |field: &'static str, value: &Option<String>| -> Result<String, ConfigError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingCredential {
                account: id.clone(),
                field,
            })
    };

    let corp_id = required("corp_id", &entry.corp_id)?;
    let corp_secret = required("corp_secret", &entry.corp_secret)?;
    let agent_id = entry.agent_id.ok_or_else(|| ConfigError::MissingCredential {
        account: id.clone(),
        field: "agent_id",
    })?;
    let callback_token = required("callback_token", &entry.callback_token)?;
    let encoded_key = required("encoding_aes_key", &entry.encoding_aes_key)?;
    let key = CallbackKey::from_encoding_aes_key(&encoded_key).map_err(|reason| {
        ConfigError::InvalidKey {
            account: id.clone(),
            reason,
        }
    })?;
    let proxy = entry
        .proxy
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    Ok(Account {
        id: AccountId(id),
        corp_id,
        agent_id,
        proxy,
        corp_secret: SecretString::from(corp_secret),
        callback_token: SecretString::from(callback_token),
        key,
    })
}

/// Immutable map of every configured account.
#[derive(Debug)]
pub struct AccountRegistry {
    accounts: HashMap<AccountId, Arc<Account>>,
    default_id: AccountId,
}

impl AccountRegistry {
    /// Resolves every listed account. Fails on the first invalid one.
    pub fn from_config(config: &WecomConfig) -> Result<Self, ConfigError> {
        let ids = list_account_ids(config);
        if ids.is_empty() {
            // Surfaces the precise missing field of the flat shape.
            resolve_account(config, None)?;
        }

        let mut accounts = HashMap::with_capacity(ids.len());
        for id in ids {
            let account = resolve_account(config, Some(&id))?;
            tracing::debug!(account = %account.id, agent_id = account.agent_id, "account resolved");
            accounts.insert(account.id.clone(), Arc::new(account));
        }

        Ok(Self {
            accounts,
            default_id: AccountId(default_account_id(config)),
        })
    }

    /// Builds a registry from already resolved accounts.
    pub fn from_accounts(accounts: Vec<Account>, default_id: AccountId) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (a.id.clone(), Arc::new(a)))
                .collect(),
            default_id,
        }
    }

    pub fn get(&self, id: &AccountId) -> Result<Arc<Account>, ConfigError> {
        self.accounts
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownAccount(id.to_string()))
    }

    /// Looks up `id`, or the default account when `None`.
    pub fn resolve(&self, id: Option<&AccountId>) -> Result<Arc<Account>, ConfigError> {
        self.get(id.unwrap_or(&self.default_id))
    }

    pub fn default_id(&self) -> &AccountId {
        &self.default_id
    }

    /// Account ids in sorted order.
    pub fn ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.accounts.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Arc<Account>> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";

    fn full_entry(corp: &str) -> AccountConfig {
        AccountConfig {
            corp_id: Some(corp.into()),
            corp_secret: Some("secret".into()),
            agent_id: Some(1000002),
            callback_token: Some("token".into()),
            encoding_aes_key: Some(KEY.into()),
            proxy: None,
        }
    }

    fn flat_config() -> WecomConfig {
        let entry = full_entry("ww-flat");
        WecomConfig {
            corp_id: entry.corp_id,
            corp_secret: entry.corp_secret,
            agent_id: entry.agent_id,
            callback_token: entry.callback_token,
            encoding_aes_key: entry.encoding_aes_key,
            ..Default::default()
        }
    }

    fn multi_config() -> WecomConfig {
        let mut config = WecomConfig::default();
        config.accounts.insert("sales".into(), full_entry("ww-sales"));
        config.accounts.insert("ops".into(), full_entry("ww-ops"));
        config
    }

    #[test]
    fn flat_shape_resolves_only_as_default() {
        let config = flat_config();
        let account = resolve_account(&config, None).unwrap();
        assert_eq!(account.id.as_str(), "default");
        assert_eq!(account.corp_id, "ww-flat");
        assert!(resolve_account(&config, Some("default")).is_ok());
        assert_eq!(
            resolve_account(&config, Some("sales")).unwrap_err(),
            ConfigError::UnknownAccount("sales".into())
        );
    }

    #[test]
    fn multi_shape_uses_default_account_setting() {
        let mut config = multi_config();
        assert_eq!(
            resolve_account(&config, None).unwrap_err(),
            ConfigError::UnknownAccount("default".into())
        );

        config.default_account = Some("ops".into());
        assert_eq!(resolve_account(&config, None).unwrap().corp_id, "ww-ops");
        assert_eq!(resolve_account(&config, Some("sales")).unwrap().corp_id, "ww-sales");
    }

    #[test]
    fn missing_or_empty_credentials_are_named() {
        let mut config = flat_config();
        config.corp_secret = Some("  ".into());
        assert_eq!(
            resolve_account(&config, None).unwrap_err(),
            ConfigError::MissingCredential {
                account: "default".into(),
                field: "corp_secret"
            }
        );

        let mut config = multi_config();
        if let Some(entry) = config.accounts.get_mut("sales") {
            entry.agent_id = None;
        }
        assert_eq!(
            resolve_account(&config, Some("sales")).unwrap_err(),
            ConfigError::MissingCredential {
                account: "sales".into(),
                field: "agent_id"
            }
        );
    }

    #[test]
    fn invalid_key_rejects_account_at_resolution() {
        let mut config = flat_config();
        config.encoding_aes_key = Some("too-short".into());
        assert!(matches!(
            resolve_account(&config, None),
            Err(ConfigError::InvalidKey { .. })
        ));
    }

    #[test]
    fn list_ids_per_shape() {
        assert_eq!(
            list_account_ids(&flat_config()),
            BTreeSet::from(["default".to_string()])
        );
        assert!(list_account_ids(&WecomConfig::default()).is_empty());

        let partial = WecomConfig {
            corp_id: Some("ww".into()),
            ..Default::default()
        };
        assert!(list_account_ids(&partial).is_empty());

        assert_eq!(
            list_account_ids(&multi_config()),
            BTreeSet::from(["ops".to_string(), "sales".to_string()])
        );
    }

    #[test]
    fn registry_resolves_everything_up_front() {
        let mut config = multi_config();
        config.default_account = Some("sales".into());
        let registry = AccountRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.ids(),
            vec![AccountId::from("ops"), AccountId::from("sales")]
        );
        assert_eq!(registry.resolve(None).unwrap().corp_id, "ww-sales");
        assert!(matches!(
            registry.get(&AccountId::from("hr")),
            Err(ConfigError::UnknownAccount(_))
        ));
    }

    #[test]
    fn registry_fails_on_first_bad_account() {
        let mut config = multi_config();
        if let Some(entry) = config.accounts.get_mut("ops") {
            entry.encoding_aes_key = Some("x".repeat(43));
        }
        // 43 'x' characters are valid base64, so decoding succeeds.
        assert!(AccountRegistry::from_config(&config).is_ok());

        if let Some(entry) = config.accounts.get_mut("ops") {
            entry.callback_token = None;
        }
        assert_eq!(
            AccountRegistry::from_config(&config).unwrap_err(),
            ConfigError::MissingCredential {
                account: "ops".into(),
                field: "callback_token"
            }
        );
    }

    #[test]
    fn empty_flat_config_reports_missing_corp_id() {
        assert_eq!(
            AccountRegistry::from_config(&WecomConfig::default()).unwrap_err(),
            ConfigError::MissingCredential {
                account: "default".into(),
                field: "corp_id"
            }
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let account = resolve_account(&flat_config(), None).unwrap();
        let debug = format!("{account:?}");
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains(KEY));
        assert_eq!(account.corp_secret(), "secret");
    }
}
