// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access-token cache with single-flight refresh.
//!
//! Each account has a slot guarded by an async mutex. A caller that finds no
//! fresh token either attaches to the refresh already in flight or starts
//! one. The refresh runs as its own task, writes its outcome back into the
//! slot, and clears the in-flight handle itself, so dropping every waiter
//! never leaves the slot stuck.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use wecom_core::error::TokenError;
use wecom_core::traits::PlatformApi;
use wecom_core::types::AccountId;

use crate::account::Account;

type SharedRefresh = Shared<BoxFuture<'static, Result<CachedToken, TokenError>>>;

#[derive(Clone)]
struct CachedToken {
    value: String,
    /// Declared expiry minus the safety margin.
    stale_at: Instant,
}

#[derive(Default)]
struct TokenSlot {
    cached: Option<CachedToken>,
    inflight: Option<SharedRefresh>,
}

/// Per-account access-token cache.
pub struct TokenManager {
    api: Arc<dyn PlatformApi>,
    slots: DashMap<AccountId, Arc<Mutex<TokenSlot>>>,
    safety_margin: Duration,
    fetch_timeout: Duration,
}

impl TokenManager {
    pub fn new(api: Arc<dyn PlatformApi>, safety_margin: Duration, fetch_timeout: Duration) -> Self {
        Self {
            api,
            slots: DashMap::new(),
            safety_margin,
            fetch_timeout,
        }
    }

    /// Returns a token that is valid for at least the safety margin.
    ///
    /// Concurrent callers for the same account share one credential fetch
    /// and its outcome, including its failure.
    pub async fn get_token(&self, account: &Account) -> Result<String, TokenError> {
        let slot = self.slot(&account.id);

        let refresh = {
            let mut guard = slot.lock().await;
            if let Some(cached) = &guard.cached
                && Instant::now() < cached.stale_at
            {
                return Ok(cached.value.clone());
            }
            match guard.inflight.clone() {
                Some(inflight) => inflight,
                None => {
                    let refresh = self.spawn_refresh(account, Arc::clone(&slot));
                    guard.inflight = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await.map(|token| token.value)
    }

    /// Drops the cached token if it is still `rejected`. A token refreshed by
    /// another caller in the meantime is kept.
    pub async fn invalidate(&self, account: &AccountId, rejected: &str) {
        let slot = self.slot(account);
        let mut guard = slot.lock().await;
        if guard
            .cached
            .as_ref()
            .is_some_and(|cached| cached.value == rejected)
        {
            debug!(account = %account, "cached access token invalidated");
            guard.cached = None;
        }
    }

    fn slot(&self, account: &AccountId) -> Arc<Mutex<TokenSlot>> {
        self.slots
            .entry(account.clone())
            .or_default()
            .value()
            .clone()
    }

    fn spawn_refresh(&self, account: &Account, slot: Arc<Mutex<TokenSlot>>) -> SharedRefresh {
        let api = Arc::clone(&self.api);
        let id = account.id.clone();
        let corp_id = account.corp_id.clone();
        let corp_secret = account.corp_secret().to_string();
        let margin = self.safety_margin;
        let timeout = self.fetch_timeout;

        debug!(account = %id, "refreshing access token");
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let id = task_id;
            let fetched =
                tokio::time::timeout(timeout, api.fetch_token(&id, &corp_id, &corp_secret)).await;
            let result = match fetched {
                Ok(Ok(grant)) => {
                    if grant.expires_in <= margin {
                        warn!(
                            account = %id,
                            expires_in = grant.expires_in.as_secs(),
                            "token lifetime is within the safety margin"
                        );
                    }
                    info!(account = %id, expires_in = grant.expires_in.as_secs(), "access token refreshed");
                    Ok(CachedToken {
                        value: grant.access_token,
                        stale_at: Instant::now() + grant.expires_in.saturating_sub(margin),
                    })
                }
                Ok(Err(e)) => Err(TokenError::RefreshFailed {
                    account: id.to_string(),
                    reason: e.to_string(),
                }),
                Err(_) => Err(TokenError::RefreshFailed {
                    account: id.to_string(),
                    reason: format!("timed out after {timeout:?}"),
                }),
            };

            let mut guard = slot.lock().await;
            guard.inflight = None;
            match &result {
                Ok(token) => guard.cached = Some(token.clone()),
                Err(e) => warn!(error = %e, "access token refresh failed"),
            }
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(TokenError::RefreshFailed {
                    account: id.to_string(),
                    reason: format!("refresh task failed: {e}"),
                })
            })
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountRegistry;
    use wecom_config::model::WecomConfig;
    use wecom_core::error::TransportError;
    use wecom_core::types::TokenGrant;
    use wecom_test_utils::MockPlatform;

    fn account() -> Arc<Account> {
        let config = WecomConfig {
            corp_id: Some("ww-test".into()),
            corp_secret: Some("secret".into()),
            agent_id: Some(1000002),
            callback_token: Some("cb".into()),
            encoding_aes_key: Some("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG".into()),
            ..Default::default()
        };
        AccountRegistry::from_config(&config)
            .unwrap()
            .resolve(None)
            .unwrap()
    }

    fn manager(mock: &Arc<MockPlatform>) -> Arc<TokenManager> {
        Arc::new(TokenManager::new(
            mock.clone(),
            Duration::from_secs(300),
            Duration::from_secs(10),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn fifty_concurrent_callers_share_one_fetch() {
        let mock = Arc::new(MockPlatform::new().with_token_latency(Duration::from_millis(200)));
        let tokens = manager(&mock);
        let account = account();

        let calls = (0..50).map(|_| {
            let tokens = tokens.clone();
            let account = account.clone();
            tokio::spawn(async move { tokens.get_token(&account).await })
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(mock.token_calls(), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap(), "token-1");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cached_token_is_reused_until_margin() {
        let mock = Arc::new(MockPlatform::new());
        mock.push_token_result(Ok(TokenGrant {
            access_token: "first".into(),
            expires_in: Duration::from_secs(600),
        }));
        let tokens = manager(&mock);
        let account = account();

        assert_eq!(tokens.get_token(&account).await.unwrap(), "first");
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(tokens.get_token(&account).await.unwrap(), "first");
        assert_eq!(mock.token_calls(), 1);

        // 600s lifetime minus 300s margin: stale from 300s on.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tokens.get_token(&account).await.unwrap(), "token-2");
        assert_eq!(mock.token_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_shared_and_not_retried_internally() {
        let mock = Arc::new(MockPlatform::new().with_token_latency(Duration::from_millis(50)));
        mock.push_token_result(Err(TransportError::Platform {
            code: 40013,
            message: "invalid corpid".into(),
        }));
        let tokens = manager(&mock);
        let account = account();

        let calls = (0..5).map(|_| {
            let tokens = tokens.clone();
            let account = account.clone();
            tokio::spawn(async move { tokens.get_token(&account).await })
        });
        for result in futures::future::join_all(calls).await {
            let err = result.unwrap().unwrap_err();
            assert!(err.to_string().contains("40013"), "{err}");
        }
        assert_eq!(mock.token_calls(), 1);

        // The next caller starts a fresh fetch.
        assert_eq!(tokens.get_token(&account).await.unwrap(), "token-2");
        assert_eq!(mock.token_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_times_out_and_releases_slot() {
        let mock = Arc::new(MockPlatform::new());
        mock.set_token_fetch_hangs(true);
        let tokens = manager(&mock);
        let account = account();

        let err = tokens.get_token(&account).await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");

        mock.set_token_fetch_hangs(false);
        assert_eq!(tokens.get_token(&account).await.unwrap(), "token-2");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_does_not_strand_refresh() {
        let mock = Arc::new(MockPlatform::new().with_token_latency(Duration::from_secs(1)));
        let tokens = manager(&mock);
        let account = account();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), tokens.get_token(&account)).await;
        assert!(cancelled.is_err());

        // The spawned refresh still completes and fills the cache.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tokens.get_token(&account).await.unwrap(), "token-1");
        assert_eq!(mock.token_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_only_drops_the_rejected_token() {
        let mock = Arc::new(MockPlatform::new());
        let tokens = manager(&mock);
        let account = account();

        let first = tokens.get_token(&account).await.unwrap();
        tokens.invalidate(&account.id, "some-older-token").await;
        assert_eq!(tokens.get_token(&account).await.unwrap(), first);

        tokens.invalidate(&account.id, &first).await;
        assert_eq!(tokens.get_token(&account).await.unwrap(), "token-2");
        assert_eq!(mock.token_calls(), 2);
    }
}
