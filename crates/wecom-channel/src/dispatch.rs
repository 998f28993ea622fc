// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound dispatch: bounded concurrency, paced call starts, and a single
//! retry after a credential rejection.
//!
//! Every call goes permit, token, pace, network. The permit is an owned
//! semaphore permit dropped on every exit path. Pacing reserves the next
//! start slot under a short lock, then sleeps outside it.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use wecom_config::model::DispatchConfig;
use wecom_core::error::{SendError, TransportError};
use wecom_core::traits::PlatformApi;
use wecom_core::types::{AccountId, MediaUpload, MessageId, OutboundJob, OutboundPayload, SendReceipt};

use crate::account::{Account, AccountRegistry};
use crate::metrics;
use crate::token::TokenManager;

/// `errcode` values meaning the access token was rejected.
const CREDENTIAL_ERRCODES: [i64; 4] = [40014, 42001, 40001, 40082];

/// `errcode` values meaning the call was throttled.
const RATE_LIMIT_ERRCODES: [i64; 3] = [45009, 45033, 45011];

/// `errcode` the Platform returns when it is busy.
const SYSTEM_BUSY: i64 = -1;

/// Concurrency, pacing, and size limits for outbound calls.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub max_in_flight: usize,
    pub min_interval: Duration,
    pub send_timeout: Duration,
    pub upload_timeout: Duration,
    pub text_byte_limit: usize,
}

impl From<&DispatchConfig> for DispatchPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_in_flight: config.max_in_flight,
            min_interval: config.min_interval(),
            send_timeout: config.send_timeout(),
            upload_timeout: config.upload_timeout(),
            text_byte_limit: config.text_byte_limit,
        }
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

/// Hands out call start times at least `interval` apart.
struct Pacer {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = {
            let mut next = self
                .next_slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            let slot = next.filter(|at| *at > now).unwrap_or(now);
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

/// Sends outbound jobs and media uploads to the Platform.
pub struct Dispatcher {
    registry: Arc<AccountRegistry>,
    tokens: Arc<TokenManager>,
    api: Arc<dyn PlatformApi>,
    permits: Arc<Semaphore>,
    pacer: Pacer,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<AccountRegistry>,
        tokens: Arc<TokenManager>,
        api: Arc<dyn PlatformApi>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            registry,
            tokens,
            api,
            permits: Arc::new(Semaphore::new(policy.max_in_flight.max(1))),
            pacer: Pacer::new(policy.min_interval),
            policy,
        }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Sends one job. Text must already fit the byte limit.
    pub async fn send(&self, job: OutboundJob) -> Result<SendReceipt, SendError> {
        if job.recipient.is_empty() {
            return Err(no_recipients());
        }
        if let OutboundPayload::Text(text) = &job.payload
            && text.len() > self.policy.text_byte_limit
        {
            return Err(SendError::Rejected {
                code: None,
                message: format!(
                    "text of {} bytes exceeds the {} byte limit",
                    text.len(),
                    self.policy.text_byte_limit
                ),
            });
        }

        let account = self.registry.get(&job.account)?;
        let api = Arc::clone(&self.api);
        let job = &job;
        let account_ref = &account;

        let (msg_id, attempts) = self
            .run("send", account_ref, self.policy.send_timeout, |token| {
                let api = Arc::clone(&api);
                async move {
                    api.send_message(&account_ref.id, &token, account_ref.agent_id, job)
                        .await
                }
            })
            .await?;

        debug!(
            account = %account.id,
            msgtype = job.payload.msg_type(),
            attempts,
            waited_ms = job.enqueued_at.elapsed().as_millis() as u64,
            "outbound message sent"
        );
        Ok(SendReceipt {
            msg_id: msg_id.map(MessageId),
            attempts,
        })
    }

    /// Uploads temporary media and returns its `media_id`.
    pub async fn upload(&self, account: &AccountId, upload: MediaUpload) -> Result<String, SendError> {
        let account = self.registry.get(account)?;
        let api = Arc::clone(&self.api);
        let upload = &upload;
        let account_ref = &account;

        let (media_id, _) = self
            .run("upload", account_ref, self.policy.upload_timeout, |token| {
                let api = Arc::clone(&api);
                async move { api.upload_media(&account_ref.id, &token, upload).await }
            })
            .await?;

        info!(account = %account.id, kind = %upload.kind, media_id = %media_id, "media uploaded");
        Ok(media_id)
    }

    /// Runs one Platform call under the dispatch policy. Returns the call's
    /// result and the number of network attempts made (1 or 2).
    async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        account: &Account,
        timeout: Duration,
        mut call: F,
    ) -> Result<(T, u8), SendError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| SendError::Transient("dispatcher is shut down".into()))?;

        let mut token = self.tokens.get_token(account).await?;
        let mut attempts = 0u8;

        loop {
            attempts += 1;
            self.pacer.wait().await;

            let started = Instant::now();
            let outcome = tokio::time::timeout(timeout, call(token.clone()))
                .await
                .unwrap_or(Err(TransportError::Timeout(timeout)));
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                Ok(value) => {
                    metrics::record_outbound(op, "ok", elapsed);
                    return Ok((value, attempts));
                }
                Err(TransportError::Platform { code, .. })
                    if attempts == 1 && CREDENTIAL_ERRCODES.contains(&code) =>
                {
                    warn!(account = %account.id, op, code, "access token rejected, refreshing once");
                    metrics::record_token_retry(account.id.as_str());
                    self.tokens.invalidate(&account.id, &token).await;
                    token = self.tokens.get_token(account).await?;
                }
                Err(e) => {
                    let err = classify(e);
                    metrics::record_outbound(op, outcome_label(&err), elapsed);
                    warn!(account = %account.id, op, attempts, error = %err, "outbound call failed");
                    return Err(err);
                }
            }
        }
    }
}

pub(crate) fn no_recipients() -> SendError {
    SendError::Rejected {
        code: None,
        message: "recipient list is empty".into(),
    }
}

/// Maps a transport failure to the caller-facing error.
pub fn classify(err: TransportError) -> SendError {
    match err {
        TransportError::Platform { code, .. } if RATE_LIMIT_ERRCODES.contains(&code) => {
            SendError::RateLimited { code }
        }
        TransportError::Platform { code, message } if code == SYSTEM_BUSY => {
            SendError::Transient(format!("platform busy ({code}): {message}"))
        }
        TransportError::Platform { code, message } => SendError::Rejected {
            code: Some(code),
            message,
        },
        TransportError::Network(message) | TransportError::InvalidResponse(message) => {
            SendError::Transient(message)
        }
        TransportError::Timeout(after) => {
            SendError::Transient(format!("no response within {after:?}"))
        }
    }
}

fn outcome_label(err: &SendError) -> &'static str {
    match err {
        SendError::Rejected { .. } => "rejected",
        SendError::RateLimited { .. } => "rate_limited",
        SendError::Transient(_) => "transient",
        SendError::Credential(_) => "credential",
        SendError::Account(_) => "account",
    }
}
