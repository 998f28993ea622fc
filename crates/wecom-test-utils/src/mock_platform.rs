// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock Platform API for deterministic testing.
//!
//! Results are popped from per-operation FIFO queues. When a queue is empty
//! the call succeeds with a generated value (`token-N`, `msg-N`, `media-N`).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use wecom_core::error::TransportError;
use wecom_core::traits::PlatformApi;
use wecom_core::types::{AccountId, MediaUpload, OutboundJob, TokenGrant};

/// A send call as observed by the mock.
#[derive(Debug, Clone)]
pub struct SentJob {
    pub account: AccountId,
    pub access_token: String,
    pub agent_id: u64,
    pub job: OutboundJob,
}

/// Scripted [`PlatformApi`] that records every call.
pub struct MockPlatform {
    token_results: Mutex<VecDeque<Result<TokenGrant, TransportError>>>,
    send_results: Mutex<VecDeque<Result<Option<String>, TransportError>>>,
    upload_results: Mutex<VecDeque<Result<String, TransportError>>>,
    token_latency: Duration,
    call_latency: Duration,
    hang_token_fetch: AtomicBool,
    token_calls: AtomicUsize,
    send_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    call_starts: Mutex<Vec<Instant>>,
    sent: Mutex<Vec<SentJob>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            token_results: Mutex::new(VecDeque::new()),
            send_results: Mutex::new(VecDeque::new()),
            upload_results: Mutex::new(VecDeque::new()),
            token_latency: Duration::ZERO,
            call_latency: Duration::ZERO,
            hang_token_fetch: AtomicBool::new(false),
            token_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            call_starts: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Every token fetch sleeps this long before answering.
    pub fn with_token_latency(mut self, latency: Duration) -> Self {
        self.token_latency = latency;
        self
    }

    /// Every send and upload sleeps this long before answering.
    pub fn with_call_latency(mut self, latency: Duration) -> Self {
        self.call_latency = latency;
        self
    }

    /// Token fetches never complete until this is switched off again.
    pub fn set_token_fetch_hangs(&self, hang: bool) {
        self.hang_token_fetch.store(hang, Ordering::SeqCst);
    }

    pub fn push_token_result(&self, result: Result<TokenGrant, TransportError>) {
        lock(&self.token_results).push_back(result);
    }

    pub fn push_send_result(&self, result: Result<Option<String>, TransportError>) {
        lock(&self.send_results).push_back(result);
    }

    pub fn push_upload_result(&self, result: Result<String, TransportError>) {
        lock(&self.upload_results).push_back(result);
    }

    /// Queues a Platform `errcode` failure for the next send.
    pub fn fail_next_send(&self, code: i64) {
        self.push_send_result(Err(TransportError::Platform {
            code,
            message: format!("mock errcode {code}"),
        }));
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Highest number of sends and uploads observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Start instants of every send and upload, in call order.
    pub fn call_starts(&self) -> Vec<Instant> {
        lock(&self.call_starts).clone()
    }

    pub fn sent(&self) -> Vec<SentJob> {
        lock(&self.sent).clone()
    }

    async fn enter_call(&self) -> InFlightGuard<'_> {
        lock(&self.call_starts).push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.call_latency.is_zero() {
            tokio::time::sleep(self.call_latency).await;
        }
        InFlightGuard(&self.in_flight)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PlatformApi for MockPlatform {
    async fn fetch_token(
        &self,
        account: &AccountId,
        _corp_id: &str,
        _corp_secret: &str,
    ) -> Result<TokenGrant, TransportError> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(account = %account, call = n, "mock token fetch");
        if !self.token_latency.is_zero() {
            tokio::time::sleep(self.token_latency).await;
        }
        while self.hang_token_fetch.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        lock(&self.token_results).pop_front().unwrap_or_else(|| {
            Ok(TokenGrant {
                access_token: format!("token-{n}"),
                expires_in: Duration::from_secs(7200),
            })
        })
    }

    async fn send_message(
        &self,
        account: &AccountId,
        access_token: &str,
        agent_id: u64,
        job: &OutboundJob,
    ) -> Result<Option<String>, TransportError> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.enter_call().await;
        lock(&self.sent).push(SentJob {
            account: account.clone(),
            access_token: access_token.to_string(),
            agent_id,
            job: job.clone(),
        });
        lock(&self.send_results)
            .pop_front()
            .unwrap_or_else(|| Ok(Some(format!("msg-{n}"))))
    }

    async fn upload_media(
        &self,
        _account: &AccountId,
        _access_token: &str,
        _upload: &MediaUpload,
    ) -> Result<String, TransportError> {
        let n = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.enter_call().await;
        lock(&self.upload_results)
            .pop_front()
            .unwrap_or_else(|| Ok(format!("media-{n}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wecom_core::types::Recipient;

    #[tokio::test]
    async fn generated_values_when_unscripted() {
        let mock = MockPlatform::new();
        let account = AccountId::default_account();
        let grant = mock.fetch_token(&account, "ww", "s").await.unwrap();
        assert_eq!(grant.access_token, "token-1");

        let job = OutboundJob::text(account.clone(), Recipient::All, "hi");
        let id = mock.send_message(&account, "token-1", 7, &job).await.unwrap();
        assert_eq!(id.as_deref(), Some("msg-1"));
        assert_eq!(mock.sent()[0].agent_id, 7);
        assert_eq!(mock.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn scripted_failures_are_returned_in_order() {
        let mock = MockPlatform::new();
        mock.fail_next_send(40014);
        let account = AccountId::default_account();
        let job = OutboundJob::text(account.clone(), Recipient::All, "hi");

        let first = mock.send_message(&account, "t", 1, &job).await;
        assert!(matches!(first, Err(TransportError::Platform { code: 40014, .. })));
        let second = mock.send_message(&account, "t", 1, &job).await;
        assert!(second.is_ok());
        assert_eq!(mock.send_calls(), 2);
    }
}
