// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; nothing is exported unless the host installs
//! a recorder.

use metrics::{describe_counter, describe_histogram};

/// Register metric descriptions. Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(
        "wecom_inbound_callbacks_total",
        "Webhook callbacks by account and outcome"
    );
    describe_counter!(
        "wecom_outbound_calls_total",
        "Platform send and upload calls by operation and outcome"
    );
    describe_counter!(
        "wecom_token_retries_total",
        "Calls retried after the Platform rejected a cached access token"
    );
    describe_histogram!(
        "wecom_outbound_latency_seconds",
        "Latency of Platform send and upload calls"
    );
}

/// Record one webhook callback outcome.
pub fn record_inbound(account: &str, outcome: &'static str) {
    metrics::counter!(
        "wecom_inbound_callbacks_total",
        "account" => account.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record one Platform call.
pub fn record_outbound(op: &'static str, outcome: &'static str, seconds: f64) {
    metrics::counter!("wecom_outbound_calls_total", "op" => op, "outcome" => outcome).increment(1);
    metrics::histogram!("wecom_outbound_latency_seconds", "op" => op).record(seconds);
}

/// Record a credential retry.
pub fn record_token_retry(account: &str) {
    metrics::counter!("wecom_token_retries_total", "account" => account.to_string()).increment(1);
}
