// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform REST API boundary.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{AccountId, MediaUpload, OutboundJob, TokenGrant};

/// Raw calls against the Platform's REST API.
///
/// Implementations perform exactly one request per call and report a nonzero
/// `errcode` as [`TransportError::Platform`]. Retry, pacing, and token caching
/// live above this trait.
#[async_trait]
pub trait PlatformApi: Send + Sync + 'static {
    /// Exchanges corp credentials for an access token.
    async fn fetch_token(
        &self,
        account: &AccountId,
        corp_id: &str,
        corp_secret: &str,
    ) -> Result<TokenGrant, TransportError>;

    /// Sends one message. Returns the Platform `msgid` when one is reported.
    async fn send_message(
        &self,
        account: &AccountId,
        access_token: &str,
        agent_id: u64,
        job: &OutboundJob,
    ) -> Result<Option<String>, TransportError>;

    /// Uploads temporary media and returns its `media_id`.
    async fn upload_media(
        &self,
        account: &AccountId,
        access_token: &str,
        upload: &MediaUpload,
    ) -> Result<String, TransportError>;
}
