// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WeCom channel adapter.
//!
//! Receives encrypted webhook callbacks from the Platform and relays outbound
//! messages through its REST API. Implements [`ChannelAdapter`]: decoded
//! inbound messages queue up for [`ChannelAdapter::receive`], and
//! [`ChannelAdapter::send`] splits long text into byte-bounded segments.

pub mod account;
pub mod api;
pub mod crypto;
pub mod decode;
pub mod dispatch;
pub mod media;
pub mod metrics;
pub mod segment;
pub mod token;
pub mod webhook;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wecom_config::model::GatewayConfig;
use wecom_core::error::{SendError, WecomError};
use wecom_core::traits::{ChannelAdapter, ConversationSink, PlatformApi, PluginAdapter};
use wecom_core::types::{
    AccountId, ChannelCapabilities, HealthStatus, InboundMessage, MediaKind, MediaUpload,
    MessageId, OutboundJob, OutboundMessage, OutboundPayload, Recipient,
};

pub use account::{Account, AccountRegistry};
pub use api::HttpPlatformApi;
pub use decode::MessageDecoder;
pub use dispatch::{DispatchPolicy, Dispatcher};
pub use token::TokenManager;
pub use webhook::{CallbackQuery, InboundGateway, WebhookError};

/// [`ConversationSink`] that feeds the channel's inbound queue.
///
/// Never waits for room: when the queue is full the message is refused, so
/// a stalled consumer cannot park hand-off tasks behind it.
struct QueueSink {
    tx: mpsc::Sender<InboundMessage>,
}

#[async_trait]
impl ConversationSink for QueueSink {
    async fn deliver(&self, message: InboundMessage) -> Result<(), WecomError> {
        self.tx.try_send(message).map_err(|e| {
            let message = match e {
                TrySendError::Full(_) => "inbound queue full",
                TrySendError::Closed(_) => "inbound queue closed",
            };
            WecomError::Channel {
                message: message.into(),
                source: None,
            }
        })
    }
}

/// Outcome of a media send: the uploaded id and the Platform message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSent {
    pub media_id: String,
    pub msg_id: Option<MessageId>,
}

/// WeCom channel adapter implementing [`ChannelAdapter`].
pub struct WecomChannel {
    config: GatewayConfig,
    registry: Arc<AccountRegistry>,
    dispatcher: Arc<Dispatcher>,
    gateway: Arc<InboundGateway>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    shutdown: CancellationToken,
    server: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl WecomChannel {
    /// Builds the adapter against the real Platform API.
    pub fn new(config: GatewayConfig) -> Result<Self, WecomError> {
        let registry = Arc::new(AccountRegistry::from_config(&config.wecom)?);
        let api = Arc::new(HttpPlatformApi::new(&config.wecom.api_base_url, &registry)?);
        Ok(Self::assemble(config, registry, api))
    }

    /// Builds the adapter against any [`PlatformApi`].
    pub fn with_api(config: GatewayConfig, api: Arc<dyn PlatformApi>) -> Result<Self, WecomError> {
        let registry = Arc::new(AccountRegistry::from_config(&config.wecom)?);
        Ok(Self::assemble(config, registry, api))
    }

    fn assemble(
        config: GatewayConfig,
        registry: Arc<AccountRegistry>,
        api: Arc<dyn PlatformApi>,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&api),
            config.token.safety_margin(),
            config.token.fetch_timeout(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            tokens,
            api,
            DispatchPolicy::from(&config.dispatch),
        ));

        let (tx, rx) = mpsc::channel(config.inbound.queue_capacity.max(1));
        let gateway = Arc::new(InboundGateway::new(
            Arc::clone(&registry),
            MessageDecoder::new(config.inbound.max_plaintext_bytes),
            Arc::new(QueueSink { tx }),
        ));

        info!(
            accounts = registry.len(),
            default_account = %registry.default_id(),
            "wecom channel ready"
        );

        Self {
            config,
            registry,
            dispatcher,
            gateway,
            inbound_rx: Mutex::new(rx),
            shutdown: CancellationToken::new(),
            server: None,
            local_addr: None,
        }
    }

    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The callback routes, for serving or embedding in a larger router.
    pub fn router(&self) -> Router {
        webhook::router(
            Arc::clone(&self.gateway),
            &self.config.server.callback_path,
            self.config.server.max_body_bytes,
        )
    }

    /// Address the callback server is bound to, once connected.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Token that stops the callback server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn account_id(&self, account: Option<&AccountId>) -> Result<AccountId, WecomError> {
        Ok(self.registry.resolve(account)?.id.clone())
    }

    /// Sends text, split into segments within the byte limit, one after the
    /// other. Returns the ids the Platform reported, in order.
    pub async fn send_text(
        &self,
        account: Option<&AccountId>,
        recipient: &Recipient,
        text: &str,
    ) -> Result<Vec<MessageId>, SendError> {
        let account = self.registry.resolve(account)?.id.clone();
        let limit = self.dispatcher.policy().text_byte_limit;
        let chunks = segment::segment(text, limit);
        if chunks.is_empty() {
            return Err(SendError::Rejected {
                code: None,
                message: "text is empty".into(),
            });
        }
        if chunks.len() > 1 {
            debug!(account = %account, segments = chunks.len(), bytes = text.len(), "text segmented");
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let job = OutboundJob::text(account.clone(), recipient.clone(), chunk);
            let receipt = self.dispatcher.send(job).await?;
            ids.extend(receipt.msg_id);
        }
        Ok(ids)
    }

    /// Uploads temporary media and returns its `media_id`.
    pub async fn upload_media(
        &self,
        account: Option<&AccountId>,
        upload: MediaUpload,
    ) -> Result<String, SendError> {
        let account = self.registry.resolve(account)?.id.clone();
        self.dispatcher.upload(&account, upload).await
    }

    /// Uploads a local file and sends it as a media message.
    pub async fn send_file(
        &self,
        account: Option<&AccountId>,
        recipient: &Recipient,
        kind: MediaKind,
        path: &Path,
    ) -> Result<MediaSent, WecomError> {
        if recipient.is_empty() {
            return Err(dispatch::no_recipients().into());
        }
        let account = self.account_id(account)?;
        let upload = media::load_upload(kind, path).await?;
        let media_id = self.dispatcher.upload(&account, upload).await?;
        let job = OutboundJob::new(
            account,
            recipient.clone(),
            OutboundPayload::Media {
                kind,
                media_id: media_id.clone(),
            },
        );
        let receipt = self.dispatcher.send(job).await?;
        Ok(MediaSent {
            media_id,
            msg_id: receipt.msg_id,
        })
    }
}

#[async_trait]
impl PluginAdapter for WecomChannel {
    fn name(&self) -> &str {
        "wecom"
    }

    fn version(&self) -> semver::Version {
        semver::Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or(semver::Version::new(0, 1, 0))
    }

    async fn health_check(&self) -> Result<HealthStatus, WecomError> {
        if self.registry.is_empty() {
            return Ok(HealthStatus::Unhealthy("no accounts configured".into()));
        }
        match &self.server {
            Some(handle) if handle.is_finished() => Ok(HealthStatus::Unhealthy(
                "callback server stopped".into(),
            )),
            Some(_) => Ok(HealthStatus::Healthy),
            None => Ok(HealthStatus::Degraded("callback server not started".into())),
        }
    }

    async fn shutdown(&self) -> Result<(), WecomError> {
        debug!("wecom channel shutting down");
        self.shutdown.cancel();
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for WecomChannel {
    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_images: true,
            supports_documents: true,
            supports_voice: true,
            supports_video: true,
            max_message_bytes: Some(self.dispatcher.policy().text_byte_limit),
        }
    }

    async fn connect(&mut self) -> Result<(), WecomError> {
        if self.server.is_some() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| WecomError::Channel {
                message: format!("failed to bind callback server to {addr}: {e}"),
                source: Some(Box::new(e)),
            })?;
        let local_addr = listener.local_addr().map_err(|e| WecomError::Channel {
            message: format!("failed to read bound address: {e}"),
            source: Some(Box::new(e)),
        })?;

        let app = self.router();
        let shutdown = self.shutdown.clone();
        info!(
            addr = %local_addr,
            path = %self.config.server.callback_path,
            "callback server listening"
        );

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "callback server stopped with error");
            }
        });

        self.server = Some(handle);
        self.local_addr = Some(local_addr);
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<Vec<MessageId>, WecomError> {
        match msg.payload {
            OutboundPayload::Text(text) => Ok(self
                .send_text(msg.account.as_ref(), &msg.recipient, &text)
                .await?),
            payload @ OutboundPayload::Media { .. } => {
                let account = self.account_id(msg.account.as_ref())?;
                let receipt = self
                    .dispatcher
                    .send(OutboundJob::new(account, msg.recipient, payload))
                    .await?;
                Ok(receipt.msg_id.into_iter().collect())
            }
        }
    }

    async fn receive(&self) -> Result<InboundMessage, WecomError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| WecomError::Channel {
            message: "inbound queue closed".into(),
            source: None,
        })
    }
}
