// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound webhook: URL verification and encrypted message callbacks.
//!
//! A callback moves through signature check, decryption, and decoding before
//! it is handed to the [`ConversationSink`]. The hand-off runs on its own
//! task so the Platform gets its acknowledgement without waiting on the
//! conversation layer. Error responses carry generic bodies only.

use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use wecom_core::error::{DecodeError, DecryptError};
use wecom_core::traits::ConversationSink;
use wecom_core::types::{AccountId, DecodedMessage, InboundMessage};

use crate::account::{Account, AccountRegistry};
use crate::crypto;
use crate::decode::{MessageDecoder, parse_envelope};
use crate::metrics;

/// Query parameters the Platform attaches to every callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    pub msg_signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    /// Present on URL verification only.
    pub echostr: Option<String>,
}

/// Why a callback was refused or not handed off.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("signature missing or invalid")]
    Unauthorized,

    #[error("malformed callback: {0}")]
    BadRequest(&'static str),

    #[error("decryption failed: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("unknown account `{0}`")]
    UnknownAccount(String),

    /// The payload decrypted but is not a supported message. Acknowledged
    /// so the Platform does not redeliver it.
    #[error(transparent)]
    Undecodable(#[from] DecodeError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::BadRequest(_) | WebhookError::Decrypt(_) => StatusCode::BAD_REQUEST,
            WebhookError::UnknownAccount(_) => StatusCode::NOT_FOUND,
            WebhookError::Undecodable(_) => StatusCode::OK,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            WebhookError::Unauthorized => "unauthorized",
            WebhookError::BadRequest(_) => "bad_request",
            WebhookError::Decrypt(_) => "decrypt_failed",
            WebhookError::UnknownAccount(_) => "unknown_account",
            WebhookError::Undecodable(_) => "undecodable",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match status {
            StatusCode::OK => "",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::NOT_FOUND => "not found",
            _ => "bad request",
        };
        (status, body).into_response()
    }
}

/// Verifies, decrypts, decodes, and hands off inbound callbacks.
pub struct InboundGateway {
    registry: Arc<AccountRegistry>,
    decoder: MessageDecoder,
    sink: Arc<dyn ConversationSink>,
}

impl InboundGateway {
    pub fn new(
        registry: Arc<AccountRegistry>,
        decoder: MessageDecoder,
        sink: Arc<dyn ConversationSink>,
    ) -> Self {
        Self {
            registry,
            decoder,
            sink,
        }
    }

    fn account(&self, account: Option<&AccountId>) -> Result<Arc<Account>, WebhookError> {
        self.registry.resolve(account).map_err(|_| {
            WebhookError::UnknownAccount(
                account.map_or_else(|| self.registry.default_id().to_string(), ToString::to_string),
            )
        })
    }

    /// Answers a URL verification request with the decrypted `echostr`.
    pub fn verify_url(
        &self,
        account: Option<&AccountId>,
        query: &CallbackQuery,
    ) -> Result<String, WebhookError> {
        let account = self.account(account)?;
        let echostr = query
            .echostr
            .as_deref()
            .filter(|e| !e.is_empty())
            .ok_or(WebhookError::BadRequest("echostr is required"))?;

        check_signature(&account, query, echostr)?;
        let plain = crypto::decrypt(account.callback_key(), echostr, &account.corp_id)?;
        info!(account = %account.id, "callback URL verified");
        Ok(plain)
    }

    /// Runs an encrypted message callback through every stage up to decoding.
    pub fn accept(
        &self,
        account: Option<&AccountId>,
        query: &CallbackQuery,
        body: &str,
    ) -> Result<(AccountId, DecodedMessage), WebhookError> {
        let account = self.account(account)?;
        let envelope =
            parse_envelope(body).map_err(|_| WebhookError::BadRequest("invalid envelope"))?;

        check_signature(&account, query, &envelope.encrypt)?;
        let plain = crypto::decrypt(account.callback_key(), &envelope.encrypt, &account.corp_id)?;
        let message = self.decoder.decode(&plain)?;
        debug!(
            account = %account.id,
            kind = %message.body.kind(),
            msg_id = message.msg_id.as_deref().unwrap_or(""),
            "callback decoded"
        );
        Ok((account.id.clone(), message))
    }

    /// Hands a decoded message to the sink on a separate task.
    pub fn hand_off(&self, account: AccountId, message: DecodedMessage) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let inbound = InboundMessage {
                account,
                message,
                received_at: Utc::now(),
            };
            let account = inbound.account.clone();
            if let Err(e) = sink.deliver(inbound).await {
                metrics::record_inbound(account.as_str(), "dropped");
                warn!(account = %account, error = %e, "conversation sink rejected message");
            }
        });
    }

    fn handle_verify(&self, account: Option<AccountId>, query: &CallbackQuery) -> Response {
        let label = label(account.as_ref(), &self.registry);
        match self.verify_url(account.as_ref(), query) {
            Ok(plain) => {
                metrics::record_inbound(&label, "verified");
                (StatusCode::OK, plain).into_response()
            }
            Err(e) => {
                metrics::record_inbound(&label, e.outcome());
                warn!(account = %label, error = %e, "URL verification refused");
                e.into_response()
            }
        }
    }

    fn handle_callback(&self, account: Option<AccountId>, query: &CallbackQuery, body: &str) -> Response {
        let label = label(account.as_ref(), &self.registry);
        match self.accept(account.as_ref(), query, body) {
            Ok((account, message)) => {
                metrics::record_inbound(&label, "delivered");
                self.hand_off(account, message);
                StatusCode::OK.into_response()
            }
            Err(e) => {
                metrics::record_inbound(&label, e.outcome());
                match &e {
                    WebhookError::Undecodable(_) => {
                        debug!(account = %label, error = %e, "callback acknowledged without hand-off")
                    }
                    _ => warn!(account = %label, error = %e, "callback refused"),
                }
                e.into_response()
            }
        }
    }
}

fn check_signature(account: &Account, query: &CallbackQuery, ciphertext: &str) -> Result<(), WebhookError> {
    let (Some(signature), Some(timestamp), Some(nonce)) = (
        query.msg_signature.as_deref(),
        query.timestamp.as_deref(),
        query.nonce.as_deref(),
    ) else {
        return Err(WebhookError::Unauthorized);
    };
    if crypto::verify_signature(account.callback_token(), timestamp, nonce, ciphertext, signature) {
        Ok(())
    } else {
        Err(WebhookError::Unauthorized)
    }
}

/// Metric label for a request. Unconfigured names collapse to `unknown`.
fn label(account: Option<&AccountId>, registry: &AccountRegistry) -> String {
    match registry.resolve(account) {
        Ok(account) => account.id.to_string(),
        Err(_) => "unknown".to_string(),
    }
}

async fn verify_default(
    State(gateway): State<Arc<InboundGateway>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    gateway.handle_verify(None, &query)
}

async fn verify_named(
    State(gateway): State<Arc<InboundGateway>>,
    Path(account): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    gateway.handle_verify(Some(AccountId(account)), &query)
}

async fn callback_default(
    State(gateway): State<Arc<InboundGateway>>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Response {
    gateway.handle_callback(None, &query, &body)
}

async fn callback_named(
    State(gateway): State<Arc<InboundGateway>>,
    Path(account): Path<String>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Response {
    gateway.handle_callback(Some(AccountId(account)), &query, &body)
}

/// Builds the callback routes:
/// - `GET|POST {callback_path}` for the default account
/// - `GET|POST {callback_path}/{account}` for a named account
pub fn router(gateway: Arc<InboundGateway>, callback_path: &str, max_body_bytes: usize) -> Router {
    let base = callback_path.trim_end_matches('/');
    let named = format!("{base}/{{account}}");
    let base = if base.is_empty() { "/" } else { base };

    Router::new()
        .route(base, get(verify_default).post(callback_default))
        .route(&named, get(verify_named).post(callback_named))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wecom_config::model::WecomConfig;
    use wecom_core::types::MessageBody;
    use wecom_test_utils::RecordingSink;

    const KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";
    const CORP: &str = "ww-test";
    const TOKEN: &str = "cb-token";

    fn gateway(sink: RecordingSink) -> InboundGateway {
        let config = WecomConfig {
            corp_id: Some(CORP.into()),
            corp_secret: Some("secret".into()),
            agent_id: Some(1000002),
            callback_token: Some(TOKEN.into()),
            encoding_aes_key: Some(KEY.into()),
            ..Default::default()
        };
        let registry = Arc::new(AccountRegistry::from_config(&config).unwrap());
        InboundGateway::new(registry, MessageDecoder::new(512 * 1024), Arc::new(sink))
    }

    fn signed_query(ciphertext: &str, echostr: Option<&str>) -> CallbackQuery {
        CallbackQuery {
            msg_signature: Some(crypto::compute_signature(TOKEN, "1700000000", "n0nce", ciphertext)),
            timestamp: Some("1700000000".into()),
            nonce: Some("n0nce".into()),
            echostr: echostr.map(str::to_string),
        }
    }

    fn key() -> crypto::CallbackKey {
        crypto::CallbackKey::from_encoding_aes_key(KEY).unwrap()
    }

    fn text_xml(content: &str) -> String {
        format!(
            "<xml><ToUserName><![CDATA[{CORP}]]></ToUserName>\
             <FromUserName><![CDATA[alice]]></FromUserName>\
             <CreateTime>1700000000</CreateTime>\
             <MsgType><![CDATA[text]]></MsgType>\
             <Content><![CDATA[{content}]]></Content>\
             <MsgId>42</MsgId><AgentID>1000002</AgentID></xml>"
        )
    }

    fn envelope(ciphertext: &str) -> String {
        format!("<xml><ToUserName><![CDATA[{CORP}]]></ToUserName><Encrypt><![CDATA[{ciphertext}]]></Encrypt></xml>")
    }

    #[test]
    fn verify_url_returns_plain_echostr() {
        let gw = gateway(RecordingSink::new());
        let echostr = crypto::encrypt(&key(), "echo-123", CORP).unwrap();
        let plain = gw.verify_url(None, &signed_query(&echostr, Some(&echostr))).unwrap();
        assert_eq!(plain, "echo-123");
    }

    #[test]
    fn verify_url_rejects_missing_or_bad_signature() {
        let gw = gateway(RecordingSink::new());
        let echostr = crypto::encrypt(&key(), "echo-123", CORP).unwrap();

        let mut query = signed_query(&echostr, Some(&echostr));
        query.msg_signature = None;
        assert!(matches!(gw.verify_url(None, &query), Err(WebhookError::Unauthorized)));

        let mut query = signed_query(&echostr, Some(&echostr));
        query.nonce = Some("other".into());
        assert!(matches!(gw.verify_url(None, &query), Err(WebhookError::Unauthorized)));

        let query = signed_query("", None);
        assert!(matches!(gw.verify_url(None, &query), Err(WebhookError::BadRequest(_))));
    }

    #[test]
    fn accept_decodes_text_message() {
        let gw = gateway(RecordingSink::new());
        let ciphertext = crypto::encrypt(&key(), &text_xml("hello"), CORP).unwrap();
        let (account, message) = gw
            .accept(None, &signed_query(&ciphertext, None), &envelope(&ciphertext))
            .unwrap();
        assert_eq!(account, AccountId::default_account());
        assert_eq!(message.sender, "alice");
        assert_eq!(message.msg_id.as_deref(), Some("42"));
        assert_eq!(
            message.body,
            MessageBody::Text {
                content: "hello".into()
            }
        );
    }

    #[test]
    fn wrong_timestamp_is_rejected_before_decrypt() {
        let gw = gateway(RecordingSink::new());
        // Garbage ciphertext: a decrypt attempt would yield a Decrypt error.
        let ciphertext = "bm90LWNpcGhlcnRleHQ=";
        let mut query = signed_query(ciphertext, None);
        query.timestamp = Some("1700000001".into());
        assert!(matches!(
            gw.accept(None, &query, &envelope(ciphertext)),
            Err(WebhookError::Unauthorized)
        ));
    }

    #[test]
    fn foreign_receiver_is_a_decrypt_failure() {
        let gw = gateway(RecordingSink::new());
        let ciphertext = crypto::encrypt(&key(), &text_xml("hi"), "ww-other").unwrap();
        let err = gw
            .accept(None, &signed_query(&ciphertext, None), &envelope(&ciphertext))
            .unwrap_err();
        assert!(matches!(err, WebhookError::Decrypt(DecryptError::ReceiverMismatch)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unsupported_type_is_acknowledged() {
        let gw = gateway(RecordingSink::new());
        let xml = format!(
            "<xml><ToUserName>{CORP}</ToUserName><FromUserName>alice</FromUserName>\
             <CreateTime>1700000000</CreateTime><MsgType>event</MsgType>\
             <Event>enter_agent</Event></xml>"
        );
        let ciphertext = crypto::encrypt(&key(), &xml, CORP).unwrap();
        let err = gw
            .accept(None, &signed_query(&ciphertext, None), &envelope(&ciphertext))
            .unwrap_err();
        assert!(matches!(err, WebhookError::Undecodable(DecodeError::UnsupportedType(_))));
        assert_eq!(err.status(), StatusCode::OK);
    }

    #[test]
    fn unknown_account_and_bad_envelope() {
        let gw = gateway(RecordingSink::new());
        let err = gw
            .accept(Some(&AccountId::from("sales")), &CallbackQuery::default(), "<xml/>")
            .unwrap_err();
        assert!(matches!(&err, WebhookError::UnknownAccount(id) if id == "sales"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = gw.accept(None, &CallbackQuery::default(), "not xml <").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn hand_off_delivers_to_sink() {
        let sink = RecordingSink::new();
        let gw = gateway(sink.clone());
        let ciphertext = crypto::encrypt(&key(), &text_xml("ping"), CORP).unwrap();
        let (account, message) = gw
            .accept(None, &signed_query(&ciphertext, None), &envelope(&ciphertext))
            .unwrap();
        gw.hand_off(account, message);

        let delivered = sink.wait_for(1, Duration::from_secs(5)).await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].account, AccountId::default_account());
        assert_eq!(delivered[0].message.body.kind().to_string(), "text");
    }

    async fn response_parts(err: WebhookError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn error_bodies_are_generic() {
        let (status, body) =
            response_parts(WebhookError::Decrypt(DecryptError::InvalidPadding)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "bad request");
        assert!(!body.contains("padding"));

        let (status, body) =
            response_parts(WebhookError::UnknownAccount("secret-name".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "not found");
        assert!(!body.contains("secret-name"));

        let (status, body) = response_parts(WebhookError::BadRequest("missing Encrypt")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.contains("Encrypt"));

        let (status, body) = response_parts(WebhookError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "unauthorized");

        let (status, body) = response_parts(WebhookError::Undecodable(
            DecodeError::UnsupportedType("event".into()),
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }
}
