// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Platform REST API.
//!
//! One `reqwest::Client` per account so each account can route through its
//! own proxy. URLs carrying an access token are never logged, and reqwest
//! errors are stripped of their URL before they become [`TransportError`]s.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use wecom_core::error::TransportError;
use wecom_core::traits::PlatformApi;
use wecom_core::types::{AccountId, MediaUpload, OutboundJob, OutboundPayload, TokenGrant};

use crate::account::AccountRegistry;

/// Connect timeout applied to every client. Request deadlines are enforced
/// by the dispatcher and token manager.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Common shape of every Platform JSON reply.
#[derive(Debug, Deserialize)]
struct ApiReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    access_token: Option<String>,
    expires_in: Option<u64>,
    msgid: Option<Value>,
    media_id: Option<String>,
    #[serde(default)]
    invaliduser: String,
}

/// [`PlatformApi`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpPlatformApi {
    base_url: String,
    clients: HashMap<AccountId, reqwest::Client>,
    fallback: reqwest::Client,
}

impl HttpPlatformApi {
    /// Builds one client per registered account, honouring its proxy.
    pub fn new(base_url: impl Into<String>, registry: &AccountRegistry) -> Result<Self, TransportError> {
        let mut clients = HashMap::with_capacity(registry.len());
        for account in registry.accounts() {
            let client = build_client(account.proxy.as_deref())?;
            if account.proxy.is_some() {
                debug!(account = %account.id, "outbound proxy configured");
            }
            clients.insert(account.id.clone(), client);
        }
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            clients,
            fallback: build_client(None)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self, account: &AccountId) -> &reqwest::Client {
        self.clients.get(account).unwrap_or(&self.fallback)
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, TransportError> {
        Url::parse_with_params(&format!("{}{path}", self.base_url), params)
            .map_err(|e| TransportError::InvalidResponse(format!("invalid API base URL: {e}")))
    }
}

fn build_client(proxy: Option<&str>) -> Result<reqwest::Client, TransportError> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| TransportError::Network(format!("invalid proxy: {}", e.without_url())))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| TransportError::Network(format!("failed to build HTTP client: {e}")))
}

fn network(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.without_url().to_string())
}

/// Reads a reply body, mapping HTTP failures and nonzero `errcode`s.
async fn read_reply(response: reqwest::Response) -> Result<ApiReply, TransportError> {
    let status = response.status();
    let body = response.text().await.map_err(network)?;
    if !status.is_success() {
        return Err(TransportError::InvalidResponse(format!("HTTP {status}")));
    }
    let reply: ApiReply = serde_json::from_str(&body)
        .map_err(|e| TransportError::InvalidResponse(format!("invalid JSON reply: {e}")))?;
    if reply.errcode != 0 {
        return Err(TransportError::Platform {
            code: reply.errcode,
            message: reply.errmsg,
        });
    }
    Ok(reply)
}

/// JSON body of a `message/send` call.
fn message_body(agent_id: u64, job: &OutboundJob) -> Value {
    let msg_type = job.payload.msg_type();
    let mut body = json!({
        "touser": job.recipient.to_touser(),
        "msgtype": msg_type,
        "agentid": agent_id,
        "safe": 0,
    });
    body[msg_type] = match &job.payload {
        OutboundPayload::Text(content) => json!({ "content": content }),
        OutboundPayload::Media { media_id, .. } => json!({ "media_id": media_id }),
    };
    body
}

#[async_trait]
impl PlatformApi for HttpPlatformApi {
    async fn fetch_token(
        &self,
        account: &AccountId,
        corp_id: &str,
        corp_secret: &str,
    ) -> Result<TokenGrant, TransportError> {
        let url = self.endpoint(
            "/cgi-bin/gettoken",
            &[("corpid", corp_id), ("corpsecret", corp_secret)],
        )?;
        let response = self.client(account).get(url).send().await.map_err(network)?;
        let reply = read_reply(response).await?;

        let access_token = reply
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TransportError::InvalidResponse("reply has no access_token".into()))?;
        let expires_in = Duration::from_secs(reply.expires_in.unwrap_or(7200));
        Ok(TokenGrant {
            access_token,
            expires_in,
        })
    }

    async fn send_message(
        &self,
        account: &AccountId,
        access_token: &str,
        agent_id: u64,
        job: &OutboundJob,
    ) -> Result<Option<String>, TransportError> {
        let url = self.endpoint("/cgi-bin/message/send", &[("access_token", access_token)])?;
        let response = self
            .client(account)
            .post(url)
            .json(&message_body(agent_id, job))
            .send()
            .await
            .map_err(network)?;
        let reply = read_reply(response).await?;

        if !reply.invaliduser.is_empty() {
            warn!(account = %account, invalid = %reply.invaliduser, "some recipients were not reached");
        }
        Ok(reply.msgid.and_then(|id| match id {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
    }

    async fn upload_media(
        &self,
        account: &AccountId,
        access_token: &str,
        upload: &MediaUpload,
    ) -> Result<String, TransportError> {
        let kind = upload.kind.to_string();
        let url = self.endpoint(
            "/cgi-bin/media/upload",
            &[("access_token", access_token), ("type", kind.as_str())],
        )?;
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.filename.clone())
            .mime_str(&upload.content_type)
            .map_err(|e| TransportError::InvalidResponse(format!("invalid content type: {e}")))?;
        let form = Form::new().part("media", part);

        let response = self
            .client(account)
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(network)?;
        let reply = read_reply(response).await?;

        reply
            .media_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TransportError::InvalidResponse("reply has no media_id".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wecom_config::model::WecomConfig;
    use wecom_core::types::{MediaKind, Recipient};
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> HttpPlatformApi {
        let config = WecomConfig {
            corp_id: Some("ww-test".into()),
            corp_secret: Some("secret".into()),
            agent_id: Some(1000002),
            callback_token: Some("cb".into()),
            encoding_aes_key: Some("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG".into()),
            ..Default::default()
        };
        let registry = AccountRegistry::from_config(&config).unwrap();
        HttpPlatformApi::new(server.uri(), &registry).unwrap()
    }

    #[tokio::test]
    async fn fetch_token_parses_grant() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .and(query_param("corpid", "ww-test"))
            .and(query_param("corpsecret", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "errmsg": "ok",
                "access_token": "tok-abc",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = api(&server)
            .fetch_token(&AccountId::default_account(), "ww-test", "secret")
            .await
            .unwrap();
        assert_eq!(grant.access_token, "tok-abc");
        assert_eq!(grant.expires_in, Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn nonzero_errcode_becomes_platform_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 40013,
                "errmsg": "invalid corpid"
            })))
            .mount(&server)
            .await;

        let err = api(&server)
            .fetch_token(&AccountId::default_account(), "bad", "secret")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Platform {
                code: 40013,
                message: "invalid corpid".into()
            }
        );
    }

    #[tokio::test]
    async fn send_text_posts_typed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/message/send"))
            .and(query_param("access_token", "tok-abc"))
            .and(body_partial_json(json!({
                "touser": "alice|bob",
                "msgtype": "text",
                "agentid": 1000002,
                "safe": 0,
                "text": { "content": "hello" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "errmsg": "ok",
                "msgid": "m-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let job = OutboundJob::text(
            AccountId::default_account(),
            Recipient::Users(vec!["alice".into(), "bob".into()]),
            "hello",
        );
        let msgid = api(&server)
            .send_message(&AccountId::default_account(), "tok-abc", 1000002, &job)
            .await
            .unwrap();
        assert_eq!(msgid.as_deref(), Some("m-1"));
    }

    #[tokio::test]
    async fn send_media_uses_media_id_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/message/send"))
            .and(body_partial_json(json!({
                "touser": "@all",
                "msgtype": "image",
                "image": { "media_id": "media-9" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "errmsg": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let job = OutboundJob::new(
            AccountId::default_account(),
            Recipient::All,
            OutboundPayload::Media {
                kind: MediaKind::Image,
                media_id: "media-9".into(),
            },
        );
        let msgid = api(&server)
            .send_message(&AccountId::default_account(), "tok", 1000002, &job)
            .await
            .unwrap();
        assert_eq!(msgid, None);
    }

    #[tokio::test]
    async fn upload_sends_multipart_media_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/media/upload"))
            .and(query_param("access_token", "tok"))
            .and(query_param("type", "file"))
            .and(body_string_contains("name=\"media\""))
            .and(body_string_contains("filename=\"report.pdf\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "errmsg": "",
                "type": "file",
                "media_id": "media-42",
                "created_at": "1380000000"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let upload = MediaUpload {
            kind: MediaKind::File,
            filename: "report.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: b"%PDF-1.4".to_vec(),
        };
        let media_id = api(&server)
            .upload_media(&AccountId::default_account(), "tok", &upload)
            .await
            .unwrap();
        assert_eq!(media_id, "media-42");
    }

    #[tokio::test]
    async fn http_failure_and_bad_json_are_invalid_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let api = api(&server);
        let account = AccountId::default_account();
        assert!(matches!(
            api.fetch_token(&account, "ww", "s").await,
            Err(TransportError::InvalidResponse(_))
        ));
        assert!(matches!(
            api.fetch_token(&account, "ww", "s").await,
            Err(TransportError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn network_errors_do_not_leak_the_url() {
        let config = WecomConfig {
            corp_id: Some("ww-test".into()),
            corp_secret: Some("secret".into()),
            agent_id: Some(1),
            callback_token: Some("cb".into()),
            encoding_aes_key: Some("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG".into()),
            ..Default::default()
        };
        let registry = AccountRegistry::from_config(&config).unwrap();
        // Nothing listens on port 1.
        let api = HttpPlatformApi::new("http://127.0.0.1:1", &registry).unwrap();

        let err = api
            .fetch_token(&AccountId::default_account(), "ww", "very-secret-value")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)), "{err:?}");
        assert!(!err.to_string().contains("very-secret-value"));
    }

    #[test]
    fn proxy_client_builds_and_base_url_is_normalised() {
        assert!(build_client(Some("http://127.0.0.1:3128")).is_ok());

        let registry = AccountRegistry::from_accounts(Vec::new(), AccountId::default_account());
        let api = HttpPlatformApi::new("https://qyapi.example.com/", &registry).unwrap();
        assert_eq!(api.base_url(), "https://qyapi.example.com");
        let url = api
            .endpoint("/cgi-bin/gettoken", &[("corpid", "a b"), ("corpsecret", "s&t")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://qyapi.example.com/cgi-bin/gettoken?corpid=a+b&corpsecret=s%26t"
        );
    }
}
