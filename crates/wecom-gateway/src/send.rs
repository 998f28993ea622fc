// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `wecom-gateway send`: one-shot text, image, or file message.
//!
//! Prints a single JSON line on stdout, for example
//! `{"ok":true,"type":"text","to":"@all","media_id":null,"msgid":"..."}`.

use std::path::PathBuf;

use clap::{ArgGroup, Args};
use serde::Serialize;
use tracing::debug;

use wecom_channel::WecomChannel;
use wecom_config::model::GatewayConfig;
use wecom_core::error::WecomError;
use wecom_core::types::{AccountId, MediaKind, Recipient};

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("content").required(true).args(["text", "image", "file"])))]
pub struct SendArgs {
    /// Text to send. Long text is split into several messages.
    pub text: Option<String>,

    /// Upload this image and send it.
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Upload this file and send it.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Recipients: `@all` or user ids separated by `|` or `,`.
    #[arg(long, default_value = "@all")]
    pub to: String,

    /// Account to send from. Defaults to the configured default account.
    #[arg(long)]
    pub account: Option<String>,
}

/// The JSON result line.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SendReport {
    pub ok: bool,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub to: String,
    pub media_id: Option<String>,
    pub msgid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendReport {
    fn failed(kind: &'static str, to: &str, error: &WecomError) -> Self {
        Self {
            ok: false,
            kind,
            to: to.to_string(),
            media_id: None,
            msgid: None,
            segments: None,
            error: Some(error.to_string()),
        }
    }
}

impl SendArgs {
    fn kind(&self) -> &'static str {
        if self.image.is_some() {
            "image"
        } else if self.file.is_some() {
            "file"
        } else {
            "text"
        }
    }
}

pub async fn run_send(config: GatewayConfig, args: SendArgs) -> Result<(), WecomError> {
    let channel = WecomChannel::new(config)?;
    let kind = args.kind();
    let to = args.to.clone();

    let (report, result) = match send(&channel, &args).await {
        Ok(report) => (report, Ok(())),
        Err(e) => (SendReport::failed(kind, &to, &e), Err(e)),
    };
    let line = serde_json::to_string(&report).map_err(|e| WecomError::Internal(e.to_string()))?;
    println!("{line}");
    result
}

async fn send(channel: &WecomChannel, args: &SendArgs) -> Result<SendReport, WecomError> {
    let recipient = Recipient::parse(&args.to);
    let account = args.account.as_deref().map(AccountId::from);
    let account = account.as_ref();

    let media = match (&args.image, &args.file) {
        (Some(path), _) => Some((MediaKind::Image, path)),
        (None, Some(path)) => Some((MediaKind::File, path)),
        (None, None) => None,
    };

    if let Some((kind, path)) = media {
        debug!(path = %path.display(), %kind, "sending media");
        let sent = channel.send_file(account, &recipient, kind, path).await?;
        return Ok(SendReport {
            ok: true,
            kind: args.kind(),
            to: recipient.to_touser(),
            media_id: Some(sent.media_id),
            msgid: sent.msg_id.map(|id| id.0),
            segments: None,
            error: None,
        });
    }

    let text = args.text.as_deref().unwrap_or_default();
    let ids = channel.send_text(account, &recipient, text).await?;
    Ok(SendReport {
        ok: true,
        kind: "text",
        to: recipient.to_touser(),
        media_id: None,
        msgid: ids.first().map(|id| id.0.clone()),
        segments: (ids.len() > 1).then_some(ids.len()),
        error: None,
    })
}
