// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Callback XML decoding.
//!
//! Callback payloads are flat: a root element whose direct children carry
//! text or CDATA values. Only those direct children are collected. Document
//! type declarations are refused outright, so no entity beyond the five
//! predefined ones (plus character references) is ever expanded.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::DateTime;
use quick_xml::Reader;
use quick_xml::events::Event;

use wecom_core::error::DecodeError;
use wecom_core::types::{DecodedMessage, MessageBody, MessageKind};

/// The outer POST body: `<xml><ToUserName/><AgentID/><Encrypt/></xml>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub encrypt: String,
    pub to_user_name: Option<String>,
    pub agent_id: Option<String>,
}

/// Decodes decrypted callback payloads into [`DecodedMessage`]s.
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    max_bytes: usize,
}

impl MessageDecoder {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Decodes one payload. Oversized input is refused before parsing.
    pub fn decode(&self, xml: &str) -> Result<DecodedMessage, DecodeError> {
        if xml.len() > self.max_bytes {
            return Err(DecodeError::TooLarge {
                size: xml.len(),
                limit: self.max_bytes,
            });
        }

        let mut fields = Fields(collect_fields(xml)?);

        let msg_type = fields.token("MsgType")?;
        let kind = MessageKind::from_str(&msg_type)
            .map_err(|_| DecodeError::UnsupportedType(msg_type.clone()))?;

        let sender = fields.token("FromUserName")?;
        let receiver = fields.token("ToUserName")?;
        let create_time = fields.token("CreateTime")?;
        let secs = create_time
            .parse::<i64>()
            .map_err(|_| DecodeError::Malformed("CreateTime is not an integer".into()))?;
        let created_at = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| DecodeError::Malformed("CreateTime is out of range".into()))?;

        let body = match kind {
            MessageKind::Text => MessageBody::Text {
                content: fields.required("Content")?,
            },
            MessageKind::Image => MessageBody::Image {
                pic_url: fields.token("PicUrl")?,
                media_id: fields.token("MediaId")?,
            },
            MessageKind::Voice => MessageBody::Voice {
                media_id: fields.token("MediaId")?,
                format: fields.token("Format")?,
            },
            MessageKind::Video => MessageBody::Video {
                media_id: fields.token("MediaId")?,
                thumb_media_id: fields.token("ThumbMediaId")?,
            },
            MessageKind::File => MessageBody::File {
                media_id: fields.token("MediaId")?,
                file_name: fields.optional("FileName"),
            },
            MessageKind::Link => MessageBody::Link {
                title: fields.required("Title")?,
                description: fields.required("Description")?,
                url: fields.token("Url")?,
                pic_url: fields.optional("PicUrl"),
            },
        };

        Ok(DecodedMessage {
            sender,
            receiver,
            created_at,
            msg_id: fields.optional("MsgId"),
            agent_id: fields.optional("AgentID"),
            body,
        })
    }
}

/// Reads the `Encrypt` element (and routing hints) from a POST body.
pub fn parse_envelope(xml: &str) -> Result<Envelope, DecodeError> {
    let mut fields = Fields(collect_fields(xml)?);
    Ok(Envelope {
        encrypt: fields.token("Encrypt")?,
        to_user_name: fields.optional("ToUserName"),
        agent_id: fields.optional("AgentID"),
    })
}

struct Fields(HashMap<String, String>);

impl Fields {
    fn required(&mut self, name: &'static str) -> Result<String, DecodeError> {
        self.0
            .remove(name)
            .filter(|v| !v.is_empty())
            .ok_or(DecodeError::MissingField(name))
    }

    /// Identifier-like value: surrounding whitespace is layout, not data.
    fn token(&mut self, name: &'static str) -> Result<String, DecodeError> {
        let value = self.required(name)?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DecodeError::MissingField(name));
        }
        Ok(trimmed.to_string())
    }

    fn optional(&mut self, name: &str) -> Option<String> {
        self.0
            .remove(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Collects the direct children of the root element. The first occurrence of
/// a repeated name wins.
fn collect_fields(xml: &str) -> Result<HashMap<String, String>, DecodeError> {
    let mut reader = Reader::from_str(xml);

    let mut fields = HashMap::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut current: Option<String> = None;
    let mut value = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        match event {
            Event::DocType(_) => return Err(DecodeError::Forbidden),
            Event::Start(start) => {
                if depth == 0 {
                    if seen_root {
                        return Err(DecodeError::Malformed("multiple root elements".into()));
                    }
                    seen_root = true;
                } else if depth == 1 {
                    current = Some(element_name(start.name().as_ref())?);
                    value.clear();
                }
                depth += 1;
            }
            Event::Empty(start) => match depth {
                0 if seen_root => {
                    return Err(DecodeError::Malformed("multiple root elements".into()));
                }
                0 => seen_root = true,
                1 => {
                    fields
                        .entry(element_name(start.name().as_ref())?)
                        .or_insert_with(String::new);
                }
                _ => {}
            },
            Event::Text(text) if depth == 2 => {
                let unescaped = text.unescape().map_err(|_| {
                    DecodeError::Malformed("unsupported entity or character reference".into())
                })?;
                value.push_str(&unescaped);
            }
            Event::CData(cdata) if depth == 2 => {
                let raw = cdata.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|_| DecodeError::Malformed("CDATA is not valid UTF-8".into()))?;
                value.push_str(text);
            }
            Event::End(_) => {
                if depth == 2
                    && let Some(name) = current.take()
                {
                    fields
                        .entry(name)
                        .or_insert_with(|| std::mem::take(&mut value));
                }
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| DecodeError::Malformed("unbalanced end tag".into()))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(DecodeError::Malformed("no root element".into()));
    }
    if depth != 0 {
        return Err(DecodeError::Malformed("unclosed element".into()));
    }
    Ok(fields)
}

fn element_name(raw: &[u8]) -> Result<String, DecodeError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| DecodeError::Malformed("element name is not valid UTF-8".into()))
}
