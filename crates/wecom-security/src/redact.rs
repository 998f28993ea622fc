// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret redaction for log output and error messages.
//!
//! Two complementary mechanisms:
//! 1. **Regex-based**: Catches credential-bearing URL parameters and JSON fields.
//! 2. **Exact-match**: Catches configured secrets (corp secrets, callback
//!    tokens, callback keys) registered at startup.

use std::io::Write;
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;
use tracing_subscriber::fmt::MakeWriter;

/// Known secret patterns. Capture group 1 is kept, the rest is replaced.
static REDACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // access_token / corpsecret query parameters
        r"(?i)((?:access_token|corpsecret)=)[^&\s]+",
        // JSON fields carrying tokens or secrets
        r#"("(?:access_token|corp_secret|corpsecret|encoding_aes_key|callback_token)"\s*:\s*")[^"]*"#,
        // Bearer tokens in headers
        r"(Bearer\s+)[a-zA-Z0-9._\-]{10,}",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// The redaction placeholder.
const REDACTED: &str = "[REDACTED]";

/// Redact secrets from a string using regex patterns and exact-match values.
pub fn redact(input: &str, secrets: &[String]) -> String {
    let mut result = input.to_string();

    for pattern in REDACTION_PATTERNS.iter() {
        result = pattern
            .replace_all(&result, format!("${{1}}{REDACTED}").as_str())
            .into_owned();
    }

    // Longest first so a secret containing another is replaced whole.
    let mut sorted: Vec<&String> = secrets.iter().filter(|s| !s.is_empty()).collect();
    sorted.sort_by_key(|v| std::cmp::Reverse(v.len()));
    for value in sorted {
        result = result.replace(value.as_str(), REDACTED);
    }

    result
}

/// Shared list of exact secret values to scrub from output.
#[derive(Debug, Clone, Default)]
pub struct SecretSet {
    values: Arc<RwLock<Vec<String>>>,
}

impl SecretSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value. Empty strings and duplicates are ignored.
    pub fn insert(&self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        if let Ok(mut values) = self.values.write()
            && !values.contains(&value)
        {
            values.push(value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<String> {
        self.values.read().map(|v| v.clone()).unwrap_or_default()
    }
}

/// A writer wrapper that redacts secrets from output.
pub struct RedactingWriter<W> {
    inner: W,
    secrets: SecretSet,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W, secrets: SecretSet) -> Self {
        Self { inner, secrets }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let input = String::from_utf8_lossy(buf);
        let redacted = redact(&input, &self.secrets.snapshot());
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// `MakeWriter` for `tracing_subscriber::fmt` that wraps every event writer
/// in a [`RedactingWriter`].
#[derive(Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    secrets: SecretSet,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, secrets: SecretSet) -> Self {
        Self { inner, secrets }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new(self.inner.make_writer(), self.secrets.clone())
    }
}
