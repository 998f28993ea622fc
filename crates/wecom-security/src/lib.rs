// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret redaction for the WeCom gateway.
//!
//! Access tokens travel in query strings and JSON bodies, and corp secrets
//! appear in the token request URL. Everything the gateway logs passes
//! through [`RedactingMakeWriter`] before reaching the sink.

pub mod redact;

pub use redact::{redact, RedactingMakeWriter, RedactingWriter, SecretSet};
