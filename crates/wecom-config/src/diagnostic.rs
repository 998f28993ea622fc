// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with "did you mean?" suggestions.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity score to suggest a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration problem rendered as an Elm-style diagnostic.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigDiagnostic {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(wecom::config::unknown_key),
        help("{}", format_unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(wecom::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(wecom::config::missing_key),
        help("add `{key} = <value>` to wecom-gateway.toml")
    )]
    MissingKey { key: String },

    /// A semantic check failed after deserialization.
    #[error("invalid value for `{key}`: {message}")]
    #[diagnostic(code(wecom::config::validation))]
    Validation {
        /// Dotted path of the offending key.
        key: String,
        message: String,
    },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(wecom::config::other))]
    Other(String),
}

impl ConfigDiagnostic {
    pub(crate) fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            message: message.into(),
        }
    }
}

fn format_unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a `figment::Error` (which may hold several errors) into diagnostics.
pub fn figment_to_diagnostics(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigDiagnostic> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let dotted = error
                .path
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(".");
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let suggestion = suggest_key(field, expected);
                    let (span, src) = find_source_span(&error, field, toml_sources);
                    ConfigDiagnostic::UnknownKey {
                        key: field.clone(),
                        suggestion,
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigDiagnostic::MissingKey {
                    key: if dotted.is_empty() {
                        field.to_string()
                    } else {
                        format!("{dotted}.{field}")
                    },
                },
                Kind::InvalidType(actual, expected) => ConfigDiagnostic::InvalidType {
                    key: dotted,
                    detail: format!("found {actual}, expected {expected}"),
                    expected: expected.to_string(),
                },
                _ => ConfigDiagnostic::Other(error.to_string()),
            }
        })
        .collect()
}

fn find_source_span(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let source_path = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    let source = source_path
        .as_ref()
        .and_then(|path| toml_sources.iter().find(|(p, _)| p == path))
        // Inline strings carry no file metadata; fall back to a lone source.
        .or_else(|| match toml_sources {
            [only] => Some(only),
            _ => None,
        });

    if let Some((path, content)) = source
        && let Some(offset) = find_key_offset(content, &error.path, field)
    {
        let span = SourceSpan::new(offset.into(), field.len());
        return (Some(span), Some(NamedSource::new(path, content.clone())));
    }

    (None, None)
}

/// Find the byte offset of `field` inside the table named by `path`.
///
/// `path = ["wecom", "accounts", "sales"]` searches after the
/// `[wecom.accounts.sales]` header. An empty path searches from the start.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let search_start = if path.is_empty() {
        0
    } else {
        let header = format!("[{}]", path.join("."));
        content.find(&header).map(|pos| pos + header.len())?
    };

    let mut byte_offset = search_start;
    for line in content[search_start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            // Next table; the key is not in this one.
            return None;
        }
        if let Some(after) = trimmed.strip_prefix(field)
            && after.trim_start().starts_with('=')
        {
            return Some(byte_offset + (line.len() - trimmed.len()));
        }
        byte_offset += line.len();
    }

    None
}

/// Suggest the closest valid key by Jaro-Winkler similarity.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render diagnostics to stderr using miette's graphical handler.
pub fn render_diagnostics(errors: &[ConfigDiagnostic]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        if handler.render_report(&mut buf, error).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_corp_secret_for_typo() {
        let valid = &["corp_id", "corp_secret", "agent_id", "proxy"];
        assert_eq!(
            suggest_key("corp_secert", valid),
            Some("corp_secret".to_string())
        );
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["host", "port", "callback_path"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn find_key_offset_in_nested_table() {
        let content = "[wecom]\ncorp_id = \"a\"\n\n[wecom.accounts.sales]\ncorpsecret = \"b\"\n";
        let path = vec!["wecom".to_string(), "accounts".to_string(), "sales".to_string()];
        let o = find_key_offset(content, &path, "corpsecret").unwrap();
        assert_eq!(&content[o..o + 10], "corpsecret");
    }

    #[test]
    fn find_key_offset_stops_at_next_table() {
        let content = "[server]\nport = 1\n[dispatch]\nhots = 2\n";
        let path = vec!["server".to_string()];
        assert_eq!(find_key_offset(content, &path, "hots"), None);
    }
}
