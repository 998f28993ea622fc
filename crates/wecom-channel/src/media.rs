// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local files to temporary-media uploads.

use std::path::Path;

use tracing::debug;

use wecom_core::error::WecomError;
use wecom_core::types::{MediaKind, MediaUpload};

/// Guesses a MIME type from the file extension. Unknown extensions map to
/// `application/octet-stream`.
pub fn guess_content_type(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "amr" => "audio/amr",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "zip" => "application/zip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Builds an upload from in-memory bytes.
pub fn upload_from_bytes(kind: MediaKind, filename: &str, bytes: Vec<u8>) -> MediaUpload {
    MediaUpload {
        kind,
        filename: filename.to_string(),
        content_type: guess_content_type(filename).to_string(),
        bytes,
    }
}

/// Reads a local file into an upload of the given kind.
pub async fn load_upload(kind: MediaKind, path: &Path) -> Result<MediaUpload, WecomError> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| WecomError::Channel {
            message: format!("not a file path: {}", path.display()),
            source: None,
        })?
        .to_string();

    let bytes = tokio::fs::read(path).await.map_err(|e| WecomError::Channel {
        message: format!("failed to read {}: {e}", path.display()),
        source: Some(Box::new(e)),
    })?;
    if bytes.is_empty() {
        return Err(WecomError::Channel {
            message: format!("{} is empty", path.display()),
            source: None,
        });
    }

    debug!(file = %filename, size = bytes.len(), %kind, "media file loaded");
    Ok(upload_from_bytes(kind, &filename, bytes))
}
