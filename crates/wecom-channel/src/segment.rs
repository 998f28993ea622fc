// SPDX-FileCopyrightText: 2026 WeCom Gateway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte-bounded text segmentation.

/// Splits `text` into ordered chunks of at most `byte_limit` UTF-8 bytes.
///
/// Cuts land on the largest char boundary at or below the limit, so
/// concatenating the chunks yields `text` exactly. A char wider than the
/// limit (or any char when the limit is 0) becomes a chunk of its own.
/// Empty input yields no chunks.
pub fn segment(text: &str, byte_limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        if rest.len() <= byte_limit {
            chunks.push(rest);
            break;
        }

        let mut cut = byte_limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }

    chunks
}
