//! Bounded standard-input capture with content-kind sniffing.
//!
//! Stdin is read exactly once per invocation. When its bytes are not claimed
//! by a `-c @-` / `-s @-` argument they become a synthetic candidate named
//! `stdin_content`, inserted ahead of every other input.

use std::io::{self, Read};

use crate::classify;

/// Capture ceiling. Reading stops here and the blob is marked truncated.
pub const CAPTURE_LIMIT: usize = 8 * 1024 * 1024;

/// Name of the synthetic candidate carrying piped input.
pub const STDIN_FILE_NAME: &str = "stdin_content";

/// Sniffed shape of the captured bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Xml,
    Diff,
    Markdown,
    Text,
    Binary,
}

impl ContentKind {
    /// Fence info string for file-sink output, when the kind implies one.
    pub fn fence_hint(self) -> Option<&'static str> {
        match self {
            ContentKind::Json => Some("json"),
            ContentKind::Xml => Some("xml"),
            ContentKind::Diff => Some("diff"),
            ContentKind::Markdown => Some("markdown"),
            ContentKind::Text | ContentKind::Binary => None,
        }
    }
}

/// A single captured stdin payload.
#[derive(Clone, Debug)]
pub struct StdinBlob {
    pub bytes: Vec<u8>,
    pub content_kind: ContentKind,
    pub truncated: bool,
}

/// Read `reader` up to [`CAPTURE_LIMIT`]. Returns `None` for an empty
/// stream. Overflow truncates and warns on the diagnostic stream.
pub fn capture<R: Read>(reader: R) -> io::Result<Option<StdinBlob>> {
    let mut bytes = Vec::with_capacity(64 * 1024);
    // One extra byte distinguishes an exactly-full read from an overflow.
    reader
        .take(CAPTURE_LIMIT as u64 + 1)
        .read_to_end(&mut bytes)?;

    if bytes.is_empty() {
        return Ok(None);
    }

    let truncated = bytes.len() > CAPTURE_LIMIT;
    if truncated {
        bytes.truncate(CAPTURE_LIMIT);
        tracing::warn!("standard input exceeded 8 MiB; content truncated");
    }

    let content_kind = sniff(&bytes);
    Ok(Some(StdinBlob {
        bytes,
        content_kind,
        truncated,
    }))
}

/// Prefix heuristics, binary first.
fn sniff(bytes: &[u8]) -> ContentKind {
    if classify::is_binary_bytes(bytes) {
        return ContentKind::Binary;
    }

    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]);

    if text.starts_with("diff --git") || text.starts_with("--- ") || text.starts_with("+++ ") {
        return ContentKind::Diff;
    }

    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        // Structural check over the full payload, not just the window.
        let full = String::from_utf8_lossy(bytes);
        if serde_json::from_str::<serde_json::Value>(&full).is_ok() {
            return ContentKind::Json;
        }
    }

    if trimmed.starts_with("<?xml") || starts_with_tag(trimmed) {
        return ContentKind::Xml;
    }

    // A markdown heading near the top.
    if text
        .lines()
        .take(10)
        .any(|line| line.starts_with("# "))
    {
        return ContentKind::Markdown;
    }

    ContentKind::Text
}

/// `<` immediately followed by a tag-name character.
fn starts_with_tag(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next() == Some('<')
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/')
}
