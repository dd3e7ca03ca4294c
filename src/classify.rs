//! Heuristic text/binary classification.
//!
//! Only the leading window of a file is inspected. A NUL byte, or an excess
//! of C0 control bytes, marks the content binary. UTF-16/32 input contains
//! frequent NULs and is therefore classified binary; callers must accept
//! this.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use memchr::memchr;

/// Number of leading bytes inspected.
pub const HEAD_WINDOW: usize = 8 * 1024;

/// Default tolerated fraction of C0 control bytes.
pub const DEFAULT_CONTROL_RATIO: f64 = 0.01;

/// Classify a byte slice using the default control-byte tolerance.
pub fn is_binary_bytes(bytes: &[u8]) -> bool {
    is_binary_with_ratio(bytes, DEFAULT_CONTROL_RATIO)
}

/// Classify a byte slice; `max_control_ratio` is the tolerated fraction of
/// control bytes within the head window.
pub fn is_binary_with_ratio(bytes: &[u8], max_control_ratio: f64) -> bool {
    let window = &bytes[..bytes.len().min(HEAD_WINDOW)];
    if window.is_empty() {
        return false;
    }

    if memchr(0, window).is_some() {
        return true;
    }

    // C0 controls except \t, \n, \f, \r. Bytes >= 0x80 are never controls,
    // so Latin-1 and UTF-8 text stay text.
    let controls = window
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | 0x0c | b'\r'))
        .count();

    (controls as f64) / (window.len() as f64) > max_control_ratio
}

/// Read the head window of `path` and classify it.
pub fn is_binary_file(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; HEAD_WINDOW];
    let mut filled = 0usize;
    // A single read may return short even mid-file; loop until the window is
    // full or EOF.
    loop {
        let n = file.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buffer.len() {
            break;
        }
    }
    Ok(is_binary_bytes(&buffer[..filled]))
}
