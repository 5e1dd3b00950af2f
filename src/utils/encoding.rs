//! Source file reading with encoding detection.
//!
//! Providers read snippets out of arbitrary project files, so reads must not
//! fail on non-UTF-8 content:
//! - BOM markers are honoured (UTF-8, UTF-16 LE/BE)
//! - strict UTF-8 is the fast path
//! - otherwise chardetng guesses the encoding and decoding replaces bad bytes

use anyhow::{Context, Result};
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const DEFAULT_SAMPLE_SIZE: usize = 8192;

/// Detect if a file is binary (not text).
///
/// Null bytes are a strong indicator; otherwise fewer than 70% printable
/// ASCII bytes in the sample marks the file as binary. Unreadable files are
/// treated as binary so callers skip them.
pub fn is_binary_file(path: &Path, sample_size: usize) -> bool {
    is_binary_file_impl(path, sample_size).unwrap_or(true)
}

fn is_binary_file_impl(path: &Path, sample_size: usize) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut sample = vec![0u8; sample_size];
    let bytes_read = file.read(&mut sample)?;
    sample.truncate(bytes_read);

    if sample.is_empty() {
        return Ok(false);
    }
    if sample.contains(&0) {
        return Ok(true);
    }

    let printable = sample
        .iter()
        .filter(|&&b| (32..=126).contains(&b) || b == b'\t' || b == b'\n' || b == b'\r')
        .count();
    Ok((printable as f64 / sample.len() as f64) < 0.70)
}

/// Read a file to a string, decoding whatever encoding it is in.
///
/// `max_chars` truncates the decoded content by characters.
pub fn read_file_safe(path: &Path, max_chars: Option<usize>) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let decoded = decode_bytes(&bytes);
    Ok(match max_chars {
        Some(limit) => decoded.chars().take(limit).collect(),
        None => decoded,
    })
}

fn decode_bytes(bytes: &[u8]) -> String {
    if let Some(encoding) = bom_encoding(bytes) {
        let (cow, _, _) = encoding.decode(bytes);
        return cow.into_owned();
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let sample = &bytes[..bytes.len().min(DEFAULT_SAMPLE_SIZE)];
    let mut detector = EncodingDetector::new();
    detector.feed(sample, true);
    let guessed: &'static Encoding = detector.guess(None, true);
    let (cow, _, _) = guessed.decode(bytes);
    cow.into_owned()
}

fn bom_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.starts_with(&[0xef, 0xbb, 0xbf]) {
        Some(UTF_8)
    } else if bytes.starts_with(&[0xff, 0xfe]) {
        Some(UTF_16LE)
    } else if bytes.starts_with(&[0xfe, 0xff]) {
        Some(UTF_16BE)
    } else {
        None
    }
}

/// A 1-indexed inclusive line range cut out of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineWindow {
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

/// Cut `context` lines either side of `center` (1-indexed) out of `content`.
///
/// Returns `None` when the content is empty. A center past the end of the
/// content is pulled back to the last line.
pub fn line_window(content: &str, center: usize, context: usize) -> Option<LineWindow> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return None;
    }
    let center = center.clamp(1, lines.len());
    let start = center.saturating_sub(context).max(1);
    let end = (center + context).min(lines.len());
    let mut text = lines[start - 1..end].join("\n");
    text.push('\n');
    Some(LineWindow { start_line: start, end_line: end, content: text })
}

/// First `max_lines` lines of `content`.
pub fn head_window(content: &str, max_lines: usize) -> Option<LineWindow> {
    let lines: Vec<&str> = content.lines().take(max_lines.max(1)).collect();
    if lines.is_empty() {
        return None;
    }
    let mut text = lines.join("\n");
    text.push('\n');
    Some(LineWindow { start_line: 1, end_line: lines.len(), content: text })
}
