//! Token-count extraction from a JSONL transcript tail.
//!
//! Transcripts are append-only JSON-lines files, one message per line.
//! Rather than parse the whole file on every filesystem event, only the
//! last `tail_size_bytes` are read and scanned backward for the most
//! recent line carrying a `usage` block — that block's token counts are
//! authoritative. Older transcripts or unfamiliar tools may never emit
//! one, so a byte-count heuristic is the fallback.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use contextd_domain::Result;

pub struct TokenEstimate {
    pub tokens: u64,
    pub is_real_tokens: bool,
}

pub fn extract(
    path: &Path,
    tail_size_bytes: u64,
    bytes_per_token: f64,
    system_overhead_tokens: u64,
    max_context_tokens: u64,
) -> Result<TokenEstimate> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(tail_size_bytes);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf)?;
    let tail = String::from_utf8_lossy(&buf);

    if let Some(tokens) = last_usage_tokens(&tail) {
        return Ok(TokenEstimate { tokens, is_real_tokens: true });
    }

    let estimated = (len as f64 / bytes_per_token) as u64 + system_overhead_tokens;
    Ok(TokenEstimate { tokens: estimated.min(max_context_tokens), is_real_tokens: false })
}

/// Scans lines backward (last line first) for the most recent assistant
/// turn carrying a usage block and returns its total token count.
fn last_usage_tokens(tail: &str) -> Option<u64> {
    for line in tail.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if value.get("type").and_then(|t| t.as_str()) != Some("assistant") {
            continue;
        }
        if let Some(usage) = find_usage(&value) {
            return Some(sum_usage(usage));
        }
    }
    None
}

fn find_usage(value: &serde_json::Value) -> Option<&serde_json::Value> {
    value
        .get("message")
        .and_then(|m| m.get("usage"))
        .or_else(|| value.get("usage"))
}

/// Only the tokens that still occupy the context window count: a cached
/// prefix that was read back (`cache_read_input_tokens`) costs nothing to
/// re-include, and `output_tokens` was already emitted, not held in
/// context, so neither contributes here.
fn sum_usage(usage: &serde_json::Value) -> u64 {
    const FIELDS: &[&str] = &["input_tokens", "cache_creation_input_tokens"];
    FIELDS
        .iter()
        .filter_map(|f| usage.get(*f))
        .filter_map(|v| v.as_u64())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        f
    }

    #[test]
    fn extracts_real_tokens_from_last_usage_line() {
        let f = write_tmp(&[
            r#"{"type":"user","message":{"content":"hi"}}"#,
            r#"{"type":"assistant","message":{"usage":{"input_tokens":1000,"output_tokens":200}}}"#,
        ]);
        let est = extract(f.path(), 10 * 1024, 6.0, 2000, 200_000).unwrap();
        assert!(est.is_real_tokens);
        assert_eq!(est.tokens, 1000);
    }

    #[test]
    fn excludes_cache_read_tokens() {
        let f = write_tmp(&[
            r#"{"type":"assistant","message":{"usage":{"input_tokens":1000,"cache_creation_input_tokens":500,"cache_read_input_tokens":50000}}}"#,
        ]);
        let est = extract(f.path(), 10 * 1024, 6.0, 2000, 200_000).unwrap();
        assert!(est.is_real_tokens);
        assert_eq!(est.tokens, 1500);
    }

    #[test]
    fn ignores_usage_blocks_on_non_assistant_lines() {
        let f = write_tmp(&[
            r#"{"type":"user","message":{"usage":{"input_tokens":9999}}}"#,
        ]);
        let est = extract(f.path(), 10 * 1024, 6.0, 2000, 200_000).unwrap();
        assert!(!est.is_real_tokens);
    }

    #[test]
    fn falls_back_to_byte_estimate_without_usage() {
        let f = write_tmp(&[r#"{"type":"user","message":{"content":"hello world"}}"#]);
        let est = extract(f.path(), 10 * 1024, 6.0, 2000, 200_000).unwrap();
        assert!(!est.is_real_tokens);
        assert!(est.tokens >= 2000);
    }

    #[test]
    fn uses_most_recent_usage_line_not_first() {
        let f = write_tmp(&[
            r#"{"type":"assistant","message":{"usage":{"input_tokens":100,"output_tokens":10}}}"#,
            r#"{"type":"assistant","message":{"usage":{"input_tokens":5000,"output_tokens":500}}}"#,
        ]);
        let est = extract(f.path(), 10 * 1024, 6.0, 2000, 200_000).unwrap();
        assert_eq!(est.tokens, 5000);
    }
}
