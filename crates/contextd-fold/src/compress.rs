//! Section-tagged reply parsing and the `Compressor` seam.
//!
//! An LLM asked to compress a trajectory replies in a fixed structure
//! (`SUMMARY:` / `DECISIONS:` / `FILES:` / `ERRORS:` / `PROGRESS:`). Parsing
//! is hand-written rather than regex-based: headers are single lines
//! matched case-insensitively, and everything up to the next header (or
//! end of text) belongs to that section.

use async_trait::async_trait;
use contextd_domain::Result;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressedTrajectory {
    pub summary: String,
    pub decisions: Vec<String>,
    pub files: Vec<String>,
    pub errors: Vec<String>,
    pub progress: Vec<String>,
    pub compressed_tokens: u64,
}

/// Summarizes a full trajectory into a structured, much shorter record.
/// Implementations typically wrap an LLM call; tests use a canned double.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, trajectory: &str, target_tokens: u64) -> Result<CompressedTrajectory>;
}

const SECTIONS: &[&str] = &["SUMMARY", "DECISIONS", "FILES", "ERRORS", "PROGRESS"];

/// Parses a compressor reply in the `SECTIONS` format above. Never fails:
/// a reply with no recognizable headers yields an empty-but-valid record
/// with the whole reply folded into `summary`.
pub fn parse_reply(reply: &str, bytes_per_token: f64) -> CompressedTrajectory {
    let mut sections: std::collections::HashMap<&'static str, String> = std::collections::HashMap::new();
    let mut current: Option<&'static str> = None;
    let mut buf = String::new();

    for line in reply.lines() {
        if let Some(name) = header_name(line) {
            if let Some(prev) = current.take() {
                sections.insert(prev, buf.trim().to_string());
            }
            buf.clear();
            current = Some(name);
            continue;
        }
        if current.is_some() {
            buf.push_str(line);
            buf.push('\n');
        }
    }
    if let Some(prev) = current.take() {
        sections.insert(prev, buf.trim().to_string());
    }

    let summary = sections.get("SUMMARY").cloned().unwrap_or_else(|| {
        if sections.is_empty() {
            reply.trim().to_string()
        } else {
            String::new()
        }
    });

    let estimated_tokens = (reply.len() as f64 / bytes_per_token).round() as u64;

    CompressedTrajectory {
        summary,
        decisions: bullets(sections.get("DECISIONS")),
        files: bullets(sections.get("FILES")),
        errors: bullets(sections.get("ERRORS")),
        progress: bullets(sections.get("PROGRESS")),
        compressed_tokens: estimated_tokens,
    }
}

fn header_name(line: &str) -> Option<&'static str> {
    let trimmed = line.trim();
    let upper = trimmed.to_uppercase();
    SECTIONS.iter().find(|s| upper == format!("{s}:")).copied()
}

fn bullets(section: Option<&String>) -> Vec<String> {
    let Some(text) = section else { return Vec::new() };
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("- ") {
                Some(rest.trim().to_string())
            } else if let Some(rest) = line.strip_prefix("* ") {
                Some(rest.trim().to_string())
            } else if !line.is_empty() && !line.starts_with('#') {
                Some(line.to_string())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "SUMMARY:\nBuilt the watcher module and wired it to the bus.\n\nDECISIONS:\n- used notify for recursive watching\n- byte-tail scan instead of full parse\n\nFILES:\n- src/lib.rs:42 - added WatcherService\n\nERRORS:\n- panic on empty tail → guarded with saturating_sub\n\nPROGRESS:\n- watcher complete\n";

    #[test]
    fn parses_all_sections() {
        let parsed = parse_reply(REPLY, 4.0);
        assert_eq!(parsed.summary, "Built the watcher module and wired it to the bus.");
        assert_eq!(parsed.decisions.len(), 2);
        assert_eq!(parsed.files[0], "src/lib.rs:42 - added WatcherService");
        assert_eq!(parsed.errors[0], "panic on empty tail → guarded with saturating_sub");
        assert_eq!(parsed.progress, vec!["watcher complete"]);
    }

    #[test]
    fn headers_are_case_insensitive() {
        let reply = "summary:\nshort\n\ndecisions:\n- one\n";
        let parsed = parse_reply(reply, 4.0);
        assert_eq!(parsed.summary, "short");
        assert_eq!(parsed.decisions, vec!["one"]);
    }

    #[test]
    fn unstructured_reply_falls_back_to_summary() {
        let parsed = parse_reply("just a plain sentence with no headers", 4.0);
        assert_eq!(parsed.summary, "just a plain sentence with no headers");
        assert!(parsed.decisions.is_empty());
    }

    #[test]
    fn star_bullets_are_recognized_too() {
        let reply = "FILES:\n* a.rs:1 - did a thing\n";
        let parsed = parse_reply(reply, 4.0);
        assert_eq!(parsed.files, vec!["a.rs:1 - did a thing"]);
    }
}
