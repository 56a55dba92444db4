//! Canonical entity types shared by the Store, Watcher, FoldEngine,
//! MemoryIndex, and EventBus. Both the Store's SQL rows and the Watcher's
//! in-memory bindings project into these types, per the "one canonical
//! record type" guidance in the spec's design notes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Terminated,
    Inactive,
}

impl SessionStatus {
    /// Terminal states are write-once: further mutations other than read
    /// are rejected once a session reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Terminated => "terminated",
            SessionStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "terminated" => Some(SessionStatus::Terminated),
            "inactive" => Some(SessionStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub task_description: String,
    pub max_tokens: u64,
    pub current_tokens: u64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// `current_tokens / max_tokens`, in `[0, 1]`. `max_tokens == 0` reads
    /// as fully consumed rather than dividing by zero.
    pub fn context_usage(&self) -> f64 {
        if self.max_tokens == 0 {
            return 1.0;
        }
        (self.current_tokens as f64 / self.max_tokens as f64).min(1.0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Decision,
    Action,
    Error,
    Progress,
    Context,
    Other,
}

impl MemoryCategory {
    /// Protected categories are never evicted by curation regardless of
    /// access count or priority.
    pub fn is_protected(self) -> bool {
        matches!(self, MemoryCategory::Decision | MemoryCategory::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryCategory::Decision => "decision",
            MemoryCategory::Action => "action",
            MemoryCategory::Error => "error",
            MemoryCategory::Progress => "progress",
            MemoryCategory::Context => "context",
            MemoryCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "decision" => Some(MemoryCategory::Decision),
            "action" => Some(MemoryCategory::Action),
            "error" => Some(MemoryCategory::Error),
            "progress" => Some(MemoryCategory::Progress),
            "context" => Some(MemoryCategory::Context),
            "other" => Some(MemoryCategory::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    // Ord derive gives Low < Normal < High; callers that want
    // high-first ordering sort descending.
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Priority::High),
            "normal" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub session_id: Uuid,
    pub content: String,
    pub category: MemoryCategory,
    pub priority: Priority,
    /// Embedding vector, dimension 384/1024/1536. `None` until
    /// `embed_session_memories` populates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub access_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Checkpoint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub session_id: Uuid,
    pub label: String,
    /// Opaque snapshot of session fields at creation time.
    pub state: serde_json::Value,
    pub context_usage: f64,
    pub memories_snapshot: Vec<Uuid>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionLineage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLineage {
    pub id: Uuid,
    pub parent_session_id: Option<Uuid>,
    pub child_session_id: Uuid,
    pub handoff_reason: String,
    pub handoff_prompt: String,
    pub checkpoint_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pattern
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSource {
    Manual,
    Llm,
    Generic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Uuid,
    pub session_id: Uuid,
    pub pattern_name: String,
    pub pattern_description: String,
    pub code_example: String,
    pub tags: Vec<String>,
    pub source_mode: PatternSource,
    pub source_files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LlmConfig (Store contract only — encryption is an external collaborator)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    Openai,
    Mistral,
    Google,
    Glm,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Openai => "openai",
            Provider::Mistral => "mistral",
            Provider::Google => "google",
            Provider::Glm => "glm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "anthropic" => Some(Provider::Anthropic),
            "openai" => Some(Provider::Openai),
            "mistral" => Some(Provider::Mistral),
            "google" => Some(Provider::Google),
            "glm" => Some(Provider::Glm),
            _ => None,
        }
    }

    /// Loose match against an arbitrary CCS `current` value, which may be a
    /// model name or endpoint label rather than one of our own identifiers.
    /// Anthropic is the fallback: it's the default provider and the one
    /// CCS's own default config omits from its label.
    pub fn detect_from_str(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("glm") {
            Provider::Glm
        } else if lower.contains("openai") || lower.contains("gpt") {
            Provider::Openai
        } else if lower.contains("google") || lower.contains("gemini") {
            Provider::Google
        } else if lower.contains("mistral") {
            Provider::Mistral
        } else {
            Provider::Anthropic
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfigEntry {
    pub provider: Provider,
    pub encrypted_api_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Metrics (supplemental — observability ambient stack)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub active_sessions: u64,
    pub total_memories: u64,
    pub total_checkpoints: u64,
    pub avg_context_usage: f64,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(current: u64, max: u64) -> Session {
        Session {
            id: Uuid::new_v4(),
            task_description: "test".into(),
            max_tokens: max,
            current_tokens: current,
            status: SessionStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn context_usage_ratio() {
        assert_eq!(session(100_000, 200_000).context_usage(), 0.5);
    }

    #[test]
    fn context_usage_clamped_to_one() {
        assert_eq!(session(300_000, 200_000).context_usage(), 1.0);
    }

    #[test]
    fn context_usage_zero_max_is_fully_consumed() {
        assert_eq!(session(0, 0).context_usage(), 1.0);
    }

    #[test]
    fn terminal_states() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Terminated.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(!SessionStatus::Inactive.is_terminal());
    }

    #[test]
    fn protected_categories() {
        assert!(MemoryCategory::Decision.is_protected());
        assert!(MemoryCategory::Error.is_protected());
        assert!(!MemoryCategory::Action.is_protected());
        assert!(!MemoryCategory::Progress.is_protected());
    }

    #[test]
    fn provider_detection_falls_back_to_anthropic() {
        assert_eq!(Provider::detect_from_str("claude-sonnet"), Provider::Anthropic);
        assert_eq!(Provider::detect_from_str("zhipu-glm-4"), Provider::Glm);
        assert_eq!(Provider::detect_from_str("gpt-4o"), Provider::Openai);
        assert_eq!(Provider::detect_from_str("gemini-1.5-pro"), Provider::Google);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Terminated,
            SessionStatus::Inactive,
        ] {
            assert_eq!(SessionStatus::parse(s.as_str()), Some(s));
        }
    }
}
