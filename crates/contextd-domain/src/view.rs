//! Read-side projections sent to the dashboard. These are deliberately
//! separate from the persisted entities in `model` — a `SessionView` adds
//! fields (like `source` and `color`) that only make sense once a session
//! has been matched up with the transcript source that feeds it, and
//! `DashboardUpdate` is the project-merged wire shape the bus actually
//! broadcasts, distinct from the session-per-row view used by the REST
//! session listing.

use serde::{Deserialize, Serialize};

use crate::{Session, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub task_description: String,
    pub current_tokens: u64,
    pub max_tokens: u64,
    pub context_usage: f64,
    pub status: SessionStatus,
    /// Directory name of the transcript source (`.claude`, `.opencode`, ...),
    /// absent for sessions that were never bound to a watched transcript.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub updated_at: String,
}

impl SessionView {
    pub fn from_session(session: &Session, source: Option<String>, color: Option<String>) -> Self {
        SessionView {
            id: session.id.to_string(),
            task_description: session.task_description.clone(),
            current_tokens: session.current_tokens,
            max_tokens: session.max_tokens,
            context_usage: session.context_usage(),
            status: session.status,
            source,
            color,
            updated_at: session.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStatus {
    pub sessions: Vec<SessionView>,
    pub active_count: usize,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,
    pub color: String,
}

/// One row of the dashboard's `projects` list — a `(source, project)`
/// binding merged down to whichever transcript is currently active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub name: String,
    #[serde(rename = "projectPath")]
    pub project_path: String,
    #[serde(rename = "currentTokens")]
    pub current_tokens: u64,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u64,
    #[serde(rename = "contextUsage")]
    pub context_usage: f64,
    pub pct: f64,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
    #[serde(rename = "isRealData")]
    pub is_real_data: bool,
    pub source: SourceInfo,
    #[serde(rename = "transcriptPath")]
    pub transcript_path: String,
}

impl ProjectStatus {
    pub fn display_name(source_name: &str, project_name: &str) -> String {
        format!("{source_name}\u{2014}{project_name}")
    }
}

/// Progress of a watcher `initial_sync` walk, broadcast as `sync:progress`
/// so a dashboard opening mid-startup can show a loading state instead of
/// an empty project list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProgress {
    #[serde(rename = "sourcesTotal")]
    pub sources_total: usize,
    #[serde(rename = "sourcesDone")]
    pub sources_done: usize,
    #[serde(rename = "currentSource")]
    pub current_source: String,
    #[serde(rename = "projectsFound")]
    pub projects_found: usize,
    pub done: bool,
}

/// Health snapshot of the (out-of-scope) MCP tool harness, broadcast as
/// `mcp:status`. The harness's own dispatch lives outside this system; this
/// is the minimal heartbeat the dashboard polls for, defaulting to
/// `unreachable` when nothing has reported in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpStatusSnapshot {
    pub status: McpHealth,
    #[serde(rename = "checkedAt")]
    pub checked_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpHealth {
    Ok,
    Degraded,
    Unreachable,
}

impl McpStatusSnapshot {
    pub fn unreachable() -> Self {
        McpStatusSnapshot { status: McpHealth::Unreachable, checked_at: chrono::Utc::now().to_rfc3339() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardUpdate {
    pub connected: bool,
    #[serde(rename = "projectCount")]
    pub project_count: usize,
    pub projects: Vec<ProjectStatus>,
    pub sources: Vec<SourceInfo>,
    #[serde(rename = "totalTokens")]
    pub total_tokens: u64,
    pub timestamp: String,
}

impl DashboardUpdate {
    pub fn empty() -> Self {
        DashboardUpdate {
            connected: true,
            project_count: 0,
            projects: Vec::new(),
            sources: Vec::new(),
            total_tokens: 0,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn from_projects(projects: Vec<ProjectStatus>, sources: Vec<SourceInfo>) -> Self {
        let total_tokens = projects.iter().map(|p| p.current_tokens).sum();
        DashboardUpdate {
            connected: true,
            project_count: projects.len(),
            projects,
            sources,
            total_tokens,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
