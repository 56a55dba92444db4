//! Shared entities, error type, config, and trace events for contextd.

pub mod config;
pub mod error;
pub mod model;
pub mod trace;
pub mod view;

pub use config::Config;
pub use error::{Error, Result};
pub use model::*;
pub use trace::TraceEvent;
pub use view::{
    DashboardStatus, DashboardUpdate, McpHealth, McpStatusSnapshot, ProjectStatus, SessionView,
    SourceInfo, SyncProgress,
};
