//! Auto-detected transcript sources. Each CLI tool that shells out to an
//! assistant writes its transcripts under a dotfile directory in `$HOME`
//! with a `projects/` subfolder; `.claude-gml` is checked before
//! `.claude` so the shorter prefix never shadows the longer one.

use std::path::PathBuf;

use contextd_domain::config::SourceSpec;
use contextd_domain::SourceInfo;

#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub projects_dir: PathBuf,
    pub color: String,
}

pub fn discover(specs: &[SourceSpec]) -> Vec<Source> {
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };

    specs
        .iter()
        .filter_map(|spec| {
            let root = home.join(&spec.dir_name);
            let projects_dir = root.join("projects");
            if projects_dir.is_dir() {
                Some(Source {
                    name: spec.dir_name.trim_start_matches('.').to_string(),
                    projects_dir,
                    color: spec.color.clone(),
                })
            } else {
                None
            }
        })
        .collect()
}

pub fn color_for(specs: &[SourceSpec], source_name: &str) -> String {
    specs
        .iter()
        .find(|s| s.dir_name.trim_start_matches('.') == source_name)
        .map(|s| s.color.clone())
        .unwrap_or_else(|| "#6B7280".to_string())
}

/// The configured source list, for the dashboard's top-level `sources`
/// field, independent of which ones currently resolve to a real directory.
pub fn source_infos(specs: &[SourceSpec]) -> Vec<SourceInfo> {
    specs
        .iter()
        .map(|s| SourceInfo {
            name: s.dir_name.trim_start_matches('.').to_string(),
            color: s.color.clone(),
        })
        .collect()
}
