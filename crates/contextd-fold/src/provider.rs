//! Active-provider detection from the CCS (Claude Config Switcher) config
//! file, cached for a short TTL so a busy fold loop doesn't stat and parse
//! the file on every evaluation.

use std::time::{Duration, Instant};

use contextd_domain::{FoldConfig, Provider};
use parking_lot::RwLock;

/// Detects and caches the active provider. One instance is shared across
/// a server's lifetime; detection reads happen behind a short-TTL cache so
/// concurrent callers never block on the filesystem.
pub struct ProviderDetector {
    config_path: std::path::PathBuf,
    ttl: Duration,
    cached: RwLock<Option<(Provider, Instant)>>,
}

impl ProviderDetector {
    pub fn new(cfg: &FoldConfig) -> Self {
        ProviderDetector {
            config_path: cfg.ccs_config_path.clone(),
            ttl: Duration::from_secs(cfg.provider_cache_ttl_secs),
            cached: RwLock::new(None),
        }
    }

    /// Returns the currently active provider, re-reading the CCS config
    /// file once the cached value is older than the configured TTL.
    pub fn detect(&self) -> Provider {
        if let Some((provider, at)) = *self.cached.read() {
            if at.elapsed() < self.ttl {
                return provider;
            }
        }
        let provider = self.read_config();
        *self.cached.write() = Some((provider, Instant::now()));
        provider
    }

    fn read_config(&self) -> Provider {
        let Ok(raw) = std::fs::read_to_string(&self.config_path) else {
            return Provider::Anthropic;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
            return Provider::Anthropic;
        };
        let current = value.get("current").and_then(|v| v.as_str()).unwrap_or("anthropic");
        Provider::detect_from_str(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn detector_for(json: &str) -> (ProviderDetector, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "{json}").unwrap();
        let cfg = FoldConfig { ccs_config_path: path, provider_cache_ttl_secs: 5, ..Default::default() };
        (ProviderDetector::new(&cfg), dir)
    }

    #[test]
    fn missing_file_defaults_to_anthropic() {
        let cfg = FoldConfig {
            ccs_config_path: "/nonexistent/path/config.json".into(),
            ..Default::default()
        };
        assert_eq!(ProviderDetector::new(&cfg).detect(), Provider::Anthropic);
    }

    #[test]
    fn detects_glm_from_current_field() {
        let (det, _dir) = detector_for(r#"{"current": "glm-4.5"}"#);
        assert_eq!(det.detect(), Provider::Glm);
    }

    #[test]
    fn detects_google_from_gemini_alias() {
        let (det, _dir) = detector_for(r#"{"current": "gemini-pro"}"#);
        assert_eq!(det.detect(), Provider::Google);
    }

    #[test]
    fn caches_value_within_ttl() {
        let (det, dir) = detector_for(r#"{"current": "glm-4.5"}"#);
        assert_eq!(det.detect(), Provider::Glm);

        std::fs::write(dir.path().join("config.json"), r#"{"current": "gemini-pro"}"#).unwrap();
        // Still within the 5s TTL, so the stale cached value wins.
        assert_eq!(det.detect(), Provider::Glm);
    }
}
