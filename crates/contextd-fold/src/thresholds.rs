//! Provider-aware context-usage thresholds.
//!
//! Pure function of `(context_usage, provider)`. Four named thresholds per
//! provider — checkpoint, safety-checkpoint, compress, spawn — checked
//! highest-first so the most urgent matching row wins.

use contextd_domain::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Continue,
    Checkpoint,
    Compress,
    Spawn,
}

impl RecommendedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RecommendedAction::Continue => "continue",
            RecommendedAction::Checkpoint => "checkpoint",
            RecommendedAction::Compress => "compress",
            RecommendedAction::Spawn => "spawn",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FoldRecommendation {
    pub should_fold: bool,
    pub urgency: Urgency,
    pub reason: String,
    pub recommended_action: RecommendedAction,
    pub provider: String,
}

struct Row {
    threshold: f64,
    action: RecommendedAction,
    urgency: Urgency,
    reason: &'static str,
}

/// Four rows, spawn first (highest threshold) down to checkpoint, so the
/// caller can stop at the first match.
fn rows_for(provider: Provider) -> [Row; 4] {
    let (checkpoint, safety, compress, spawn) = match provider {
        Provider::Anthropic | Provider::Openai | Provider::Mistral => (0.60, 0.75, 0.85, 0.95),
        Provider::Glm => (0.50, 0.65, 0.75, 0.85),
        Provider::Google => (0.70, 0.80, 0.90, 0.97),
    };
    [
        Row {
            threshold: spawn,
            action: RecommendedAction::Spawn,
            urgency: Urgency::Critical,
            reason: "context usage has reached the spawn threshold",
        },
        Row {
            threshold: compress,
            action: RecommendedAction::Compress,
            urgency: Urgency::High,
            reason: "context usage has reached the compress threshold",
        },
        Row {
            threshold: safety,
            action: RecommendedAction::Checkpoint,
            urgency: Urgency::High,
            reason: "context usage has reached the safety-checkpoint threshold",
        },
        Row {
            threshold: checkpoint,
            action: RecommendedAction::Checkpoint,
            urgency: Urgency::Medium,
            reason: "context usage has reached the checkpoint threshold",
        },
    ]
}

pub fn should_fold(context_usage: f64, provider: Provider) -> FoldRecommendation {
    for row in rows_for(provider) {
        if context_usage >= row.threshold {
            return FoldRecommendation {
                should_fold: true,
                urgency: row.urgency,
                reason: row.reason.to_string(),
                recommended_action: row.action,
                provider: provider.as_str().to_string(),
            };
        }
    }
    FoldRecommendation {
        should_fold: false,
        urgency: Urgency::Low,
        reason: "context usage acceptable".to_string(),
        recommended_action: RecommendedAction::Continue,
        provider: provider.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_below_all_thresholds_is_continue() {
        let rec = should_fold(0.3, Provider::Anthropic);
        assert!(!rec.should_fold);
        assert_eq!(rec.recommended_action, RecommendedAction::Continue);
        assert_eq!(rec.urgency, Urgency::Low);
    }

    #[test]
    fn anthropic_checkpoint_boundary() {
        let rec = should_fold(0.60, Provider::Anthropic);
        assert_eq!(rec.recommended_action, RecommendedAction::Checkpoint);
        assert_eq!(rec.urgency, Urgency::Medium);
    }

    #[test]
    fn anthropic_spawn_threshold_wins_over_lower_rows() {
        let rec = should_fold(0.97, Provider::Anthropic);
        assert_eq!(rec.recommended_action, RecommendedAction::Spawn);
        assert_eq!(rec.urgency, Urgency::Critical);
    }

    #[test]
    fn glm_has_lower_thresholds_than_anthropic() {
        let anthropic = should_fold(0.55, Provider::Anthropic);
        let glm = should_fold(0.55, Provider::Glm);
        assert!(!anthropic.should_fold);
        assert!(glm.should_fold);
    }

    #[test]
    fn google_has_higher_thresholds_than_anthropic() {
        let rec = should_fold(0.65, Provider::Google);
        assert!(!rec.should_fold);
    }

    #[test]
    fn monotonic_in_context_usage() {
        let low = should_fold(0.40, Provider::Openai);
        let high = should_fold(0.96, Provider::Openai);
        assert!(!low.should_fold);
        assert!(high.should_fold);
    }
}
