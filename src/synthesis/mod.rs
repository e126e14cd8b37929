//! Result synthesis.
//!
//! Turns the per-provider outcomes of a task into one [`Synthesis`]. The
//! shape of the report is chosen by the rule's `synthesis_type`, looked up
//! in a registry of template functions; unknown types use "general".

mod templates;

pub use templates::{
    executive_business_intelligence, general, project_health_dashboard, security_quality_report,
};

use crate::models::{ProviderOutcome, Synthesis};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Strategy name used when a rule's synthesis type is unknown.
pub const DEFAULT_SYNTHESIS: &str = "general";

/// Counts a template works from.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally {
    pub total: usize,
    pub successful: usize,
    /// Names of providers whose call failed, sorted.
    pub failed: Vec<String>,
    /// `successful / total`, or 0.0 when nothing was dispatched.
    pub success_rate: f64,
}

impl Tally {
    pub fn from_outcomes(outcomes: &BTreeMap<String, ProviderOutcome>) -> Self {
        let total = outcomes.len();
        let failed: Vec<String> = outcomes
            .iter()
            .filter(|(_, o)| !o.success)
            .map(|(name, _)| name.clone())
            .collect();
        let successful = total - failed.len();
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };

        Self {
            total,
            successful,
            failed,
            success_rate,
        }
    }

    /// Success rate as a whole percentage.
    pub fn percent(&self) -> u32 {
        (self.success_rate * 100.0).round() as u32
    }
}

/// Text a template produces for one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub title: String,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

pub type SynthesizeFn = fn(&Tally) -> Template;

/// Registry of synthesis strategies keyed by synthesis type.
#[derive(Clone)]
pub struct ResultSynthesizer {
    strategies: BTreeMap<String, SynthesizeFn>,
}

impl Default for ResultSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSynthesizer {
    /// Registry holding the built-in templates.
    pub fn new() -> Self {
        let mut synthesizer = Self {
            strategies: BTreeMap::new(),
        };
        synthesizer.register(DEFAULT_SYNTHESIS, general);
        synthesizer.register("security_quality_report", security_quality_report);
        synthesizer.register("project_health_dashboard", project_health_dashboard);
        synthesizer.register(
            "executive_business_intelligence",
            executive_business_intelligence,
        );
        synthesizer
    }

    /// Add or replace a strategy.
    pub fn register(&mut self, synthesis_type: &str, strategy: SynthesizeFn) {
        self.strategies.insert(synthesis_type.to_string(), strategy);
    }

    /// Build the report for `outcomes`.
    ///
    /// Only dispatched providers appear in `outcomes`, so the success rate
    /// never counts providers that were skipped.
    pub fn synthesize(
        &self,
        outcomes: &BTreeMap<String, ProviderOutcome>,
        synthesis_type: &str,
    ) -> Synthesis {
        let (applied, strategy) = match self.strategies.get_key_value(synthesis_type) {
            Some((name, strategy)) => (name.as_str(), *strategy),
            None => {
                debug!(
                    "Unknown synthesis type '{}', using {}",
                    synthesis_type, DEFAULT_SYNTHESIS
                );
                (DEFAULT_SYNTHESIS, general as SynthesizeFn)
            }
        };

        let tally = Tally::from_outcomes(outcomes);
        let template = strategy(&tally);

        Synthesis {
            synthesis_type: applied.to_string(),
            title: template.title,
            total_providers: tally.total,
            successful_providers: tally.successful,
            failed_providers: tally.failed,
            success_rate: tally.success_rate,
            insights: template.insights,
            recommendations: template.recommendations,
            combined_data: combined_data(outcomes),
        }
    }
}

/// Successful providers' bodies keyed by provider name.
fn combined_data(outcomes: &BTreeMap<String, ProviderOutcome>) -> BTreeMap<String, Value> {
    outcomes
        .iter()
        .filter(|(_, o)| o.success)
        .filter_map(|(name, o)| o.data.clone().map(|data| (name.clone(), data)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcomes(entries: &[(&str, bool)]) -> BTreeMap<String, ProviderOutcome> {
        entries
            .iter()
            .map(|(name, ok)| {
                let outcome = if *ok {
                    ProviderOutcome::succeeded(json!({"provider": name}), 10)
                } else {
                    ProviderOutcome::failed("boom", 10)
                };
                (name.to_string(), outcome)
            })
            .collect()
    }

    #[test]
    fn test_success_rate_counts_dispatched_only() {
        let synthesis =
            ResultSynthesizer::new().synthesize(&outcomes(&[("alpha", true)]), "general");
        assert_eq!(synthesis.total_providers, 1);
        assert_eq!(synthesis.successful_providers, 1);
        assert_eq!(synthesis.success_rate, 1.0);
        assert!(synthesis.failed_providers.is_empty());
    }

    #[test]
    fn test_partial_failure() {
        let synthesis = ResultSynthesizer::new().synthesize(
            &outcomes(&[("alpha", true), ("beta", false), ("gamma", true), ("delta", false)]),
            "security_quality_report",
        );
        assert_eq!(synthesis.success_rate, 0.5);
        assert_eq!(synthesis.failed_providers, vec!["beta", "delta"]);
        assert_eq!(synthesis.combined_data.len(), 2);
        assert_eq!(synthesis.combined_data["gamma"], json!({"provider": "gamma"}));
    }

    #[test]
    fn test_unknown_type_falls_back_to_general() {
        let synthesizer = ResultSynthesizer::new();
        let input = outcomes(&[("alpha", true)]);

        let unknown = synthesizer.synthesize(&input, "no_such_template");
        let general = synthesizer.synthesize(&input, "general");
        assert_eq!(unknown.synthesis_type, "general");
        assert_eq!(unknown, general);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let synthesizer = ResultSynthesizer::new();
        let input = outcomes(&[("alpha", true), ("beta", false)]);
        assert_eq!(
            synthesizer.synthesize(&input, "project_health_dashboard"),
            synthesizer.synthesize(&input, "project_health_dashboard")
        );
    }

    #[test]
    fn test_empty_outcomes_have_zero_rate() {
        let synthesis = ResultSynthesizer::new().synthesize(&BTreeMap::new(), "general");
        assert_eq!(synthesis.total_providers, 0);
        assert_eq!(synthesis.success_rate, 0.0);
    }

    #[test]
    fn test_custom_strategy_can_be_registered() {
        fn terse(tally: &Tally) -> Template {
            Template {
                title: "Terse".to_string(),
                insights: vec![format!("{} ok", tally.successful)],
                recommendations: Vec::new(),
            }
        }

        let mut synthesizer = ResultSynthesizer::new();
        synthesizer.register("terse", terse);

        let synthesis = synthesizer.synthesize(&outcomes(&[("alpha", true)]), "terse");
        assert_eq!(synthesis.title, "Terse");
        assert_eq!(synthesis.insights, vec!["1 ok"]);
    }

    #[test]
    fn test_builtin_types_registered() {
        let synthesizer = ResultSynthesizer::new();
        let input = outcomes(&[("alpha", true)]);
        for synthesis_type in [
            "executive_business_intelligence",
            "general",
            "project_health_dashboard",
            "security_quality_report",
        ] {
            let synthesis = synthesizer.synthesize(&input, synthesis_type);
            assert_eq!(synthesis.synthesis_type, synthesis_type);
        }
    }
}
