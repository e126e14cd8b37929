//! Rule matching.

use crate::models::{BusinessTask, OrchestrationRule};
use tracing::debug;

/// Maps a task type to its orchestration rule.
///
/// The first configured rule listing the task type wins. When none does,
/// a built-in single-provider rule is returned.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    rules: Vec<OrchestrationRule>,
    fallback: OrchestrationRule,
}

impl RuleMatcher {
    pub fn new(rules: Vec<OrchestrationRule>, default_provider: &str) -> Self {
        Self {
            rules,
            fallback: OrchestrationRule::fallback(default_provider),
        }
    }

    /// Rule for `task`, or the fallback rule.
    pub fn match_task(&self, task: &BusinessTask) -> &OrchestrationRule {
        match self.find(&task.task_type) {
            Some(rule) => {
                debug!("Task {} matched rule {}", task.task_id, rule.rule_id);
                rule
            }
            None => {
                debug!(
                    "No rule for task type '{}', using default rule",
                    task.task_type
                );
                &self.fallback
            }
        }
    }

    /// First configured rule listing `task_type`.
    pub fn find(&self, task_type: &str) -> Option<&OrchestrationRule> {
        self.rules.iter().find(|r| r.task_types.contains(task_type))
    }

    /// Number of configured rules, excluding the fallback.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskPriority;

    fn rule(id: &str, types: &[&str], sequence: &[&str]) -> OrchestrationRule {
        OrchestrationRule {
            rule_id: id.to_string(),
            task_types: types.iter().map(|t| t.to_string()).collect(),
            server_sequence: sequence.iter().map(|s| s.to_string()).collect(),
            synthesis_type: "general".to_string(),
            parallel_execution: true,
            priority: TaskPriority::Medium,
        }
    }

    fn task(task_type: &str) -> BusinessTask {
        BusinessTask::builder(task_type).build().unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let matcher = RuleMatcher::new(
            vec![
                rule("first", &["audit", "review"], &["alpha"]),
                rule("second", &["audit"], &["beta"]),
            ],
            "fallback-provider",
        );

        assert_eq!(matcher.match_task(&task("audit")).rule_id, "first");
        assert_eq!(matcher.match_task(&task("review")).rule_id, "first");
    }

    #[test]
    fn test_unknown_type_uses_default_rule() {
        let matcher = RuleMatcher::new(vec![rule("demo", &["demo"], &["alpha"])], "omega");

        let matched = matcher.match_task(&task("unknown123"));
        assert_eq!(matched.rule_id, "default");
        assert_eq!(matched.server_sequence, vec!["omega"]);
        assert_eq!(matched.synthesis_type, "general");
        assert!(matched.parallel_execution);
        assert_eq!(matched.priority, TaskPriority::Low);
    }

    #[test]
    fn test_matching_is_deterministic() {
        let matcher = RuleMatcher::new(
            vec![
                rule("a", &["x"], &["alpha"]),
                rule("b", &["x", "y"], &["beta"]),
            ],
            "omega",
        );
        for _ in 0..10 {
            assert_eq!(matcher.match_task(&task("x")).rule_id, "a");
            assert_eq!(matcher.match_task(&task("y")).rule_id, "b");
        }
        assert_eq!(matcher.rule_count(), 2);
    }
}
