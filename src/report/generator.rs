//! Markdown and JSON report generation.
//!
//! Renders task results, orchestration status snapshots and health
//! summaries for the command line.

use crate::health::HealthSummary;
use crate::models::{HealthRecord, OrchestrationResult, OrchestrationStatus, Synthesis};
use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Write;
use std::path::Path;

/// Generate a complete Markdown report for one task result.
pub fn generate_markdown_report(result: &OrchestrationResult) -> String {
    let mut output = String::new();

    output.push_str("# Business Intelligence Report\n\n");

    output.push_str(&generate_task_section(result));

    if let Some(ref synthesis) = result.synthesis {
        output.push_str(&generate_synthesis_section(synthesis));
    }

    output.push_str(&generate_providers_section(result));

    output.push_str(&generate_footer());

    output
}

/// Generate the task overview section.
fn generate_task_section(result: &OrchestrationResult) -> String {
    let mut section = String::new();

    let status = if result.success {
        "✅ Success"
    } else {
        "❌ Failed"
    };

    section.push_str("## Task\n\n");
    section.push_str(&format!("- **Task ID:** `{}`\n", result.task_id));
    if let Some(task_type) = result.metadata.get("task_type").and_then(Value::as_str) {
        section.push_str(&format!("- **Task Type:** {}\n", task_type));
    }
    if let Some(rule) = result.metadata.get("rule_id").and_then(Value::as_str) {
        section.push_str(&format!("- **Rule:** {}\n", rule));
    }
    if let Some(mode) = result.metadata.get("execution_mode").and_then(Value::as_str) {
        section.push_str(&format!("- **Execution:** {}\n", mode));
    }
    section.push_str(&format!("- **Status:** {}\n", status));
    section.push_str(&format!(
        "- **Completed:** {}\n",
        result.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Duration:** {}ms\n", result.execution_time_ms));
    if !result.servers_used.is_empty() {
        section.push_str(&format!(
            "- **Providers Used:** {}\n",
            result.servers_used.join(", ")
        ));
    }
    if let Some(ref error) = result.error_message {
        section.push_str(&format!("- **Error:** {}\n", error));
    }
    section.push('\n');

    section
}

/// Generate the synthesis section.
fn generate_synthesis_section(synthesis: &Synthesis) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", synthesis.title));
    section.push_str(&format!(
        "**Success rate:** {:.0}% ({} of {} providers)\n\n",
        synthesis.success_rate * 100.0,
        synthesis.successful_providers,
        synthesis.total_providers
    ));

    if !synthesis.insights.is_empty() {
        section.push_str("### Insights\n\n");
        for insight in &synthesis.insights {
            section.push_str(&format!("- {}\n", insight));
        }
        section.push('\n');
    }

    if !synthesis.recommendations.is_empty() {
        section.push_str("### Recommendations\n\n");
        for (i, rec) in synthesis.recommendations.iter().enumerate() {
            section.push_str(&format!("{}. {}\n", i + 1, rec));
        }
        section.push('\n');
    }

    section
}

/// Generate the per-provider results table.
fn generate_providers_section(result: &OrchestrationResult) -> String {
    let mut section = String::new();

    section.push_str("## Provider Results\n\n");

    if result.per_server_results.is_empty() {
        section.push_str("No providers were called for this task.\n\n");
        return section;
    }

    section.push_str(&format!(
        "{} of {} provider calls succeeded.\n\n",
        result.successful_calls(),
        result.per_server_results.len()
    ));
    section.push_str("| Provider | Result | Time | Notes |\n");
    section.push_str("|:---|:---:|:---:|:---|\n");

    for (name, outcome) in &result.per_server_results {
        let badge = if outcome.success { "✅" } else { "❌" };
        let mut notes = Vec::new();
        if let Some(ref primary) = outcome.substituted_for {
            notes.push(format!("failover for {}", primary));
        }
        if let Some(ref error) = outcome.error {
            notes.push(error.replace('|', "\\|"));
        }
        section.push_str(&format!(
            "| {} | {} | {}ms | {} |\n",
            name,
            badge,
            outcome.response_time_ms,
            notes.join("; ")
        ));
    }
    section.push('\n');

    section
}

/// Generate a Markdown view of an orchestration status snapshot.
pub fn generate_status_markdown(status: &OrchestrationStatus) -> String {
    let mut output = String::new();

    output.push_str("# Orchestration Status\n\n");
    output.push_str("| Servers | Healthy | Active Tasks | Completed | Failed | Rules |\n");
    output.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    output.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} |\n\n",
        status.total_servers,
        status.healthy_servers,
        status.active_tasks,
        status.completed_tasks,
        status.failed_tasks,
        status.rule_count
    ));

    if !status.per_server_status.is_empty() {
        output.push_str("## Servers\n\n");
        output.push_str("| Server | Status |\n");
        output.push_str("|:---|:---|\n");
        for (name, server_status) in &status.per_server_status {
            output.push_str(&format!(
                "| {} | {} {} |\n",
                name,
                server_status.emoji(),
                server_status
            ));
        }
        output.push('\n');
    }

    output
}

/// Generate a Markdown view of the latest health probes.
pub fn generate_health_markdown(summary: &HealthSummary, records: &[HealthRecord]) -> String {
    let mut output = String::new();

    output.push_str("# Provider Health\n\n");
    output.push_str(&format!(
        "**Overall:** {} ({:.0}% healthy, {}/{})\n\n",
        summary.tier, summary.healthy_percentage, summary.healthy, summary.total
    ));

    output.push_str("| Server | Status | Response Time | Last Checked |\n");
    output.push_str("|:---|:---|:---:|:---|\n");
    for record in records {
        let response = record
            .response_time_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        let checked = record
            .last_health_check
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        output.push_str(&format!(
            "| {} | {} {} | {} | {} |\n",
            record.name,
            record.status.emoji(),
            record.status,
            response,
            checked
        ));
    }
    output.push('\n');

    output
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by biorch*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(result: &OrchestrationResult) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write report file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthTier;
    use crate::models::{ProviderOutcome, ServerStatus};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn create_test_result() -> OrchestrationResult {
        let mut per_server_results = BTreeMap::new();
        per_server_results.insert(
            "alpha".to_string(),
            ProviderOutcome::succeeded(json!({"score": 9}), 120),
        );
        let mut failed = ProviderOutcome::failed("provider returned HTTP 500: a|b", 40);
        failed.substituted_for = Some("beta".to_string());
        per_server_results.insert("backup".to_string(), failed);

        let mut metadata = serde_json::Map::new();
        metadata.insert("task_type".to_string(), json!("security_audit"));
        metadata.insert("rule_id".to_string(), json!("security_quality"));
        metadata.insert("execution_mode".to_string(), json!("parallel"));

        OrchestrationResult {
            task_id: "task-1".to_string(),
            success: true,
            per_server_results,
            execution_time_ms: 130,
            servers_used: vec!["alpha".to_string(), "backup".to_string()],
            synthesis_applied: true,
            synthesis: Some(Synthesis {
                synthesis_type: "security_quality_report".to_string(),
                title: "Security & Quality Report".to_string(),
                total_providers: 2,
                successful_providers: 1,
                failed_providers: vec!["backup".to_string()],
                success_rate: 0.5,
                insights: vec!["1 of 2 providers responded successfully (50%)".to_string()],
                recommendations: vec!["Fix findings".to_string()],
                combined_data: BTreeMap::new(),
            }),
            error_message: None,
            metadata,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_result());

        assert!(markdown.contains("# Business Intelligence Report"));
        assert!(markdown.contains("`task-1`"));
        assert!(markdown.contains("- **Rule:** security_quality"));
        assert!(markdown.contains("## Security & Quality Report"));
        assert!(markdown.contains("**Success rate:** 50% (1 of 2 providers)"));
        assert!(markdown.contains("1. Fix findings"));
        assert!(markdown.contains("1 of 2 provider calls succeeded."));
        assert!(markdown.contains("failover for beta"));
        assert!(markdown.contains("a\\|b"));
    }

    #[test]
    fn test_markdown_report_without_providers() {
        let mut result = create_test_result();
        result.success = false;
        result.synthesis = None;
        result.synthesis_applied = false;
        result.servers_used.clear();
        result.per_server_results.clear();
        result.error_message = Some("no healthy servers available for rule 'default'".to_string());

        let markdown = generate_markdown_report(&result);
        assert!(markdown.contains("❌ Failed"));
        assert!(markdown.contains("no healthy servers"));
        assert!(markdown.contains("No providers were called"));
        assert!(!markdown.contains("### Insights"));
    }

    #[test]
    fn test_generate_status_markdown() {
        let status = OrchestrationStatus {
            total_servers: 2,
            healthy_servers: 1,
            active_tasks: 0,
            completed_tasks: 4,
            failed_tasks: 1,
            rule_count: 3,
            per_server_status: [
                ("alpha".to_string(), ServerStatus::Healthy),
                ("beta".to_string(), ServerStatus::Offline),
            ]
            .into_iter()
            .collect(),
        };

        let markdown = generate_status_markdown(&status);
        assert!(markdown.contains("| 2 | 1 | 0 | 4 | 1 | 3 |"));
        assert!(markdown.contains("| beta | 🔴 Offline |"));
    }

    #[test]
    fn test_generate_health_markdown() {
        let records = vec![HealthRecord {
            name: "alpha".to_string(),
            status: ServerStatus::Unhealthy,
            last_health_check: None,
            response_time_ms: None,
        }];
        let summary = HealthSummary::from_records(&records);

        let markdown = generate_health_markdown(&summary, &records);
        assert_eq!(summary.tier, HealthTier::Critical);
        assert!(markdown.contains("| alpha | 🟠 Unhealthy | - | never |"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_result()).unwrap();

        assert!(json.contains("\"task_id\""));
        assert!(json.contains("\"per_server_results\""));
        assert!(json.contains("\"substituted_for\": \"beta\""));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        write_report("# hi\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hi\n");
    }
}
