//! Built-in synthesis templates.

use super::{Tally, Template};

/// Shared opening insight.
fn coverage(tally: &Tally) -> String {
    format!(
        "{} of {} providers responded successfully ({}%)",
        tally.successful,
        tally.total,
        tally.percent()
    )
}

fn failed_list(tally: &Tally) -> Option<String> {
    if tally.failed.is_empty() {
        None
    } else {
        Some(format!("Unavailable providers: {}", tally.failed.join(", ")))
    }
}

pub fn general(tally: &Tally) -> Template {
    let mut insights = vec![coverage(tally)];
    insights.extend(failed_list(tally));

    let mut recommendations = Vec::new();
    if tally.successful == 0 {
        recommendations.push("No provider data was collected; retry once providers recover".to_string());
    } else if !tally.failed.is_empty() {
        recommendations.push("Review failed providers before relying on this report".to_string());
    } else {
        recommendations.push("All providers contributed; no follow-up required".to_string());
    }

    Template {
        title: "Business Analysis".to_string(),
        insights,
        recommendations,
    }
}

pub fn security_quality_report(tally: &Tally) -> Template {
    let mut insights = vec![
        coverage(tally),
        format!(
            "Security and quality assessment combined from {} source(s)",
            tally.successful
        ),
    ];
    insights.extend(failed_list(tally));

    let mut recommendations = vec![
        "Address critical security findings before the next release".to_string(),
        "Track code quality metrics against the previous audit".to_string(),
    ];
    if !tally.failed.is_empty() {
        recommendations.push(format!(
            "Re-run the audit once {} recover(s); coverage is incomplete",
            tally.failed.join(", ")
        ));
    }

    Template {
        title: "Security & Quality Report".to_string(),
        insights,
        recommendations,
    }
}

pub fn project_health_dashboard(tally: &Tally) -> Template {
    let health = match tally.percent() {
        90..=100 => "strong",
        70..=89 => "stable",
        50..=69 => "at risk",
        _ => "critical",
    };

    let mut insights = vec![
        coverage(tally),
        format!("Data coverage for the project dashboard is {}", health),
    ];
    insights.extend(failed_list(tally));

    let mut recommendations = vec!["Review open work items against delivery milestones".to_string()];
    if tally.success_rate < 0.7 {
        recommendations.push("Restore missing data sources before sharing the dashboard".to_string());
    }

    Template {
        title: "Project Health Dashboard".to_string(),
        insights,
        recommendations,
    }
}

pub fn executive_business_intelligence(tally: &Tally) -> Template {
    let confidence = if tally.total > 0 && tally.successful == tally.total {
        "high"
    } else if tally.success_rate >= 0.5 {
        "moderate"
    } else {
        "low"
    };

    let mut insights = vec![
        coverage(tally),
        format!("Executive summary confidence: {}", confidence),
    ];
    insights.extend(failed_list(tally));

    let mut recommendations = vec![
        "Share the summary with stakeholders".to_string(),
        "Align next-quarter priorities with the combined findings".to_string(),
    ];
    if confidence != "high" {
        recommendations.push("Flag incomplete data sources in the executive briefing".to_string());
    }

    Template {
        title: "Executive Business Intelligence".to_string(),
        insights,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(successful: usize, failed: &[&str]) -> Tally {
        let total = successful + failed.len();
        Tally {
            total,
            successful,
            failed: failed.iter().map(|s| s.to_string()).collect(),
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
        }
    }

    #[test]
    fn test_general_all_succeeded() {
        let t = general(&tally(3, &[]));
        assert_eq!(t.insights, vec!["3 of 3 providers responded successfully (100%)"]);
        assert_eq!(t.recommendations.len(), 1);
    }

    #[test]
    fn test_general_lists_failures() {
        let t = general(&tally(1, &["beta"]));
        assert!(t.insights.iter().any(|i| i == "Unavailable providers: beta"));
        assert!(t.recommendations[0].contains("failed providers"));
    }

    #[test]
    fn test_security_report_notes_incomplete_coverage() {
        let complete = security_quality_report(&tally(2, &[]));
        let partial = security_quality_report(&tally(1, &["scanner"]));
        assert_eq!(complete.recommendations.len(), 2);
        assert_eq!(partial.recommendations.len(), 3);
        assert!(partial.recommendations[2].contains("scanner"));
    }

    #[test]
    fn test_dashboard_health_bands() {
        let strong = project_health_dashboard(&tally(10, &[]));
        assert!(strong.insights[1].ends_with("strong"));

        let critical = project_health_dashboard(&tally(1, &["a", "b", "c"]));
        assert!(critical.insights[1].ends_with("critical"));
        assert_eq!(critical.recommendations.len(), 2);
    }

    #[test]
    fn test_executive_confidence() {
        let high = executive_business_intelligence(&tally(2, &[]));
        assert!(high.insights[1].ends_with("high"));
        assert_eq!(high.recommendations.len(), 2);

        let low = executive_business_intelligence(&tally(0, &["a"]));
        assert!(low.insights[1].ends_with("low"));
        assert_eq!(low.recommendations.len(), 3);
    }
}
