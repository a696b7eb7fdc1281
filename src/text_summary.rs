//! Text summary builder for CLI output.

use crate::model::{CampaignReport, RunStatus};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(report: &CampaignReport) -> TextSummary {
    let mut lines = Vec::new();

    let status = match report.status {
        RunStatus::Completed => "Campaign completed",
        RunStatus::Stopped => "Campaign stopped by operator",
        RunStatus::Idle | RunStatus::Running => "Campaign did not finish",
    };
    lines.push(status.to_string());
    lines.push(format!(
        "Processed: {}/{} recipients",
        report.processed, report.total
    ));
    lines.push(format!(
        "Sent: {}  Failed: {}  Skipped (invalid phone): {}",
        report.sent, report.failed, report.skipped
    ));
    lines.push(format!(
        "Elapsed: {} (estimated {})",
        humantime::format_duration(round_secs(report.elapsed)),
        humantime::format_duration(report.estimated_duration)
    ));
    if report.status == RunStatus::Stopped && report.processed < report.total {
        lines.push(format!(
            "Not attempted: {} recipients",
            report.total - report.processed
        ));
    }
    if report.failed > 0 {
        lines.push("Failures:".to_string());
        for e in report
            .log
            .iter()
            .filter(|e| e.kind == crate::model::LogKind::Failed)
        {
            lines.push(format!("  {e}"));
        }
    }

    TextSummary { lines }
}

fn round_secs(d: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_secs(d.as_secs())
}
