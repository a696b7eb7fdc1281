//! Campaign report persistence and exports.
//!
//! Reports are written for the operator's records only. A run is never resumed from them.

use crate::model::{CampaignReport, LogKind};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn runs_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("no data directory available on this platform")?;
    Ok(base.join("campaign-dispatch").join("runs"))
}

/// Save the report as JSON under the data directory and return its path.
pub fn save_run(report: &CampaignReport) -> Result<PathBuf> {
    save_run_in(&runs_dir()?, report)
}

pub(crate) fn save_run_in(dir: &Path, report: &CampaignReport) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let stamp: String = report
        .started_at
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let path = dir.join(format!("campaign-{stamp}.json"));
    export_json(&path, report)?;
    Ok(path)
}

pub fn export_json(path: &Path, report: &CampaignReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// One row per log entry, chronological.
pub fn export_csv(path: &Path, report: &CampaignReport) -> Result<()> {
    fs::write(path, render_csv(report)).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn render_csv(report: &CampaignReport) -> String {
    let mut out = String::from("at,outcome,recipient,detail\n");
    for e in &report.log {
        let outcome = match e.kind {
            LogKind::Sent => "sent",
            LogKind::Failed => "failed",
            LogKind::Skipped => "skipped",
        };
        out.push_str(&format!(
            "{},{},{},{}\n",
            csv_field(&e.at),
            outcome,
            csv_field(&e.recipient),
            csv_field(e.detail.as_deref().unwrap_or(""))
        ));
    }
    out
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
