//! Post-run processing utilities.
//!
//! Handles auto-save and exports after a run finishes.

use crate::model::CampaignReport;
use crate::storage;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct PostRunOptions {
    pub auto_save: bool,
    pub export_json: Option<PathBuf>,
    pub export_csv: Option<PathBuf>,
}

/// Result of post-run processing, ready for presentation layers.
#[derive(Debug, Default)]
pub struct ProcessedRun {
    pub export_messages: Vec<String>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Process a finished run: auto-save and export. Failures become messages, never errors.
pub fn process_run_completion(opts: &PostRunOptions, report: &CampaignReport) -> ProcessedRun {
    let auto_saved_path = if opts.auto_save {
        match storage::save_run(report) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "auto-save failed");
                None
            }
        }
    } else {
        None
    };

    let mut export_messages = Vec::new();
    if let Some(export_path) = opts.export_json.as_deref() {
        match storage::export_json(export_path, report) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    if let Some(export_path) = opts.export_csv.as_deref() {
        match storage::export_csv(export_path, report) {
            Ok(_) => export_messages.push(format!("Exported CSV: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export CSV failed: {e:#}")),
        }
    }

    ProcessedRun {
        export_messages,
        auto_saved_path,
    }
}
