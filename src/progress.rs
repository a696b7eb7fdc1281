//! Observer-side view of a running campaign.
//!
//! Folds [`CampaignEvent`]s into the `{active, current, total, log}` shape a display
//! renders. The engine is the only writer; this is a read model.

use crate::model::{CampaignEvent, LogEntry, LogKind, RunStatus};
use std::collections::VecDeque;

/// Log entries retained for display when no explicit cap is given.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
pub struct ProgressReporter {
    pub active: bool,
    pub current_index: usize,
    pub total: usize,
    pub status: RunStatus,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub info: String,
    log: VecDeque<LogEntry>,
    log_capacity: Option<usize>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::with_log_capacity(Some(DEFAULT_LOG_CAPACITY))
    }
}

impl ProgressReporter {
    /// `None` keeps every entry.
    pub fn with_log_capacity(log_capacity: Option<usize>) -> Self {
        Self {
            active: false,
            current_index: 0,
            total: 0,
            status: RunStatus::Idle,
            sent: 0,
            failed: 0,
            skipped: 0,
            info: String::new(),
            log: VecDeque::new(),
            log_capacity,
        }
    }

    pub fn apply(&mut self, event: &CampaignEvent) {
        match event {
            CampaignEvent::Started { total } => {
                *self = Self::with_log_capacity(self.log_capacity);
                self.total = *total;
                self.active = true;
                self.status = RunStatus::Running;
            }
            CampaignEvent::Progress(snap) => {
                self.active = snap.active;
                self.total = snap.total;
                // The cursor only moves forward.
                self.current_index = self.current_index.max(snap.current_index.min(snap.total));
            }
            CampaignEvent::Log(entry) => {
                match entry.kind {
                    LogKind::Sent => self.sent += 1,
                    LogKind::Failed => self.failed += 1,
                    LogKind::Skipped => self.skipped += 1,
                }
                self.log.push_front(entry.clone());
                if let Some(cap) = self.log_capacity {
                    self.log.truncate(cap);
                }
            }
            CampaignEvent::Info(info) => self.info = info.to_message(),
            CampaignEvent::Finished { report } => {
                self.active = false;
                self.status = report.status;
                self.current_index = report.processed;
                self.total = report.total;
            }
        }
    }

    /// Newest first.
    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// Share of recipients processed, `0.0..=100.0`. A run with no recipients reads 0
    /// until it has finished, then 100.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return if self.status.is_finished() { 100.0 } else { 0.0 };
        }
        self.current_index as f64 / self.total as f64 * 100.0
    }

    pub fn status_line(&self) -> String {
        format!(
            "[{}/{}] {:.0}%  sent {}  failed {}  skipped {}",
            self.current_index,
            self.total,
            self.percent(),
            self.sent,
            self.failed,
            self.skipped
        )
    }
}
