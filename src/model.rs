use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Placeholder replaced by the recipient's first name.
pub const DEFAULT_PLACEHOLDER: &str = "{nome}";
/// Country prefix prepended to domestic (10/11 digit) numbers.
pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// One supporter targeted by a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SupporterRow")]
pub struct Recipient {
    pub display_name: String,
    pub raw_phone: String,
}

impl Recipient {
    pub fn new(display_name: impl Into<String>, raw_phone: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            raw_phone: raw_phone.into(),
        }
    }
}

/// A supporter row as exports spell it. Several column names may be present at once;
/// the first non-blank one wins, in field order.
#[derive(Deserialize)]
struct SupporterRow {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    nome: Option<String>,
    #[serde(default, deserialize_with = "deserialize_phone")]
    raw_phone: Option<String>,
    #[serde(default, deserialize_with = "deserialize_phone")]
    phone: Option<String>,
    #[serde(default, deserialize_with = "deserialize_phone")]
    whatsapp: Option<String>,
    #[serde(default, deserialize_with = "deserialize_phone")]
    telefone: Option<String>,
}

impl From<SupporterRow> for Recipient {
    fn from(row: SupporterRow) -> Self {
        fn first_present<const N: usize>(values: [Option<String>; N]) -> String {
            values
                .into_iter()
                .flatten()
                .find(|v| !v.trim().is_empty())
                .unwrap_or_default()
        }
        Self {
            display_name: first_present([row.display_name, row.name, row.nome]),
            raw_phone: first_present([row.raw_phone, row.phone, row.whatsapp, row.telefone]),
        }
    }
}

/// Supporter rows store phones as text, but hand-edited exports sometimes carry numbers or null.
fn deserialize_phone<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Operator-supplied campaign settings, immutable for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub message_template: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub footer_text: Option<String>,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_country_code")]
    pub country_code: String,
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

fn default_country_code() -> String {
    DEFAULT_COUNTRY_CODE.to_string()
}

impl CampaignConfig {
    pub fn new(message_template: impl Into<String>, interval: Duration) -> Self {
        Self {
            message_template: message_template.into(),
            placeholder: default_placeholder(),
            image_url: None,
            footer_text: None,
            interval,
            country_code: default_country_code(),
        }
    }

    /// Image URL, ignoring blank values.
    pub fn image_url(&self) -> Option<&str> {
        non_blank(self.image_url.as_deref())
    }

    /// Footer text, ignoring blank values.
    pub fn footer_text(&self) -> Option<&str> {
        non_blank(self.footer_text.as_deref())
    }

    /// Estimated run length shown to the operator before confirming: `total × interval`.
    pub fn estimated_duration(&self, total: usize) -> Duration {
        self.interval
            .saturating_mul(u32::try_from(total).unwrap_or(u32::MAX))
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// Connection settings for the messaging gateway, already validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub instance: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Stopped,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Stopped)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    Sent,
    Failed,
    Skipped,
}

/// One line of the campaign log feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: String,
    pub kind: LogKind,
    pub recipient: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl LogEntry {
    pub fn new(kind: LogKind, recipient: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            at: now_rfc3339(),
            kind,
            recipient: recipient.into(),
            detail,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LogKind::Sent => write!(f, "✔ Sent to {}", self.recipient),
            LogKind::Failed => match &self.detail {
                Some(d) => write!(f, "✖ Failed to send to {}: {}", self.recipient, d),
                None => write!(f, "✖ Failed to send to {}", self.recipient),
            },
            LogKind::Skipped => match &self.detail {
                Some(d) => write!(f, "⚠ Skipped {}: {}", self.recipient, d),
                None => write!(f, "⚠ Skipped {}", self.recipient),
            },
        }
    }
}

/// Mutable state of one run. Owned by the engine; observers only see snapshots.
#[derive(Debug, Clone)]
pub struct CampaignRunState {
    pub status: RunStatus,
    pub current_index: usize,
    pub total: usize,
    /// Newest first.
    pub log: VecDeque<LogEntry>,
    pub cancel_requested: bool,
}

impl CampaignRunState {
    pub fn new(total: usize) -> Self {
        Self {
            status: RunStatus::Idle,
            current_index: 0,
            total,
            log: VecDeque::new(),
            cancel_requested: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Running
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            active: self.is_active(),
            current_index: self.current_index,
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub active: bool,
    pub current_index: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CampaignEvent {
    Started {
        total: usize,
    },
    Progress(ProgressSnapshot),
    Log(LogEntry),
    Info(InfoEvent),
    Finished {
        // Boxed: the report carries the whole log.
        report: Box<CampaignReport>,
    },
}

/// Structured info events emitted by the engine and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    // UI/CLI messages generated outside the engine.
    Message(String),
    Waiting { seconds: u64 },
    StopObserved { current_index: usize },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Waiting { seconds } => {
                format!("Waiting {}s before the next recipient", seconds)
            }
            InfoEvent::StopObserved { current_index } => {
                format!("Stop requested, halted after {} recipient(s)", current_index)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignReport {
    pub started_at: String,
    pub finished_at: String,
    pub status: RunStatus,
    pub total: usize,
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(with = "humantime_serde")]
    pub estimated_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Chronological.
    pub log: Vec<LogEntry>,
}

pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_duration_multiplies_interval() {
        let cfg = CampaignConfig::new("Oi", Duration::from_secs(30));
        assert_eq!(cfg.estimated_duration(4), Duration::from_secs(120));
        assert_eq!(cfg.estimated_duration(0), Duration::ZERO);
    }

    #[test]
    fn blank_image_and_footer_are_absent() {
        let mut cfg = CampaignConfig::new("Oi", Duration::from_secs(10));
        cfg.image_url = Some("   ".into());
        cfg.footer_text = Some(String::new());
        assert_eq!(cfg.image_url(), None);
        assert_eq!(cfg.footer_text(), None);

        cfg.footer_text = Some("Vote 12".into());
        assert_eq!(cfg.footer_text(), Some("Vote 12"));
    }

    #[test]
    fn recipient_accepts_supporter_row_fields() {
        let r: Recipient =
            serde_json::from_str(r#"{"id": 3, "name": "Maria Silva", "phone": "(11) 98765-4321"}"#)
                .unwrap();
        assert_eq!(r, Recipient::new("Maria Silva", "(11) 98765-4321"));

        let r: Recipient = serde_json::from_str(r#"{"nome": "João", "whatsapp": 11987654321}"#).unwrap();
        assert_eq!(r.raw_phone, "11987654321");

        let r: Recipient = serde_json::from_str(r#"{"name": "Ana", "phone": null}"#).unwrap();
        assert_eq!(r.raw_phone, "");
    }

    #[test]
    fn recipient_merges_duplicate_columns() {
        let r: Recipient = serde_json::from_str(
            r#"{"name": "", "nome": "Bia Lima", "phone": "  ", "whatsapp": "11933334444", "telefone": "1133334444"}"#,
        )
        .unwrap();
        assert_eq!(r, Recipient::new("Bia Lima", "11933334444"));

        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(serde_json::from_str::<Recipient>(&json).unwrap(), r);
    }

    #[test]
    fn log_entry_lines() {
        let ok = LogEntry::new(LogKind::Sent, "Maria", None);
        assert_eq!(ok.to_string(), "✔ Sent to Maria");

        let skipped = LogEntry::new(LogKind::Skipped, "João", Some("invalid phone \"123\"".into()));
        assert_eq!(skipped.to_string(), "⚠ Skipped João: invalid phone \"123\"");
    }
}
