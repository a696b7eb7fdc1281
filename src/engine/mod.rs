mod gateway;
pub mod phone;
pub mod template;

pub use gateway::{Gateway, GatewayError, HttpGateway};

use crate::model::{
    now_rfc3339, CampaignConfig, CampaignEvent, CampaignReport, CampaignRunState, InfoEvent,
    LogEntry, LogKind, Recipient, RunStatus,
};
use anyhow::{bail, Result};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Pause between a primary message and its footer so they arrive as separate bubbles.
pub const FOOTER_PAUSE: Duration = Duration::from_secs(2);
/// Granularity at which a pending stop is noticed during the inter-recipient wait.
pub const POLL_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Stop after the recipient currently being processed
    Stop,
}

/// Cooperative stop flag shared between the engine and whoever drives it.
///
/// Setting it never interrupts an in-flight gateway call; the engine samples it at the
/// top of each recipient and once per [`POLL_SLICE`] while waiting.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct CampaignEngine {
    cfg: CampaignConfig,
    gateway: Arc<dyn Gateway>,
    recipients: Vec<Recipient>,
    cancel: CancelHandle,
}

impl CampaignEngine {
    /// `recipients` is the snapshot drained by this run; later additions are not seen.
    pub fn new(cfg: CampaignConfig, gateway: Arc<dyn Gateway>, recipients: Vec<Recipient>) -> Self {
        Self {
            cfg,
            gateway,
            recipients,
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn total(&self) -> usize {
        self.recipients.len()
    }

    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<CampaignEvent>,
        mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> Result<CampaignReport> {
        if self.cfg.message_template.trim().is_empty() {
            bail!("message template is empty");
        }

        let total = self.recipients.len();
        let started_at = now_rfc3339();
        let start = Instant::now();
        let mut state = CampaignRunState::new(total);
        let (mut sent, mut failed, mut skipped) = (0usize, 0usize, 0usize);

        // Control listener.
        let cancel2 = self.cancel.clone();
        let control_handle = tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                match msg {
                    EngineControl::Stop => {
                        cancel2.cancel();
                        break;
                    }
                }
            }
        });

        state.status = RunStatus::Running;
        info!(total, interval = ?self.cfg.interval, "campaign started");
        let _ = event_tx.send(CampaignEvent::Started { total });
        let _ = event_tx.send(CampaignEvent::Progress(state.snapshot()));

        for (i, recipient) in self.recipients.iter().enumerate() {
            if self.cancel.is_cancelled() {
                state.cancel_requested = true;
                break;
            }

            let entry = self.process(recipient).await;
            let skipped_recipient = entry.kind == LogKind::Skipped;
            match entry.kind {
                LogKind::Sent => sent += 1,
                LogKind::Failed => failed += 1,
                LogKind::Skipped => skipped += 1,
            }
            state.log.push_front(entry.clone());
            let _ = event_tx.send(CampaignEvent::Log(entry));

            state.current_index += 1;
            let _ = event_tx.send(CampaignEvent::Progress(state.snapshot()));

            // Nothing reached the gateway for a skipped recipient, so there is nothing to pace.
            if i + 1 < total && !skipped_recipient {
                let _ = event_tx.send(CampaignEvent::Info(InfoEvent::Waiting {
                    seconds: self.cfg.interval.as_secs(),
                }));
                if !wait_or_cancel(self.cfg.interval, &self.cancel).await {
                    state.cancel_requested = true;
                    break;
                }
            }
        }

        state.status = if state.cancel_requested {
            RunStatus::Stopped
        } else {
            RunStatus::Completed
        };
        if state.status == RunStatus::Stopped {
            let _ = event_tx.send(CampaignEvent::Info(InfoEvent::StopObserved {
                current_index: state.current_index,
            }));
        }
        let _ = event_tx.send(CampaignEvent::Progress(state.snapshot()));
        info!(
            status = %state.status,
            processed = state.current_index,
            total,
            sent,
            failed,
            skipped,
            "campaign finished"
        );

        // Dropping a JoinHandle does not cancel the task.
        control_handle.abort();

        Ok(CampaignReport {
            started_at,
            finished_at: now_rfc3339(),
            status: state.status,
            total,
            processed: state.current_index,
            sent,
            failed,
            skipped,
            estimated_duration: self.cfg.estimated_duration(total),
            elapsed: start.elapsed(),
            log: state.log.into_iter().rev().collect(),
        })
    }

    /// Resolve one recipient fully, footer included, and describe the outcome.
    async fn process(&self, recipient: &Recipient) -> LogEntry {
        let destination = phone::normalize_phone(&recipient.raw_phone, &self.cfg.country_code);
        if !phone::is_dialable(&destination) {
            warn!(recipient = %recipient.display_name, raw = %recipient.raw_phone, "skipping invalid phone");
            return LogEntry::new(
                LogKind::Skipped,
                recipient.display_name.clone(),
                Some(format!("invalid phone {:?}", recipient.raw_phone)),
            );
        }

        let name = template::first_name(&recipient.display_name);
        let message = template::render(&self.cfg.message_template, &self.cfg.placeholder, name);

        let primary = match self.cfg.image_url() {
            Some(image_url) => {
                self.gateway
                    .send_image(&destination, image_url, &message)
                    .await
            }
            None => self.gateway.send_text(&destination, &message).await,
        };

        match primary {
            Ok(()) => {
                if let Some(footer) = self.cfg.footer_text() {
                    tokio::time::sleep(FOOTER_PAUSE).await;
                    let footer = template::render(footer, &self.cfg.placeholder, name);
                    if let Err(e) = self.gateway.send_text(&destination, &footer).await {
                        debug!(recipient = %recipient.display_name, error = %e, "footer send failed");
                    }
                }
                debug!(recipient = %recipient.display_name, %destination, "sent");
                LogEntry::new(LogKind::Sent, recipient.display_name.clone(), None)
            }
            Err(e) => {
                warn!(recipient = %recipient.display_name, %destination, error = %e, "send failed");
                LogEntry::new(
                    LogKind::Failed,
                    recipient.display_name.clone(),
                    Some(e.to_string()),
                )
            }
        }
    }
}

/// Sleep for `total` in [`POLL_SLICE`] steps. Returns `false` as soon as a stop is seen.
pub(crate) async fn wait_or_cancel(total: Duration, cancel: &CancelHandle) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(POLL_SLICE)).await;
    }
}
