//! Run lifecycle controller.
//!
//! Owns start/stop orchestration and emits events for presentation layers.

use crate::engine::{CampaignEngine, EngineControl};
use crate::model::{CampaignEvent, CampaignReport, InfoEvent};
use anyhow::{Context, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// How long a stop may stay pending before the operator is told why.
const STOP_WATCHDOG: Duration = Duration::from_secs(3);

/// Commands emitted by UI layers to control the running campaign.
#[derive(Debug, Clone)]
pub enum UiCommand {
    Stop,
}

/// Run one campaign to completion or stop, forwarding UI commands to the engine.
///
/// Emits `CampaignEvent::Finished` with the report once the engine returns. A closed
/// command channel only means no further commands; it does not stop the run.
pub async fn run_controller(
    engine: CampaignEngine,
    event_tx: UnboundedSender<CampaignEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<CampaignReport> {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
    let engine_tx = event_tx.clone();
    let mut handle = tokio::spawn(async move { engine.run(engine_tx, ctrl_rx).await });

    let mut commands_open = true;
    let mut stopping = false;
    // Stop watchdog: in-flight gateway calls are never aborted, so keep UI feedback alive.
    let mut stop_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(UiCommand::Stop) => {
                        if !stopping {
                            stopping = true;
                            let _ = ctrl_tx.send(EngineControl::Stop);
                            let _ = event_tx.send(CampaignEvent::Info(InfoEvent::Message(
                                "Stopping…".into(),
                            )));
                            stop_deadline = Some(tokio::time::Instant::now() + STOP_WATCHDOG);
                        }
                    }
                    None => commands_open = false,
                }
            }
            join_res = &mut handle => {
                let report = join_res
                    .context("campaign task failed")?
                    .context("campaign run failed")?;
                let _ = event_tx.send(CampaignEvent::Finished {
                    report: Box::new(report.clone()),
                });
                return Ok(report);
            }
            _ = watchdog.tick() => {
                if let Some(deadline) = stop_deadline {
                    if tokio::time::Instant::now() >= deadline {
                        let _ = event_tx.send(CampaignEvent::Info(InfoEvent::Message(
                            "Still stopping… waiting for the current send to finish".into(),
                        )));
                        stop_deadline = None;
                    }
                }
            }
        }
    }
}
