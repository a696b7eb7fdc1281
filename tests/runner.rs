use async_trait::async_trait;
use campaign_dispatch::engine::{CampaignEngine, EngineControl, Gateway, GatewayError, FOOTER_PAUSE};
use campaign_dispatch::model::{
    CampaignConfig, CampaignEvent, CampaignReport, LogKind, Recipient, RunStatus,
};
use campaign_dispatch::orchestrator::{run_controller, UiCommand};
use campaign_dispatch::progress::ProgressReporter;
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
enum Kind {
    Text,
    Image(String),
}

#[derive(Debug, Clone)]
struct Call {
    kind: Kind,
    destination: String,
    body: String,
    at: Duration,
}

struct FakeGateway {
    start: Instant,
    calls: Mutex<Vec<Call>>,
    failing_destinations: Vec<String>,
    failing_text: Option<String>,
}

impl FakeGateway {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            calls: Mutex::new(Vec::new()),
            failing_destinations: Vec::new(),
            failing_text: None,
        }
    }

    fn failing_for(mut self, destination: &str) -> Self {
        self.failing_destinations.push(destination.to_string());
        self
    }

    fn failing_text(mut self, text: &str) -> Self {
        self.failing_text = Some(text.to_string());
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, kind: Kind, destination: &str, body: &str) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(Call {
            kind,
            destination: destination.to_string(),
            body: body.to_string(),
            at: self.start.elapsed(),
        });
        let fails = self.failing_destinations.iter().any(|d| d == destination)
            || self.failing_text.as_deref() == Some(body);
        if fails {
            return Err(GatewayError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "instance disconnected".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn send_text(&self, destination: &str, text: &str) -> Result<(), GatewayError> {
        self.record(Kind::Text, destination, text)
    }

    async fn send_image(
        &self,
        destination: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<(), GatewayError> {
        self.record(Kind::Image(image_url.to_string()), destination, caption)
    }
}

fn config(template: &str, interval_secs: u64) -> CampaignConfig {
    CampaignConfig::new(template, Duration::from_secs(interval_secs))
}

async fn run(
    cfg: CampaignConfig,
    gateway: Arc<FakeGateway>,
    recipients: Vec<Recipient>,
) -> (CampaignReport, Vec<CampaignEvent>) {
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
    let (_ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
    let engine = CampaignEngine::new(cfg, gateway, recipients);
    let report = engine.run(evt_tx, ctrl_rx).await.unwrap();
    let mut events = Vec::new();
    while let Ok(ev) = evt_rx.try_recv() {
        events.push(ev);
    }
    (report, events)
}

fn progress_indices(events: &[CampaignEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            CampaignEvent::Progress(p) => Some(p.current_index),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn single_recipient_text_message() {
    let gw = Arc::new(FakeGateway::new());
    let (report, events) = run(
        config("Olá {nome}!", 10),
        gw.clone(),
        vec![Recipient::new("Maria Silva", "11987654321")],
    )
    .await;

    let calls = gw.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, Kind::Text);
    assert_eq!(calls[0].destination, "5511987654321");
    assert_eq!(calls[0].body, "Olá Maria!");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!((report.processed, report.total), (1, 1));
    assert_eq!(report.sent, 1);
    assert_eq!(report.log.len(), 1);
    assert_eq!(report.log[0].kind, LogKind::Sent);
    assert_eq!(report.log[0].recipient, "Maria Silva");

    // No wait after the last recipient.
    assert_eq!(report.elapsed, Duration::ZERO);
    assert!(matches!(events[0], CampaignEvent::Started { total: 1 }));
}

#[tokio::test(start_paused = true)]
async fn invalid_phone_is_skipped_without_gateway_call() {
    let gw = Arc::new(FakeGateway::new());
    let (report, events) = run(
        config("Olá {nome}!", 10),
        gw.clone(),
        vec![Recipient::new("João", "123")],
    )
    .await;

    assert!(gw.calls().is_empty());
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.processed, 1);
    assert_eq!((report.sent, report.failed, report.skipped), (0, 0, 1));

    let logs: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CampaignEvent::Log(l) => Some(l.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].contains("João"));
    assert!(logs[0].contains("123"));
}

#[tokio::test(start_paused = true)]
async fn stop_during_interval_halts_within_one_slice() {
    let gw = Arc::new(FakeGateway::new());
    let (evt_tx, _evt_rx) = mpsc::unbounded_channel();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
    let engine = CampaignEngine::new(
        config("Oi {nome}", 30),
        gw.clone(),
        vec![
            Recipient::new("Ana Souza", "11911112222"),
            Recipient::new("Bia Lima", "11933334444"),
        ],
    );
    let handle = tokio::spawn(engine.run(evt_tx, ctrl_rx));

    tokio::time::sleep(Duration::from_secs(2)).await;
    ctrl_tx.send(EngineControl::Stop).unwrap();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!((report.processed, report.total), (1, 2));
    assert_eq!(gw.calls().len(), 1);
    assert_eq!(gw.calls()[0].destination, "5511911112222");
    assert!(report.elapsed <= Duration::from_secs(3));
    assert_eq!(report.log.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_image_send_skips_footer_and_continues_after_interval() {
    let gw = Arc::new(FakeGateway::new().failing_for("5511911112222"));
    let mut cfg = config("Oi {nome}", 12);
    cfg.image_url = Some("https://cdn.example.com/santinho.jpg".into());
    cfg.footer_text = Some("Vote chapa 1".into());

    let (report, _) = run(
        cfg,
        gw.clone(),
        vec![
            Recipient::new("Ana Souza", "11911112222"),
            Recipient::new("Bia Lima", "11933334444"),
        ],
    )
    .await;

    let calls = gw.calls();
    // Ana: failed image, no footer. Bia: image + footer.
    assert_eq!(calls.len(), 3);
    assert_eq!(
        calls[0].kind,
        Kind::Image("https://cdn.example.com/santinho.jpg".into())
    );
    assert_eq!(calls[0].body, "Oi Ana");
    assert_eq!(calls[1].destination, "5511933334444");
    assert_eq!(calls[1].at, Duration::from_secs(12));
    assert_eq!(calls[2].kind, Kind::Text);
    assert_eq!(calls[2].body, "Vote chapa 1");

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!((report.sent, report.failed), (1, 1));
    assert_eq!(report.log[0].kind, LogKind::Failed);
    assert!(report.log[0]
        .detail
        .as_deref()
        .unwrap()
        .contains("instance disconnected"));
}

#[tokio::test(start_paused = true)]
async fn footer_follows_after_fixed_pause_and_its_failure_is_ignored() {
    let gw = Arc::new(FakeGateway::new().failing_text("Obrigado, Ana!"));
    let mut cfg = config("Oi {nome}", 10);
    cfg.footer_text = Some("Obrigado, {NOME}!".into());

    let (report, _) = run(cfg, gw.clone(), vec![Recipient::new("Ana", "11911112222")]).await;

    let calls = gw.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].body, "Oi Ana");
    assert_eq!(calls[1].body, "Obrigado, Ana!");
    assert_eq!(calls[1].at - calls[0].at, FOOTER_PAUSE);
    assert_eq!(report.sent, 1);
    assert_eq!(report.log.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn without_footer_each_recipient_gets_at_most_one_call() {
    let gw = Arc::new(FakeGateway::new().failing_for("5511955556666"));
    let recipients = vec![
        Recipient::new("Ana", "11911112222"),
        Recipient::new("Bia", ""),
        Recipient::new("Caio", "11955556666"),
        Recipient::new("Duda", "+55 (11) 97777-8888"),
    ];
    let mut cfg = config("Oi {nome}", 10);
    cfg.footer_text = Some("  ".into());

    let (report, events) = run(cfg, gw.clone(), recipients).await;

    let calls = gw.calls();
    assert_eq!(calls.len(), 3);
    let mut dests: Vec<_> = calls.iter().map(|c| c.destination.as_str()).collect();
    dests.dedup();
    assert_eq!(dests.len(), 3);

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!((report.sent, report.failed, report.skipped), (2, 1, 1));
    // Waits follow Ana and Caio only; the skipped recipient is not paced.
    assert_eq!(report.elapsed, Duration::from_secs(20));

    let indices = progress_indices(&events);
    assert!(indices.windows(2).all(|w| w[0] <= w[1]));
    assert!(indices.iter().all(|&i| i <= 4));
    assert_eq!(*indices.last().unwrap(), 4);
}

#[tokio::test(start_paused = true)]
async fn stop_before_start_sends_nothing() {
    let gw = Arc::new(FakeGateway::new());
    let (evt_tx, _evt_rx) = mpsc::unbounded_channel();
    let (_ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
    let engine = CampaignEngine::new(
        config("Oi", 10),
        gw.clone(),
        vec![Recipient::new("Ana", "11911112222")],
    );
    engine.cancel_handle().cancel();

    let report = engine.run(evt_tx, ctrl_rx).await.unwrap();
    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(report.processed, 0);
    assert!(gw.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_recipient_list_completes_immediately() {
    let gw = Arc::new(FakeGateway::new());
    let (report, _) = run(config("Oi", 10), gw.clone(), Vec::new()).await;
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!((report.processed, report.total), (0, 0));
    assert!(gw.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_template_refuses_to_start() {
    let gw = Arc::new(FakeGateway::new());
    let (evt_tx, _evt_rx) = mpsc::unbounded_channel();
    let (_ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
    let engine = CampaignEngine::new(
        config("  ", 10),
        gw.clone(),
        vec![Recipient::new("Ana", "11911112222")],
    );
    assert!(engine.run(evt_tx, ctrl_rx).await.is_err());
    assert!(gw.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn controller_forwards_stop_and_reports_finish() {
    let gw = Arc::new(FakeGateway::new());
    let engine = CampaignEngine::new(
        config("Oi {nome}", 20),
        gw.clone(),
        vec![
            Recipient::new("Ana", "11911112222"),
            Recipient::new("Bia", "11933334444"),
            Recipient::new("Caio", "11955556666"),
        ],
    );
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_controller(engine, evt_tx, cmd_rx));

    // Second recipient goes out at t=20s; stop during the following wait.
    tokio::time::sleep(Duration::from_secs(25)).await;
    cmd_tx.send(UiCommand::Stop).unwrap();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(report.processed, 2);
    assert_eq!(gw.calls().len(), 2);

    let mut reporter = ProgressReporter::default();
    while let Some(ev) = evt_rx.recv().await {
        reporter.apply(&ev);
    }
    assert!(!reporter.active);
    assert_eq!(reporter.status, RunStatus::Stopped);
    assert_eq!(reporter.current_index, 2);
    assert_eq!(reporter.total, 3);
    let newest_first: Vec<_> = reporter.log().map(|e| e.recipient.clone()).collect();
    assert_eq!(newest_first, ["Bia", "Ana"]);
}
