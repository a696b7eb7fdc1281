use crate::engine::{phone, template, CampaignEngine, HttpGateway};
use crate::model::{CampaignConfig, CampaignEvent, Recipient};
use crate::orchestrator::{process_run_completion, run_controller, PostRunOptions, UiCommand};
use crate::progress::ProgressReporter;
use crate::settings::GatewaySettings;
use crate::source::{self, BackendClient};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Shortest inter-recipient interval accepted from operators. Faster sending gets
/// gateway accounts blocked.
pub const MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "campaign-dispatch",
    version,
    about = "Send a personalized WhatsApp message to every campaign supporter, one at a time"
)]
pub struct Cli {
    /// Messaging gateway base URL
    #[arg(long, env = "CAMPAIGN_GATEWAY_URL")]
    pub gateway_url: Option<String>,

    /// Gateway instance (sender account) name
    #[arg(long, env = "CAMPAIGN_GATEWAY_INSTANCE")]
    pub instance: Option<String>,

    /// Gateway API key, sent as the `apikey` header when set
    #[arg(long, env = "CAMPAIGN_GATEWAY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Campaign site backend; supplies supporters and gateway settings not given as flags
    #[arg(long, env = "CAMPAIGN_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// JSON file with supporter rows (`name`, `phone`) instead of the backend list
    #[arg(long)]
    pub recipients: Option<std::path::PathBuf>,

    /// Message template; the placeholder is replaced by each recipient's first name
    #[arg(long, conflicts_with = "template_file")]
    pub template: Option<String>,

    /// Read the message template from a file
    #[arg(long)]
    pub template_file: Option<std::path::PathBuf>,

    /// Placeholder token for the first name (matched case-insensitively)
    #[arg(long, default_value = crate::model::DEFAULT_PLACEHOLDER)]
    pub placeholder: String,

    /// Send the message as the caption of this image
    #[arg(long)]
    pub image_url: Option<String>,

    /// Follow-up text sent as a separate message after a successful send
    #[arg(long)]
    pub footer: Option<String>,

    /// Wait between recipients (minimum 10s)
    #[arg(long, default_value = "15s")]
    pub interval: humantime::Duration,

    /// Country prefix added to 10/11 digit domestic numbers
    #[arg(long, default_value = crate::model::DEFAULT_COUNTRY_CODE)]
    pub country_code: String,

    /// Per-request gateway timeout (default: none)
    #[arg(long)]
    pub request_timeout: Option<humantime::Duration>,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Print the JSON report on stdout instead of a text summary
    #[arg(long)]
    pub json: bool,

    /// Suppress progress output (requires --yes)
    #[arg(long)]
    pub silent: bool,

    /// Show what would be sent to each recipient without contacting the gateway
    #[arg(long)]
    pub dry_run: bool,

    /// Export the report as JSON
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Export the log as CSV
    #[arg(long)]
    pub export_csv: Option<std::path::PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,
}

fn user_agent() -> String {
    format!("campaign-dispatch/{}", env!("CARGO_PKG_VERSION"))
}

pub async fn run(args: Cli) -> Result<()> {
    if args.silent && !args.yes && !args.dry_run {
        bail!("--silent skips the progress display but not the confirmation; add --yes");
    }

    let cfg = build_config(&args)?;
    let backend = args
        .backend_url
        .as_deref()
        .map(|url| BackendClient::new(url, &user_agent()))
        .transpose()
        .context("invalid --backend-url")?;

    let recipients = load_recipients(&args, backend.as_ref()).await?;

    if args.dry_run {
        return run_dry(&cfg, &recipients);
    }

    if Duration::from(args.interval) < MIN_INTERVAL {
        bail!(
            "--interval must be at least {}",
            humantime::format_duration(MIN_INTERVAL)
        );
    }

    // Misconfiguration stops us here, before anything is sent.
    let gateway_settings = GatewaySettings {
        base_url: args.gateway_url.clone(),
        instance: args.instance.clone(),
        api_key: args.api_key.clone(),
        request_timeout: args.request_timeout.map(Duration::from),
    };
    let gateway_settings = resolve_gateway_settings(gateway_settings, backend.as_ref()).await;
    let gateway_cfg = gateway_settings.validate(user_agent())?;
    let gateway = HttpGateway::new(&gateway_cfg).context("failed to build gateway client")?;

    if recipients.is_empty() {
        bail!("no recipients to message");
    }

    let estimate = cfg.estimated_duration(recipients.len());
    if !args.yes && !confirm(recipients.len(), estimate).await? {
        eprintln!("Aborted.");
        return Ok(());
    }

    info!(
        gateway = %gateway_cfg.base_url,
        instance = %gateway_cfg.instance,
        recipients = recipients.len(),
        "starting campaign"
    );
    let engine = CampaignEngine::new(cfg, Arc::new(gateway), recipients);
    run_campaign(&args, engine).await
}

/// Fill gaps in the flag/env settings from the backend settings object. The backend is
/// only asked when a required field is missing, and a failed fetch is left for
/// `validate` to report as the missing field.
pub async fn resolve_gateway_settings(
    explicit: GatewaySettings,
    backend: Option<&BackendClient>,
) -> GatewaySettings {
    let Some(backend) = backend else {
        return explicit;
    };
    if explicit.is_complete() {
        return explicit;
    }
    match backend.fetch_settings().await {
        Ok(map) => explicit.or(GatewaySettings::from_settings_map(&map)),
        Err(e) => {
            warn!(error = %e, "failed to fetch settings from backend");
            explicit
        }
    }
}

/// Build a `CampaignConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<CampaignConfig> {
    let message_template = match (&args.template, &args.template_file) {
        (Some(t), _) => t.clone(),
        (None, Some(p)) => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read template {}", p.display()))?,
        (None, None) => bail!("a message is required: pass --template or --template-file"),
    };
    if message_template.trim().is_empty() {
        bail!("message template is empty");
    }

    Ok(CampaignConfig {
        message_template,
        placeholder: args.placeholder.clone(),
        image_url: args.image_url.clone(),
        footer_text: args.footer.clone(),
        interval: Duration::from(args.interval),
        country_code: args.country_code.clone(),
    })
}

async fn load_recipients(args: &Cli, backend: Option<&BackendClient>) -> Result<Vec<Recipient>> {
    if let Some(path) = args.recipients.as_deref() {
        return Ok(source::load_recipients_file(path)?);
    }
    match backend {
        Some(b) => b
            .fetch_supporters()
            .await
            .context("failed to fetch supporters from backend"),
        None => bail!("no recipients: pass --recipients <file> or --backend-url"),
    }
}

/// Ask the operator to confirm the estimated duration before anything is sent.
async fn confirm(total: usize, estimate: Duration) -> Result<bool> {
    eprint!(
        "About to message {} recipient(s). Estimated duration: {}. Proceed? [y/N] ",
        total,
        humantime::format_duration(estimate)
    );
    std::io::stderr().flush()?;
    let answer = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await
    .context("confirmation prompt failed")??;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "sim"
    ))
}

fn run_dry(cfg: &CampaignConfig, recipients: &[Recipient]) -> Result<()> {
    let mut out = std::io::stdout().lock();
    for r in recipients {
        let destination = phone::normalize_phone(&r.raw_phone, &cfg.country_code);
        if !phone::is_dialable(&destination) {
            writeln!(out, "SKIP {} (invalid phone {:?})", r.display_name, r.raw_phone)?;
            continue;
        }
        let name = template::first_name(&r.display_name);
        let message = template::render(&cfg.message_template, &cfg.placeholder, name);
        writeln!(out, "{} -> {}: {}", r.display_name, destination, message)?;
        if let Some(footer) = cfg.footer_text() {
            writeln!(
                out,
                "    + footer: {}",
                template::render(footer, &cfg.placeholder, name)
            )?;
        }
    }
    writeln!(
        out,
        "{} recipient(s), estimated duration {}",
        recipients.len(),
        humantime::format_duration(cfg.estimated_duration(recipients.len()))
    )?;
    Ok(())
}

/// What a Ctrl+C press asks for: the first one a cooperative stop, any later one an
/// immediate exit.
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Stop,
    ForceQuit,
}

#[derive(Debug, Default)]
struct InterruptCounter {
    presses: u32,
}

impl InterruptCounter {
    fn press(&mut self) -> Interrupt {
        self.presses += 1;
        if self.presses == 1 {
            Interrupt::Stop
        } else {
            Interrupt::ForceQuit
        }
    }
}

async fn run_campaign(args: &Cli, engine: CampaignEngine) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<CampaignEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let handle = tokio::spawn(run_controller(engine, evt_tx, cmd_rx));

    let mut reporter = ProgressReporter::default();
    let mut interrupts = InterruptCounter::default();
    loop {
        tokio::select! {
            ev = evt_rx.recv() => {
                let Some(ev) = ev else { break };
                reporter.apply(&ev);
                if args.silent {
                    continue;
                }
                match &ev {
                    CampaignEvent::Started { total } => {
                        let _ = out_tx.send(OutputLine::Stderr(format!(
                            "Starting campaign for {total} recipient(s). Ctrl+C stops after the current send; press it again to quit."
                        )));
                    }
                    CampaignEvent::Log(entry) => {
                        let _ = out_tx.send(OutputLine::Stderr(format!(
                            "{}  {}",
                            reporter.status_line(),
                            entry
                        )));
                    }
                    CampaignEvent::Info(info) => {
                        let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
                    }
                    CampaignEvent::Progress(_) | CampaignEvent::Finished { .. } => {}
                }
            }
            res = tokio::signal::ctrl_c() => {
                res.context("failed to listen for Ctrl+C")?;
                match interrupts.press() {
                    Interrupt::Stop => {
                        let _ = cmd_tx.send(UiCommand::Stop);
                    }
                    Interrupt::ForceQuit => {
                        eprintln!("Interrupted again; exiting without waiting for the current send.");
                        std::process::exit(130);
                    }
                }
            }
        }
    }

    let report = handle.await.context("campaign controller failed")??;

    let processed = process_run_completion(
        &PostRunOptions {
            auto_save: args.auto_save,
            export_json: args.export_json.clone(),
            export_csv: args.export_csv.clone(),
        },
        &report,
    );

    if args.json {
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&report)?));
    } else if !args.silent {
        for line in crate::text_summary::build_text_summary(&report).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    if !args.silent {
        for msg in processed.export_messages {
            let _ = out_tx.send(OutputLine::Stderr(msg));
        }
        if let Some(p) = processed.auto_saved_path {
            let _ = out_tx.send(OutputLine::Stderr(format!("Saved: {}", p.display())));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
