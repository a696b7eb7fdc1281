use anyhow::Result;
use campaign_dispatch::cli;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Progress goes to stderr as plain lines; tracing stays quiet unless RUST_LOG asks.
    let default_filter = if args.silent { "error" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let is_silent = args.silent;
    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if is_silent {
                println!("{:#}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
