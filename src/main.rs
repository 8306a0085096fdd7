//! mailsweep - Entry point: scan the mailbox and print the top senders

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use mailsweep::config::Settings;
use mailsweep::domain::Credential;
use mailsweep::providers::email::GmailClient;
use mailsweep::services::ScanOutcome;
use mailsweep::SweepHandler;

/// Environment variable holding the OAuth access token.
const TOKEN_VAR: &str = "MAILSWEEP_ACCESS_TOKEN";

/// Number of senders printed after a scan.
const TOP_SENDERS: usize = 25;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting mailsweep");

    if let Err(e) = run().await {
        tracing::error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => Settings::load(&path)?,
        None => Settings::load_default()?,
    };

    let token = std::env::var(TOKEN_VAR)
        .with_context(|| format!("{} is not set; an access token is required", TOKEN_VAR))?;

    let client = GmailClient::from_settings(&settings.api).context("creating mail client")?;
    let handler = Arc::new(SweepHandler::new(
        Arc::new(client),
        Some(Credential::new(token)),
        settings,
    ));

    handler.start_analysis().await?;

    // Ctrl-C stops at the next checkpoint and keeps partial results.
    {
        let handler = handler.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handler.stop_analysis();
            }
        });
    }

    let report = handler.wait_for_scan().await;
    let Some(report) = report else {
        bail!("scan task ended unexpectedly");
    };
    if let ScanOutcome::Failed(err) = &report.outcome {
        bail!("scan failed after {} emails: {}", report.processed, err);
    }

    println!(
        "Scanned {} emails from {} senders in {}s",
        report.processed,
        report.senders,
        (report.finished_at - report.started_at).num_seconds()
    );
    for sender in handler.aggregate_snapshot().into_iter().take(TOP_SENDERS) {
        println!("{:>8}  {}", sender.total, sender.domain);
    }

    Ok(())
}
