//! CLI binary for patron-notify.

use anyhow::Context;
use clap::{Parser, Subcommand};
use patron_notify::dispatch::{IterationOutcome, IterationReport, RowOutcome};
use patron_notify::{NotifyConfig, NotifyService};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Send WhatsApp receipts for new rows in a payments sheet.
#[derive(Parser)]
#[command(name = "patron-notify", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "PATRON_NOTIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Poll the sheet until interrupted (default).
    Run,

    /// Run a single iteration and print what happened.
    Once,

    /// Validate the configuration and probe the WhatsApp session.
    Check,

    /// Write a default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(NotifyConfig::default_config_path);

    if let Some(Command::InitConfig { force }) = cli.command {
        return init_config(&config_path, force);
    }

    let config = load_config(cli.config.as_deref(), &config_path)?;
    let _log_guard =
        patron_notify::logging::init(&config.logging, cli.verbose).context("init logging")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Once => once(config).await,
        Command::Check => check(config).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

fn load_config(explicit: Option<&Path>, default_path: &Path) -> anyhow::Result<NotifyConfig> {
    match explicit {
        Some(path) => NotifyConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None if default_path.exists() => NotifyConfig::from_file(default_path)
            .with_context(|| format!("failed to load config from {}", default_path.display())),
        None => Ok(NotifyConfig::default()),
    }
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    NotifyConfig::default()
        .save_to_file(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    println!("Set sheet.sheet_id before running.");
    Ok(())
}

fn report_problems(config: &NotifyConfig) -> usize {
    let problems = config.validate();
    for problem in &problems {
        warn!("config: {problem}");
    }
    problems.len()
}

async fn run(config: NotifyConfig) -> anyhow::Result<()> {
    println!("patron-notify v{}", env!("CARGO_PKG_VERSION"));
    report_problems(&config);

    let service = NotifyService::from_config(config).context("failed to start service")?;
    let cancel = CancellationToken::new();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; finishing current iteration");
            ctrl_c_cancel.cancel();
        }
    });

    let stats = service
        .run(cancel)
        .await
        .context("notification service failed")?;
    info!(
        iterations = stats.iterations,
        failures = stats.failures,
        "shut down"
    );
    Ok(())
}

async fn once(config: NotifyConfig) -> anyhow::Result<()> {
    report_problems(&config);
    let service = NotifyService::from_config(config).context("failed to start service")?;
    match service.run_once().await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "iteration failed");
            Err(e.into())
        }
    }
}

async fn check(config: NotifyConfig) -> anyhow::Result<()> {
    let problems = report_problems(&config);
    let service = NotifyService::from_config(config).context("failed to load credentials")?;
    let status = service
        .probe_session()
        .await
        .context("WhatsApp gateway unreachable")?;
    println!("WhatsApp session: {status}");

    if problems > 0 {
        anyhow::bail!("{problems} configuration problem(s) found");
    }
    if !status.is_ready() {
        anyhow::bail!("WhatsApp session is not ready ({status})");
    }
    println!("Configuration OK.");
    Ok(())
}

fn print_report(report: &IterationReport) {
    let c = &report.counts;
    match report.outcome {
        IterationOutcome::EmptyTable => println!("Sheet is empty."),
        IterationOutcome::SchemaMigrated => {
            println!("Added the tracking column; run again to send receipts.");
        }
        IterationOutcome::Skipped => println!("Another iteration is running."),
        IterationOutcome::Completed => {
            println!(
                "sent {}, marked {}, already notified {}, no contact {}, deferred {}, failed {}",
                c.sent,
                c.marked,
                c.skipped_not_pending,
                c.skipped_missing_contact,
                c.deferred,
                c.failed
            );
            for row in &report.rows {
                match &row.outcome {
                    RowOutcome::NotPending => {}
                    RowOutcome::MissingContact => {
                        println!("  row {}: no contact number", row.row_number);
                    }
                    RowOutcome::Deferred { retry_after_secs } => {
                        println!("  row {}: deferred ({retry_after_secs}s)", row.row_number);
                    }
                    RowOutcome::Marked { handle } => {
                        println!("  row {}: sent ({handle})", row.row_number);
                    }
                    RowOutcome::SendFailed { error } => {
                        println!("  row {}: send failed: {error}", row.row_number);
                    }
                    RowOutcome::MarkFailed { error, .. } => {
                        println!("  row {}: sent, not marked: {error}", row.row_number);
                    }
                }
            }
        }
    }
}
