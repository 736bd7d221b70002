//! `ReplyLedger` - follow-up tracking for auditors
//!
//! Command-line front end over `replyledger-core`: auditor bootstrap,
//! directory import, sync trigger and reports.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use replyledger_core::{
    AppConfig, AuditorId, CompanyActivity, MailAccountCredential, NewAuditor, OverdueRecord,
    OverviewStats, Security, Settings, SyncReport, Tracker, VaultKey, records_from_json,
};

#[derive(Parser)]
#[command(name = "replyledger")]
#[command(version, about = "Track which client companies owe an auditor a reply")]
struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a fresh vault key for REPLYLEDGER_VAULT_KEY
    InitKey,

    /// Register an auditor and their mailbox
    AddAuditor {
        /// Login name, unique.
        #[arg(long)]
        username: String,

        /// Display name.
        #[arg(long)]
        full_name: Option<String>,

        /// Contact address.
        #[arg(long)]
        email: Option<String>,

        /// IMAP server host.
        #[arg(long)]
        imap_host: String,

        /// IMAP server port; defaults by security mode.
        #[arg(long)]
        imap_port: Option<u16>,

        /// Connection security.
        #[arg(long, value_enum, default_value_t = SecurityArg::Tls)]
        security: SecurityArg,

        /// Mailbox login.
        #[arg(long)]
        imap_user: String,

        /// Mailbox password. Read from the environment so it stays out of
        /// shell history.
        #[arg(long, env = "REPLYLEDGER_IMAP_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// List registered auditors
    Auditors,

    /// Remove an auditor and their tenant store
    DeleteAuditor {
        /// Auditor id.
        auditor: i64,
    },

    /// Import a company directory from a JSON array of records
    ImportDirectory {
        /// Auditor id.
        auditor: i64,

        /// JSON file: `[{"UIF Ref": "...", "Trade Name": "...", "Email": "..."}]`.
        file: PathBuf,
    },

    /// Show or change the follow-up threshold and internal domains
    Settings {
        /// Working days before a company is overdue.
        #[arg(long)]
        threshold: Option<u32>,

        /// Internal domain to exclude; repeat for several. Replaces the list.
        #[arg(long = "domain", value_name = "DOMAIN")]
        domains: Vec<String>,

        /// Remove all internal domains.
        #[arg(long, conflicts_with = "domains")]
        clear_domains: bool,
    },

    /// Sync an auditor's mailbox now
    Sync {
        /// Auditor id.
        auditor: i64,

        /// Print the sync report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Follow-up report for an auditor
    Report {
        /// Auditor id.
        auditor: i64,

        /// Include companies that are not overdue.
        #[arg(long)]
        all: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Dashboard counts and per-company activity
    Stats {
        /// Auditor id.
        auditor: i64,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show the outcome of the last sync
    Status {
        /// Auditor id.
        auditor: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SecurityArg {
    Tls,
    None,
}

impl From<SecurityArg> for Security {
    fn from(value: SecurityArg) -> Self {
        match value {
            SecurityArg::Tls => Self::Tls,
            SecurityArg::None => Self::None,
        }
    }
}

#[derive(Serialize)]
struct StatsOutput {
    overview: OverviewStats,
    companies: Vec<CompanyActivity>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replyledger=info,replyledger_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Bootstrapping a key must work before any vault exists.
    if matches!(cli.command, Command::InitKey) {
        print_new_key();
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path).await,
        None => AppConfig::load().await,
    }
    .context("loading configuration")?;
    let tracker = Tracker::open(&config)
        .await
        .context("opening data directory")?;

    run(&tracker, cli.command).await
}

async fn run(tracker: &Tracker, command: Command) -> anyhow::Result<()> {
    match command {
        Command::InitKey => print_new_key(),
        Command::AddAuditor {
            username,
            full_name,
            email,
            imap_host,
            imap_port,
            security,
            imap_user,
            password,
        } => {
            let security = Security::from(security);
            let credential = MailAccountCredential {
                imap_host,
                imap_port: imap_port.unwrap_or_else(|| security.default_imap_port()),
                security,
                username: imap_user,
                secret: password,
                smtp_host: None,
                smtp_port: None,
            };
            let auditor = tracker
                .create_auditor(NewAuditor {
                    username,
                    full_name,
                    email,
                    credential,
                })
                .await?;
            println!("Created auditor {} ({})", auditor.id, auditor.username);
        }
        Command::Auditors => {
            for auditor in tracker.list_auditors().await? {
                println!(
                    "{:>4}  {:<20} {}",
                    auditor.id.0,
                    auditor.username,
                    auditor.full_name.as_deref().unwrap_or("")
                );
            }
        }
        Command::DeleteAuditor { auditor } => {
            if tracker.delete_auditor(AuditorId(auditor)).await? {
                println!("Deleted auditor {auditor}");
            } else {
                bail!("auditor {auditor} not found");
            }
        }
        Command::ImportDirectory { auditor, file } => {
            let json = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let records = records_from_json(&json)?;
            let report = tracker
                .import_directory(AuditorId(auditor), &records)
                .await?;
            println!("Accepted {} companies", report.accepted);
            for rejected in &report.rejected {
                println!("  rejected {rejected}");
            }
            for warning in &report.warnings {
                println!("  warning: {warning}");
            }
        }
        Command::Settings {
            threshold,
            domains,
            clear_domains,
        } => {
            let current = tracker.settings().await?;
            let settings = if threshold.is_some() || !domains.is_empty() || clear_domains {
                let domains = if clear_domains {
                    Vec::new()
                } else if domains.is_empty() {
                    current.internal_domains().to_vec()
                } else {
                    domains
                };
                let updated = Settings::new(
                    threshold.unwrap_or_else(|| current.followup_threshold()),
                    domains,
                )?;
                tracker.update_settings(&updated).await?;
                updated
            } else {
                current
            };
            println!("Follow-up threshold: {} working days", settings.followup_threshold());
            println!("Internal domains: {}", settings.internal_domains().join(", "));
        }
        Command::Sync { auditor, json } => {
            let report = sync(tracker, AuditorId(auditor)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_sync_report(&report);
            }
        }
        Command::Report { auditor, all, json } => {
            let records = tracker
                .overdue_report(AuditorId(auditor), all, Utc::now())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_report(&records);
            }
        }
        Command::Stats { auditor, json } => {
            let now = Utc::now();
            let output = StatsOutput {
                overview: tracker.overview(AuditorId(auditor), now).await?,
                companies: tracker.activity(AuditorId(auditor), now).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_stats(&output);
            }
        }
        Command::Status { auditor } => match tracker.last_sync_status(AuditorId(auditor)).await? {
            Some(entry) => println!("{} at {}", entry.status, short_time(entry.recorded_at)),
            None => println!("never synced"),
        },
    }
    Ok(())
}

/// Run a sync, cancelling it on Ctrl-C.
async fn sync(tracker: &Tracker, auditor: AuditorId) -> anyhow::Result<SyncReport> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling sync");
            on_interrupt.cancel();
        }
    });

    info!(%auditor, "Starting sync");
    let result = tracker.sync_now(auditor, cancel).await;
    watcher.abort();
    Ok(result?)
}

fn print_new_key() {
    println!("{}", VaultKey::generate());
    eprintln!("export REPLYLEDGER_VAULT_KEY=<value above>");
}

fn short_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

fn print_sync_report(report: &SyncReport) {
    println!(
        "Window {} .. {}",
        short_time(report.window.start),
        short_time(report.window.end)
    );
    println!(
        "Fetched {}, stored {}, already stored {}",
        report.fetched, report.inserted, report.duplicates
    );
    println!(
        "Skipped: {} internal, {} unmatched, {} outside window, {} unreadable",
        report.excluded,
        report.unmatched,
        report.out_of_window,
        report.partial_failures.len()
    );
    for failure in &report.partial_failures {
        println!("  {failure}");
    }
}

fn print_report(records: &[OverdueRecord]) {
    if records.is_empty() {
        println!("Nothing overdue");
        return;
    }
    println!(
        "{:<12} {:<30} {:<17} {:<17} {:>5}  STATUS",
        "REFERENCE", "COMPANY", "LAST SENT", "LAST REPLY", "DAYS"
    );
    for record in records {
        println!(
            "{:<12} {:<30} {:<17} {:<17} {:>5}  {}",
            record.company_ref,
            truncate(&record.company_name, 30),
            short_time(record.last_outbound),
            record.last_inbound.map(short_time).unwrap_or_default(),
            record.working_days_elapsed,
            record.status
        );
    }
}

fn print_stats(output: &StatsOutput) {
    let overview = &output.overview;
    println!("Companies:        {}", overview.total_companies);
    println!("Overdue:          {}", overview.overdue);
    println!("Due tomorrow:     {}", overview.due_tomorrow);
    println!("Sent today:       {}", overview.sent_today);
    println!("Never replied:    {}", overview.zero_replies);
    println!("Emailed 10+:      {}", overview.emailed_ten_plus);
    println!();
    for activity in output.companies.iter().filter(|a| a.sent > 0 || a.received > 0) {
        println!(
            "{:<12} {:<30} sent {:>3}  received {:>3}{}",
            activity.company_ref,
            truncate(&activity.name, 30),
            activity.sent,
            activity.received,
            if activity.non_compliant { "  (10+)" } else { "" }
        );
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut out: String = value.chars().take(width.saturating_sub(1)).collect();
        out.push('~');
        out
    }
}
