//! Leadwatch CLI
//!
//! Command-line interface for Leadwatch operations:
//! - Fetch the lead list
//! - Print stats
//! - Watch the live session
//! - Query a running server

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use leadwatch::config::{generate_default_config, Config, LoadedConfig};
use leadwatch::leads::Lead;
use leadwatch::remote::{LeadSource, RestClient};
use leadwatch::session::LeadSession;
use leadwatch::stats::StatsReport;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "leadwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time lead monitoring for an AI prospecting agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8090", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the lead list from the backend
    Fetch {
        /// Only show the newest N leads
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Fetch once and print stats
    Stats,

    /// Follow the live session, printing notifications and stats
    Watch,

    /// Show the sync status of a running server
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch { limit } => {
            let config = setup(cli.config.as_ref())?;
            let client = RestClient::from_config(&config)?;
            let mut leads = client.fetch_all().await?;
            if let Some(limit) = limit {
                leads.truncate(limit);
            }

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&leads)?);
            } else {
                print_leads(&leads, &config.stats.agent_role);
            }
        }

        Commands::Stats => {
            let config = setup(cli.config.as_ref())?;
            let client = RestClient::from_config(&config)?;
            let leads = client.fetch_all().await?;
            let report = StatsReport::compute(&leads, Utc::now(), &config.stats);
            print_report(&report, &cli.format)?;
        }

        Commands::Watch => {
            let config = setup(cli.config.as_ref())?;
            watch(&config, &cli.format).await?;
        }

        Commands::Status => {
            let url = format!("{}/api/status", cli.api_url.trim_end_matches('/'));
            let response = reqwest::get(&url).await.with_context(|| {
                format!(
                    "Cannot connect to Leadwatch API at {}. Is `leadwatch` running?",
                    cli.api_url
                )
            })?;

            if !response.status().is_success() {
                anyhow::bail!("API returned error: {}", response.status());
            }

            let status: serde_json::Value = response.json().await?;
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Leadwatch v{}", env!("CARGO_PKG_VERSION"));
                println!();
                for key in [
                    "configured",
                    "connected",
                    "feed_connected",
                    "bootstrapped",
                    "lead_count",
                    "last_fetch_at",
                ] {
                    println!("  {:<16} {}", key, status[key]);
                }
            }
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Load configuration and start logging
fn setup(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let loaded = load_config(path)?;
    loaded.config.logging.init();
    loaded.log();
    Ok(loaded.config)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LoadedConfig> {
    match path {
        Some(path) => LoadedConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(Config::load_default()),
    }
}

async fn watch(config: &Config, format: &str) -> anyhow::Result<()> {
    let session = LeadSession::from_config(config)?;
    let mut notifications = session.notifications();
    let mut snapshots = session.watch_snapshot();

    println!("Watching {} (Ctrl+C to stop)", config.backend.table);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            notification = notifications.recv() => {
                if let Ok(notification) = notification {
                    if format == "json" {
                        println!("{}", serde_json::to_string(&notification)?);
                    } else {
                        println!("[{}] {}", notification.raised_at.format("%H:%M:%S"), notification.message);
                    }
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                print_report(&session.stats(Utc::now()), format)?;
            }
        }
    }

    session.close().await;
    Ok(())
}

fn print_leads(leads: &[Lead], agent_role: &str) {
    if leads.is_empty() {
        println!("No leads yet.");
        return;
    }

    println!(
        "{:<38} {:<26} {:<16} {}",
        "ID", "Created", "Status", "Agent msgs"
    );
    println!("{}", "-".repeat(92));
    for lead in leads {
        let status = lead
            .status
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<26} {:<16} {}",
            lead.id.as_str(),
            lead.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            status,
            lead.messages_from(agent_role)
        );
    }
}

fn print_report(report: &StatsReport, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let stats = &report.stats;
    println!();
    println!("Leads:               {}", stats.total);
    println!("New this week:       {}", stats.new_this_week);
    println!("Agent messages:      {}", stats.agent_messages);
    println!("Appointments booked: {}", stats.appointments_booked);

    if !report.by_status.is_empty() {
        println!();
        println!("By status:");
        for (status, count) in &report.by_status {
            println!("  {:<18} {}", status, count);
        }
    }

    println!();
    println!("Last 7 days:");
    for day in &report.daily {
        println!("  {}  {:>4} {}", day.date, day.count, "#".repeat(day.count.min(50)));
    }

    Ok(())
}
