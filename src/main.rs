//! StatusRelay - daily status publishing
//!
//! Main entry point for the StatusRelay CLI.

use clap::{Parser, Subcommand};
use statusrelay::config::{validate_config, RelayConfig, DEFAULT_PROFILE};
use statusrelay::model::{Month, Platform, RetryUpdateRequest, Update, WorkLogEntryInput};
use statusrelay::publish::{PlatformClients, PublishOrchestrator};
use statusrelay::server::RelayServer;
use statusrelay::storage::SqliteUpdateStore;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// StatusRelay - publish daily status updates to Slack, Teams and Jira
#[derive(Parser, Debug)]
#[command(name = "statusrelay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/statusrelay/config.yaml)
    #[arg(short, long, env = "STATUSRELAY_CONFIG")]
    config: Option<String>,

    /// User whose profile and records are used
    #[arg(short, long, default_value = DEFAULT_PROFILE)]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter configuration file
    Init,

    /// Run the HTTP API
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show one update
    Show {
        /// Update ID
        id: String,
    },

    /// List updates, newest first
    List {
        /// Limit to one month (YYYY-MM)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Retry failed platforms of an update
    Retry {
        /// Update ID
        id: String,

        #[arg(long)]
        slack: bool,

        #[arg(long)]
        teams: bool,

        /// Re-send the work-log entries Jira has not accepted yet
        #[arg(long)]
        jira: bool,
    },

    /// Delete an update
    Delete {
        /// Update ID
        id: String,
    },

    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    if let Err(e) = statusrelay::logging::init(default_level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn config_path(config: &Option<String>) -> PathBuf {
    match config {
        Some(path) => PathBuf::from(path),
        None => RelayConfig::default_path(),
    }
}

fn load_config(config: &Option<String>) -> statusrelay::Result<RelayConfig> {
    let path = config_path(config);
    match RelayConfig::load(&path) {
        Ok(config) => Ok(config),
        Err(statusrelay::RelayError::Config(msg)) if msg.contains("Config file not found") => {
            Err(statusrelay::RelayError::Config(format!(
                "No configuration found at {}. Run 'statusrelay init' first to create one.",
                path.display()
            )))
        }
        Err(e) => Err(e),
    }
}

fn build_orchestrator(config: &RelayConfig) -> statusrelay::Result<PublishOrchestrator> {
    let store = SqliteUpdateStore::open(&config.server.database)?;
    let clients = PlatformClients::http(&config.slack_api_base)?;
    Ok(PublishOrchestrator::new(Arc::new(store), Arc::new(config.clone()), clients)
        .with_pacing(config.jira_publish.pacing()))
}

async fn run(cli: Cli) -> statusrelay::Result<()> {
    if let Commands::Init = cli.command {
        return handle_init_command(&cli.config);
    }

    let config = load_config(&cli.config)?;

    if let Commands::Validate = cli.command {
        return handle_validate_command(&config);
    }

    tracing::info!(profiles = config.profiles.len(), "Configuration loaded");
    let orchestrator = build_orchestrator(&config)?;

    match cli.command {
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.server.bind.clone());
            let server = RelayServer::new(orchestrator, config.server.max_body_size);
            server
                .run(&addr)
                .await
                .map_err(|e| statusrelay::RelayError::Other(e.to_string()))?;
        }

        Commands::Show { id } => {
            let update = orchestrator.get(&cli.user, &id)?;
            print_update_detailed(&update);
        }

        Commands::List { month } => {
            let month = month.map(|m| m.parse::<Month>()).transpose()?;
            let updates = orchestrator.list(&cli.user, month)?;
            println!("Found {} updates:", updates.len());
            println!();
            for update in &updates {
                print_update_summary(update);
            }
        }

        Commands::Retry {
            id,
            slack,
            teams,
            jira,
        } => {
            let current = orchestrator.get(&cli.user, &id)?;
            let pending_entries: Vec<WorkLogEntryInput> = current
                .work_log_entries
                .iter()
                .filter(|e| !e.is_delivered())
                .map(WorkLogEntryInput::from)
                .collect();

            let request = RetryUpdateRequest {
                update_id: Some(id),
                work_log_entries: if jira { Some(pending_entries) } else { None },
                retry_slack: slack,
                retry_teams: teams,
                retry_jira: jira,
                ..Default::default()
            };
            let update = orchestrator.retry(&cli.user, request).await?;
            print_update_detailed(&update);
        }

        Commands::Delete { id } => {
            orchestrator.delete(&cli.user, &id)?;
            println!("✓ Deleted update {}", id);
        }

        Commands::Init | Commands::Validate => {
            // Handled before the orchestrator is built
        }
    }

    Ok(())
}

fn handle_init_command(config: &Option<String>) -> statusrelay::Result<()> {
    let config_file = config_path(config);

    if config_file.exists() {
        println!("Configuration already exists at {}", config_file.display());
        return Ok(());
    }

    RelayConfig::new().save(&config_file)?;

    println!("✓ Created configuration at {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. Add slack, teams and jira settings under profiles.default");
    println!("  2. Check them with:");
    println!("     statusrelay validate");
    println!("  3. Start the API:");
    println!("     statusrelay serve");

    Ok(())
}

fn handle_validate_command(config: &RelayConfig) -> statusrelay::Result<()> {
    match validate_config(config) {
        Ok(()) => {
            println!("✓ Configuration is valid ({} profiles)", config.profiles.len());
            Ok(())
        }
        Err(errors) => {
            println!("Found {} problems:", errors.len());
            for error in &errors {
                println!("  - {}", error);
            }
            Err(statusrelay::RelayError::Config(
                "Configuration validation failed".to_string(),
            ))
        }
    }
}

fn print_update_summary(update: &Update) {
    let statuses: Vec<String> = Platform::ALL
        .iter()
        .map(|p| format!("{}={}", p, update.status(*p)))
        .collect();
    println!("{}  {}  {}", update.date, update.id, statuses.join(" "));
}

fn print_update_detailed(update: &Update) {
    println!("Update {}", update.id);
    println!("  Date:    {}", update.date);
    println!("  User:    {}", update.user_id);
    println!("  Created: {}", update.created_at.to_rfc3339());
    println!("  Updated: {}", update.updated_at.to_rfc3339());
    println!();
    for platform in Platform::ALL {
        println!("  {:<6} {}", platform.as_str(), update.status(platform));
    }
    if !update.work_log_entries.is_empty() {
        println!();
        println!("  Work log:");
        for entry in &update.work_log_entries {
            let state = match entry.jira_worklog_id.as_deref() {
                Some(worklog) => format!("worklog {}", worklog),
                None => "not delivered".to_string(),
            };
            println!(
                "    {:<12} {:>6}  {}  ({})",
                entry.issue_key,
                statusrelay::timefmt::secs_to_duration(entry.time_spent_secs),
                entry.started.to_rfc3339(),
                state
            );
        }
    }
}
