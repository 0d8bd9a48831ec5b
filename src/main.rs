//! # FinClaw: scheduled task execution and recovery engine
//!
//! Runs the intent ledger, coordinator and recovery sweeper, and serves the
//! local API the dashboard talks to.
//!
//! Usage:
//!   finclaw                              # serve (default port 3917)
//!   finclaw serve --port 8080            # custom port
//!   finclaw sync-now                     # one coordinator pass, then exit
//!   finclaw diagnostics                  # missed / stuck report
//!   finclaw intents --status failed      # list intents
//!   finclaw cancel finance-sync bank-a 2026-03-02
//!   finclaw retry <intent-id>
//!   finclaw cleanup --days 30

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use finclaw_core::config::FinClawConfig;
use finclaw_scheduler::service::{
    CancelTaskRequest, CleanupRequest, GetIntentsRequest, RetryTaskRequest,
};
use finclaw_scheduler::{
    ExecutorRegistry, HttpExecutor, IntentLedger, ScheduleRegistry, SchedulerEngine,
    SchedulerService,
};

#[derive(Parser)]
#[command(
    name = "finclaw",
    version,
    about = "⏰ FinClaw — scheduled task execution and recovery engine"
)]
struct Cli {
    /// Config file (default: ~/.finclaw/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Ledger database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loops and the HTTP gateway
    Serve {
        /// Gateway port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Serve the API without starting the scheduler loops
        #[arg(long)]
        paused: bool,
    },
    /// Run one coordinator pass and wait for dispatched executors
    SyncNow,
    /// Print today's intents and missed / stuck candidates
    Diagnostics,
    /// List intents, newest first
    Intents {
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
        #[arg(long)]
        scheduler_type: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Delete intents older than the retention horizon (running rows are kept)
    Cleanup {
        /// Days to keep (default: scheduler.retention_days)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Cancel the live intent for one task on one date
    Cancel {
        scheduler_type: String,
        task_id: String,
        /// YYYY-MM-DD
        date: NaiveDate,
    },
    /// Reopen a failed intent, even when its retries are exhausted
    Retry { intent_id: String },
    /// List enabled schedules
    Schedules {
        #[arg(long)]
        scheduler_type: Option<String>,
    },
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(cli: &Cli) -> Result<FinClawConfig> {
    let mut config = match &cli.config {
        Some(path) => FinClawConfig::load_from(&expand_path(path))?,
        None => FinClawConfig::load()?,
    };
    if let Some(db_path) = &cli.db_path {
        config.db_path = db_path.clone();
    }
    Ok(config)
}

/// Open the ledger, seed schedules and settings, register executors.
fn build_engine(config: &FinClawConfig) -> Result<Arc<SchedulerEngine>> {
    let db_path = config.resolved_db_path();
    let ledger = Arc::new(IntentLedger::open(&db_path)?);
    tracing::info!("💾 Ledger: {}", db_path.display());

    let now = chrono::Utc::now();
    let seeded = ledger.sync_schedules(&config.schedules, now)?;
    if seeded > 0 {
        tracing::info!("📋 {seeded} schedule(s) synced from config");
    }

    // Settings saved from the dashboard win over the config file.
    let settings = match ledger.load_settings()? {
        Some(saved) => saved,
        None => config.scheduler.clone(),
    };

    let mut executors = ExecutorRegistry::new();
    for entry in &config.executors {
        match HttpExecutor::from_entry(entry) {
            Ok(executor) => executors.register(&entry.scheduler_type, Arc::new(executor)),
            Err(e) => tracing::warn!("⚠️ Skipping executor: {e}"),
        }
    }
    if executors.is_empty() {
        tracing::warn!("⚠️ No executors configured; intents will stay pending");
    }

    let schedules: Arc<dyn ScheduleRegistry> = ledger.clone();
    Ok(Arc::new(SchedulerEngine::new(
        ledger, schedules, executors, settings,
    )))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "finclaw=debug,finclaw_core=debug,finclaw_scheduler=debug,finclaw_gateway=debug,tower_http=debug"
    } else {
        "finclaw=info,finclaw_core=info,finclaw_scheduler=info,finclaw_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(&cli)?;
    std::fs::create_dir_all(config.resolved_data_dir())?;
    let engine = build_engine(&config)?;
    let service = SchedulerService::new(engine.clone());

    match cli.command.unwrap_or(Command::Serve {
        port: None,
        paused: false,
    }) {
        Command::Serve { port, paused } => {
            let mut gateway = config.gateway.clone();
            if let Some(port) = port {
                gateway.port = port;
            }

            println!("⏰ FinClaw v{}", env!("CARGO_PKG_VERSION"));
            println!("   🌐 API:       http://{}:{}/api/v1/scheduler/status", gateway.host, gateway.port);
            println!("   🗄️  Ledger:    {}", config.resolved_db_path().display());
            println!("   🔌 Executors: {}", engine.status().executors.join(", "));
            println!();

            if paused || !engine.settings().enabled {
                tracing::info!("⏸️ Scheduler loops not started (use POST /api/v1/scheduler/start)");
            } else {
                engine.start();
            }

            tokio::select! {
                result = finclaw_gateway::start(&gateway, service) => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("🛑 Ctrl-C received, shutting down");
                }
            }
            engine.shutdown().await;
        }
        Command::SyncNow => {
            let resp = service.sync_now();
            engine.wait_idle().await;
            print_json(&resp)?;
        }
        Command::Diagnostics => print_json(&service.get_diagnostics())?,
        Command::Intents {
            limit,
            offset,
            scheduler_type,
            status,
        } => {
            let resp = service.get_intents(GetIntentsRequest {
                limit,
                offset,
                scheduler_type,
                status,
                ..GetIntentsRequest::default()
            });
            print_json(&resp)?;
        }
        Command::Cleanup { days } => {
            print_json(&service.cleanup_older_than(CleanupRequest {
                retention_days: days,
            }))?;
        }
        Command::Cancel {
            scheduler_type,
            task_id,
            date,
        } => {
            print_json(&service.cancel_task(CancelTaskRequest {
                scheduler_type,
                task_id,
                intended_date: date,
            }))?;
        }
        Command::Retry { intent_id } => {
            print_json(&service.retry_task(RetryTaskRequest { intent_id }))?;
        }
        Command::Schedules { scheduler_type } => {
            print_json(&service.list_schedules(scheduler_type.as_deref()))?;
        }
    }

    Ok(())
}
