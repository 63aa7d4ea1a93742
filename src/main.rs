//! Binary entrypoint for the pacast CLI.
//!
//! Commands:
//! - `init` - write a default `config.toml`
//! - `start` - run the control plane until Ctrl-C
//! - `status` - print the current state document and queue summary
//! - `reset` - force the observable state back to IDLE (offline recovery)
//! - `schedule add|list|remove` - schedule document management
//! - `logs` - show or prune the broadcast log
//!
//! The HTTP surface that fronts this control plane in production is a
//! separate deployment; this binary is the headless authority plus the
//! operator tooling around it. `status`, `reset`, and the schedule/log
//! commands open the document store directly and therefore run against a
//! stopped instance (the data directory is exclusively locked while
//! `start` is live).

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use pacast::config::Config;
use pacast::controller::{scheduler, PaController, Task, TaskPayload};
use pacast::storage::{ScheduleDoc, Storage, SCHEDULE_PENDING};
use pacast::validation;

#[derive(Parser)]
#[command(name = "pacast")]
#[command(about = "Control plane for a public address (PA) broadcast server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Start the control plane (runs until Ctrl-C)
    Start,
    /// Show the current system state and queue summary
    Status,
    /// Force the observable state back to IDLE (offline recovery)
    Reset,
    /// Manage schedule documents
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Show or prune the broadcast log
    Logs {
        /// Number of entries to show, newest first
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Delete every log entry recorded for this user instead of listing
        #[arg(long)]
        prune_user: Option<String>,
    },
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// Add a schedule document
    Add {
        /// Announcement message
        #[arg(short, long)]
        message: String,
        /// Date the schedule fires, YYYY-MM-DD (local timezone)
        #[arg(short, long)]
        date: String,
        /// Time the schedule fires, HH:MM 24-hour (local timezone)
        #[arg(short, long)]
        time: String,
        /// Repeat policy (free-form, e.g. "none", "daily")
        #[arg(short, long, default_value = "none")]
        repeat: String,
        /// Target zones
        #[arg(short, long, default_value = "All Zones")]
        zones: String,
        /// Submitting user recorded in the audit log
        #[arg(short, long, default_value = "Admin")]
        user: String,
    },
    /// List schedule documents in firing order
    List,
    /// Remove a schedule document by id
    Remove {
        id: String,
        /// Acting user recorded in the audit log
        #[arg(short, long, default_value = "Admin")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config early to configure logging (Init writes the default later)
    let pre_config = Config::load(&cli.config).await.ok();
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            println!("Wrote default configuration to {}", cli.config);
        }
        Commands::Start => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting pacast v{}", env!("CARGO_PKG_VERSION"));
            run_control_plane(config).await?;
        }
        Commands::Status => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let storage = Storage::open(&config.storage.data_dir)?;
            show_status(&storage)?;
        }
        Commands::Reset => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let storage = Storage::open(&config.storage.data_dir)?;
            storage.reset_state()?;
            storage.reset_emergency()?;
            println!("System state reset to IDLE; emergency status cleared.");
        }
        Commands::Schedule { command } => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let storage = Storage::open(&config.storage.data_dir)?;
            run_schedule_command(&storage, &config, command)?;
        }
        Commands::Logs { limit, prune_user } => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let storage = Storage::open(&config.storage.data_dir)?;
            match prune_user {
                Some(user) => {
                    let pruned = storage.prune_logs_for_user(&user)?;
                    println!("Pruned {pruned} log entries for '{user}'.");
                }
                None => {
                    let entries = storage.recent_logs(limit)?;
                    if entries.is_empty() {
                        println!("No log entries.");
                    }
                    for entry in entries {
                        println!(
                            "{} [{}] {}: {} - {}",
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.log_type,
                            entry.user,
                            entry.action,
                            entry.details
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

/// Bring up storage and the controller, replay pending schedules, and run
/// the promotion loop until Ctrl-C.
async fn run_control_plane(config: Config) -> Result<()> {
    let storage = Arc::new(Storage::open(&config.storage.data_dir)?);
    let controller = Arc::new(PaController::new(storage.clone()));

    if config.controller.replay_pending {
        replay_pending_schedules(&storage, &controller)?;
    }

    let tick = Duration::from_millis(config.controller.tick_ms.max(1));
    let loop_handle = scheduler::spawn_scheduler(controller.clone(), tick);
    info!(
        "Control plane running for station '{}' ({} zones)",
        config.station.name,
        config.station.zones.len()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    controller.shutdown();
    loop_handle.await?;
    info!("Scheduler loop stopped; exiting");
    Ok(())
}

/// Queue reconstruction after a restart: replay every schedule document
/// still marked Pending through the normal admission path. Documents with
/// unparseable date/time fields are skipped with a warning.
fn replay_pending_schedules(storage: &Storage, controller: &PaController) -> Result<()> {
    let mut replayed = 0;
    for doc in storage.list_schedules()? {
        if doc.status != SCHEDULE_PENDING {
            continue;
        }
        let due = match validation::parse_schedule_datetime(&doc.date, &doc.time) {
            Ok(due) => due,
            Err(e) => {
                warn!("Skipping schedule {} during replay: {}", doc.id, e);
                continue;
            }
        };
        let payload = TaskPayload::for_user(doc.user.as_str())
            .with_content(doc.message.as_str())
            .with_zones(doc.zones.split(',').map(|z| z.trim().to_string()).collect());
        if !controller.request(Task::schedule(doc.id.as_str(), payload, due)) {
            warn!("Schedule {} rejected during replay", doc.id);
            continue;
        }
        replayed += 1;
    }
    if replayed > 0 {
        info!("Replayed {} pending schedules into the queue", replayed);
    }
    Ok(())
}

fn show_status(storage: &Storage) -> Result<()> {
    match storage.read_system_state()? {
        Some(state) => {
            println!("Mode:     {}", state.mode);
            println!("Priority: {}", state.priority);
            match state.active_task {
                Some(task) => {
                    let id = task["id"].as_str().unwrap_or("?");
                    let kind = task["kind"].as_str().unwrap_or("?");
                    let user = task["payload"]["user"].as_str().unwrap_or("?");
                    println!("Active:   {kind} task {id} (user {user})");
                }
                None => println!("Active:   none"),
            }
            println!("Updated:  {}", state.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => println!("No state document (never started?)"),
    }

    let schedules = storage.list_schedules()?;
    let pending = schedules.iter().filter(|d| d.status == SCHEDULE_PENDING).count();
    println!("Schedules: {} total, {} pending", schedules.len(), pending);

    let emergency = storage.read_emergency_status()?;
    if emergency.active {
        println!(
            "Emergency: ACTIVE (triggered by {})",
            emergency.triggered_by.as_deref().unwrap_or("unknown")
        );
    } else {
        println!("Emergency: inactive");
    }
    Ok(())
}

fn run_schedule_command(storage: &Storage, config: &Config, command: ScheduleCommands) -> Result<()> {
    match command {
        ScheduleCommands::Add {
            message,
            date,
            time,
            repeat,
            zones,
            user,
        } => {
            let message =
                validation::sanitize_content(&message, config.controller.max_content_bytes)?;
            validation::validate_schedule_fields(&message, &date, &time, &repeat, &zones)?;

            let doc = ScheduleDoc {
                id: uuid::Uuid::new_v4().to_string(),
                message: message.clone(),
                date,
                time,
                repeat,
                zones,
                status: SCHEDULE_PENDING.to_string(),
                user: user.clone(),
            };
            storage.put_schedule(&doc)?;
            if let Err(e) = storage.append_log(
                &user,
                "Schedule Created",
                "Schedule",
                &format!("Scheduled: {message}"),
            ) {
                warn!("Failed to write audit log: {}", e);
            }
            println!("Created schedule {} ({} {})", doc.id, doc.date, doc.time);
        }
        ScheduleCommands::List => {
            let schedules = storage.list_schedules()?;
            if schedules.is_empty() {
                println!("No schedules.");
            }
            for doc in schedules {
                println!(
                    "{}  {} {}  [{}]  {}  ({})",
                    doc.id, doc.date, doc.time, doc.status, doc.message, doc.zones
                );
            }
        }
        ScheduleCommands::Remove { id, user } => {
            if storage.delete_schedule(&id)? {
                if let Err(e) = storage.append_log(
                    &user,
                    "Schedule Deleted",
                    "Schedule",
                    &format!("Deleted schedule ID: {id}"),
                ) {
                    warn!("Failed to write audit log: {}", e);
                }
                println!("Removed schedule {id}");
            } else {
                println!("No schedule with id {id}");
            }
        }
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|cfg| cfg.logging.file.clone());
    if let Some(file) = log_file {
        if let Ok(f) = std::fs::OpenOptions::new().create(true).append(true).open(&file) {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));

            // If stdout is a terminal, echo to console as well as the file;
            // under a service manager only the file is written.
            let is_tty = atty::is(atty::Stream::Stdout);

            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        } else {
            builder.format(|fmt, record| {
                writeln!(
                    fmt,
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                )
            });
        }
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
