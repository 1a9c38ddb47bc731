pub mod daemon_path;
pub mod process;
pub mod records;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{kill_previous_servers, restart_server};
use records::{
    process_bridge_command, process_ingest_command, process_records_command,
    process_stats_command, RecordsCommand, StatsCommand,
};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{args::TrackerOptions, start_daemon, storage::record_storage::RecordStorageImpl, DaemonConfig},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "FlowRecord", version, long_about = None)]
#[command(about = "Records which window holds focus and when the session changes", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application, replacing a running one")]
    Init {
        #[command(flatten)]
        tracker: TrackerOptions,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for debugging"
    )]
    Serve {
        #[command(flatten)]
        tracker: TrackerOptions,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "List stored activity records, newest first")]
    Records {
        #[command(flatten)]
        command: RecordsCommand,
    },
    #[command(about = "Per machine and day totals")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
    #[command(about = "Store one record given as json, the way the records endpoint takes it")]
    Ingest { record: String },
    #[command(about = "Answer a message of the display surface, e.g. getRecords")]
    Bridge { message: String },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    let prefix = match args.commands {
        Commands::Serve { .. } => DAEMON_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir.join("logs"), logging_level, args.log)?;

    match args.commands {
        Commands::Init { tracker } => restart_server(&app_dir, &tracker),
        Commands::Stop {} => {
            kill_previous_servers()?;
            Ok(())
        }
        Commands::Serve { tracker } => start_daemon(DaemonConfig::new(app_dir, tracker)).await,
        Commands::Records { command } => {
            process_records_command(open_storage(&app_dir)?, command).await
        }
        Commands::Stats { command } => process_stats_command(open_storage(&app_dir)?, command).await,
        Commands::Ingest { record } => {
            process_ingest_command(open_storage(&app_dir)?, &record).await
        }
        Commands::Bridge { message } => {
            process_bridge_command(open_storage(&app_dir)?, &message).await
        }
    }
}

fn open_storage(app_dir: &std::path::Path) -> Result<RecordStorageImpl> {
    Ok(RecordStorageImpl::new(app_dir.join("records"))?)
}
