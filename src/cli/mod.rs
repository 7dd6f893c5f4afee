pub mod activity;
pub mod console;
pub mod render;
pub mod shutdown;

use std::{path::PathBuf, sync::Arc, time::Duration};

use activity::TerminalActivity;
use anyhow::Result;
use clap::{Parser, Subcommand};
use console::run_console;
use render::render_view;
use shutdown::detect_shutdown;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};

use crate::{
    opener::{NoopOpener, PlatformOpener, SystemOpener},
    platform::Platform,
    storage::json_store::JsonFileStore,
    tracker::{
        machine::TrackerConfig,
        service::spawn_tracker,
        snapshot::NoLiveActivity,
    },
    utils::{
        clock::DefaultClock,
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, LOG_PREFIX},
    },
};

const STORE_FILE: &str = "usage.json";
const LOG_DIR: &str = "logs";

#[derive(Parser, Debug)]
#[command(name = "Usagewatch", version, long_about = None)]
#[command(about = "Stopwatch for the time spent on social platforms", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Log level written to the log files")]
    log_filter: Option<LevelFilter>,
    #[arg(long, global = true, help = "Mirror logs to stderr")]
    log_console: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Start the interactive tracker in the current console")]
    Run {
        #[command(flatten)]
        command: RunCommand,
    },
    #[command(about = "Print today's usage per platform")]
    Totals {},
    #[command(about = "List supported platforms and their launch shortcuts")]
    Platforms {},
}

#[derive(Parser, Debug)]
struct RunCommand {
    #[arg(
        long,
        default_value_t = 100,
        help = "Refresh period of the displayed time in milliseconds"
    )]
    display_tick_ms: u64,
    #[arg(
        long,
        default_value_t = 1000,
        help = "Refresh period of the live status line in milliseconds. Values under a second are raised to a second"
    )]
    activity_tick_ms: u64,
    #[arg(long, help = "Don't open the platform when a session starts or resumes")]
    no_open: bool,
    #[arg(long, help = "Don't print the live status line")]
    quiet: bool,
    #[arg(
        long,
        help = "Start with the session of a launch shortcut, e.g. com.usagewatch.startYouTube"
    )]
    shortcut: Option<String>,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => ensure_dir(dir)?,
        None => create_application_default_path()?,
    };
    let log_dir = ensure_dir(app_dir.join(LOG_DIR))?;
    enable_logging(LOG_PREFIX, &log_dir, args.log_filter, args.log_console)?;

    match args.commands {
        Commands::Run { command } => run_tracker(app_dir, command).await,
        Commands::Totals {} => print_totals(app_dir).await,
        Commands::Platforms {} => {
            for platform in Platform::ALL {
                println!(
                    "{}\t{}\t{}",
                    platform.id(),
                    platform.name(),
                    platform.shortcut_type()
                );
            }
            Ok(())
        }
    }
}

async fn run_tracker(app_dir: PathBuf, command: RunCommand) -> Result<()> {
    let store = JsonFileStore::open(app_dir.join(STORE_FILE)).await?;
    let opener: Arc<dyn PlatformOpener> = if command.no_open {
        Arc::new(NoopOpener)
    } else {
        Arc::new(SystemOpener)
    };
    let config = TrackerConfig::new(
        Duration::from_millis(command.display_tick_ms),
        Duration::from_millis(command.activity_tick_ms),
    );

    let shutdown = CancellationToken::new();
    let (handle, task) = spawn_tracker(
        store,
        Arc::new(DefaultClock),
        opener,
        Box::new(TerminalActivity::new(!command.quiet)),
        config,
        shutdown.clone(),
    )
    .await;
    info!("Tracking into {}", app_dir.display());

    if let Some(shortcut) = command.shortcut {
        let platform = handle.launch_shortcut(&shortcut)?;
        println!("Started {platform} from shortcut");
    }

    let (_, console_result, tracker_result) = tokio::join!(
        detect_shutdown(shutdown.clone()),
        run_console(handle, shutdown.clone()),
        task,
    );
    console_result?;
    tracker_result??;
    Ok(())
}

async fn print_totals(app_dir: PathBuf) -> Result<()> {
    let store = JsonFileStore::open(app_dir.join(STORE_FILE)).await?;
    let (handle, task) = spawn_tracker(
        store,
        Arc::new(DefaultClock),
        Arc::new(NoopOpener),
        Box::new(NoLiveActivity),
        TrackerConfig::default(),
        CancellationToken::new(),
    )
    .await;

    let view = handle.view().await?;
    print!("{}", render_view(&view, false));
    handle.shutdown()?;
    task.await??;
    Ok(())
}
