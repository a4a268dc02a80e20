pub mod daemon_path;
pub mod process;
pub mod tracking;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use process::{kill_previous_servers, restart_server};
use tracing::{info, level_filters::LevelFilter};
use tracking::{attach_note, describe_current_tracking};

use crate::{
    config::Settings,
    daemon::start_daemon,
    link::default_link,
    remote::remote_from_settings,
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Zeitrack", version, long_about = None)]
#[command(about = "Tracks time by turning a Zei tracker", long_about = None)]
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
    #[command(about = "Starts a daemon for the application")]
    Init {},
    #[command(
        about = "Run a daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {},
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Show what is tracked right now and for how long")]
    Status {},
    #[command(about = "Attach a note to the current tracking. #label marks a tag")]
    Note { text: String },
    #[command(about = "List nearby Bluetooth devices")]
    Scan {
        #[arg(long, default_value_t = 5, help = "How long to scan for")]
        seconds: u64,
    },
    #[command(about = "Store device address and API credentials")]
    Configure {
        #[arg(long)]
        device_mac: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        api_secret: Option<String>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir.join("logs"), logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => restart_server(&app_dir),
        Commands::Stop {} => kill_previous_servers(),
        Commands::Serve {} => start_daemon(app_dir).await,
        Commands::Status {} => {
            let remote = remote_from_settings(&Settings::load(&app_dir));
            for line in describe_current_tracking(remote.as_ref(), Utc::now()).await? {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Note { text } => {
            let remote = remote_from_settings(&Settings::load(&app_dir));
            let note = attach_note(remote.as_ref(), &text).await?;
            println!("Attached \"{}\" with {} tag(s)", note.text, note.tags.len());
            Ok(())
        }
        Commands::Scan { seconds } => {
            let mut link = default_link().await?;
            for device in link.scan(Duration::from_secs(seconds)).await? {
                println!(
                    "{}\t{}",
                    device.address,
                    device.name.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Commands::Configure {
            device_mac,
            api_key,
            api_secret,
        } => {
            let mut settings = Settings::load(&app_dir);
            if let Some(v) = device_mac {
                settings.device_mac = v;
            }
            if let Some(v) = api_key {
                settings.api_key = v;
            }
            if let Some(v) = api_secret {
                settings.api_secret = v;
            }
            settings.save(&app_dir)?;
            info!("Saved settings to {:?}", Settings::path(&app_dir));
            println!("Saved {:?}", Settings::path(&app_dir));
            Ok(())
        }
    }
}
