use clap::Parser;
use client_backup::backup::client_config;
use client_backup::backup::logging::{build_subscriber, stderr_subscriber};
use client_backup::backup::run::{BackupRun, RunTimestamp};
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};

/// Dump a client's database, copy its working directory and zip both
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Client id to back up
    #[arg(short = 'n', long, env = "ACTIVE_CLIENT")]
    client: String,
    /// Location of the settings file
    #[arg(short, long, env = "GENERAL_SETTINGS")]
    config: PathBuf,
}

fn main() {
    let timestamp = RunTimestamp::now();
    if let Err(e) = client_config::load_dotenv() {
        tracing::subscriber::with_default(stderr_subscriber(&timestamp), || error!("{e}"));
        exit(1);
    }
    let args = Args::parse();

    let profile = match client_config::resolve(&args.config, &args.client) {
        Ok(profile) => profile,
        Err(e) => {
            tracing::subscriber::with_default(stderr_subscriber(&timestamp), || error!("{e}"));
            exit(1);
        }
    };

    let subscriber = match build_subscriber(profile.log_file(), &timestamp) {
        Ok(subscriber) => subscriber,
        Err(e) => {
            tracing::subscriber::with_default(stderr_subscriber(&timestamp), || error!("{e}"));
            exit(1);
        }
    };

    let res = tracing::subscriber::with_default(subscriber, || {
        info!("Loaded settings for client {:?}", profile.name());
        BackupRun::new(&profile, timestamp.clone())
            .execute()
            .inspect(|archive| info!("Created backup file: {:?}", archive))
            .inspect_err(|e| error!("{e}"))
    });

    exit(if res.is_ok() { 0 } else { 1 });
}
