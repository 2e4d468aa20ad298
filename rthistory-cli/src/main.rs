use std::{fs::OpenOptions, path::PathBuf, sync::Arc};

use anyhow::{Context, anyhow, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use rthistory_config::{
    Config, ConfigLoad, ConfigLoader, ConfigLoaderOptions, ConfigWarnings,
    InitOptions, run_config_init,
};
use rthistory_core::archive::MirrorArchive;
use rthistory_core::retrieval::{
    RetrievalPorts, RetrievalScheduler, RunSummary, StoreEndpoint,
};
use rthistory_core::store::FsRecordStore;
use rthistory_model::PatientId;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "rthistory", version)]
#[command(
    about = "Retrieves a patient's radiotherapy treatment history into a local record store"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
struct GlobalArgs {
    /// Log retrieval progress at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log everything at debug level
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to the configuration file
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Environment file to load before reading configuration
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Retrieve the treatment history of one patient
    Mrn {
        /// Medical record number of the patient
        mrn: String,
    },
    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Write a configuration file with default values
    Init {
        /// Where to write the file
        #[arg(long, default_value = "rthistory.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
        /// Skip prompts and write defaults
        #[arg(long)]
        non_interactive: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Config(ConfigCommand::Init {
            path,
            force,
            non_interactive,
        }) => {
            let written = run_config_init(&InitOptions {
                path,
                force,
                non_interactive,
            })?;
            println!("Wrote {}", written.display());
            Ok(())
        }
        Command::Mrn { mrn } => {
            let ConfigLoad { config, warnings } = load_config(&cli.global)?;
            init_tracing(&cli.global, &config)?;
            report_warnings(&warnings);
            run_retrieval(config, &mrn).await
        }
    }
}

fn load_config(args: &GlobalArgs) -> anyhow::Result<ConfigLoad> {
    ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: args.config_path.clone(),
        env_file: args.env_file.clone(),
    })
    .load()
    .context("failed to load configuration")
}

fn init_tracing(args: &GlobalArgs, config: &Config) -> anyhow::Result<()> {
    let default_filter = if args.debug {
        "debug".to_string()
    } else if args.verbose {
        format!("{},retrieval=debug", config.logging.filter)
    } else {
        config.logging.filter.clone()
    };

    let file_layer = match &config.logging.file {
        Some(path) => {
            if let Some(dir) =
                path.parent().filter(|dir| !dir.as_os_str().is_empty())
            {
                std::fs::create_dir_all(dir).with_context(|| {
                    format!("failed to create log directory {}", dir.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| {
                    format!("failed to open log file {}", path.display())
                })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

fn report_warnings(warnings: &ConfigWarnings) {
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }
}

async fn run_retrieval(config: Config, mrn: &str) -> anyhow::Result<()> {
    let mrn = mrn.trim();
    if mrn.is_empty() {
        bail!("a medical record number is required");
    }
    let patient = PatientId::new(mrn);

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    config
        .ensure_directories()
        .context("failed to prepare the record store")?;

    let mirror_root = config.archive.mirror_root.clone().ok_or_else(|| {
        anyhow!("no archive mirror configured (set archive.mirror_root or RTHISTORY_ARCHIVE_MIRROR)")
    })?;

    info!(
        storage.root = %config.storage_root().display(),
        archive.mirror = %mirror_root.display(),
        retry.max_attempts = config.retrieval.retry.max_attempts,
        endpoint.channel_capacity = config.endpoint.channel_capacity,
        "retrieval configuration in effect"
    );

    let store = Arc::new(FsRecordStore::new(config.storage_root()));
    let endpoint = Arc::new(StoreEndpoint::start(
        store.clone(),
        config.endpoint.channel_capacity,
    ));
    let archive = MirrorArchive::open(&mirror_root, endpoint.delivery_handle())
        .await
        .with_context(|| {
            format!("failed to open archive mirror {}", mirror_root.display())
        })?;

    let ports = RetrievalPorts::new(Arc::new(archive), store, endpoint.clone());
    let scheduler = RetrievalScheduler::new(ports, config.retrieval.clone());

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping after the current task");
                cancel.cancel();
            }
        }
    });

    let outcome = scheduler.run_with_cancellation(&patient, cancel).await;
    interrupt.abort();
    endpoint.shutdown().await;

    let summary = outcome.with_context(|| {
        format!("retrieval for patient {patient} could not start")
    })?;
    report_summary(&summary);
    Ok(())
}

fn report_summary(summary: &RunSummary) {
    if summary.is_complete() {
        info!(run_id = %summary.run_id, "retrieval complete");
    } else {
        warn!(run_id = %summary.run_id, "retrieval finished with gaps");
    }
    for task in &summary.abandoned {
        error!(kind = %task.kind, key = %task.key, attempts = task.attempts, "task abandoned");
    }

    println!("{summary}");
    if !summary.abandoned.is_empty() {
        println!("Abandoned tasks:");
        for task in &summary.abandoned {
            println!("  - {} {} after {} attempts", task.kind, task.key, task.attempts);
        }
    }
}
