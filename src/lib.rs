pub mod cli;
pub mod coerce;
pub mod config;
pub mod error;
pub mod ingest;
pub mod load;
pub mod lock;
mod map_cmd;
pub mod mapping;
pub mod normalize;
pub mod response;
pub mod sheet;
pub mod store;
mod structure;
pub mod table;
mod upload;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, ConfigArgs, InitConfigArgs},
    config::IngestConfig,
};

pub use crate::{
    config::InsertPolicy,
    error::{IngestError, InputError},
    ingest::{Ingestor, Upload, UploadOutcome},
    load::{BulkLoader, LoadEvent, LoadResult, LoadState},
    mapping::{ColumnMapper, ColumnMapping},
    store::{Session, TargetColumn},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("trade_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Upload(args) => upload::execute(&args),
        Commands::Structure(args) => structure::execute(&args),
        Commands::Map(args) => map_cmd::execute(&args),
        Commands::InitConfig(args) => handle_init_config(&args),
    }
}

pub(crate) fn load_config(args: &ConfigArgs) -> Result<IngestConfig> {
    let mut config = IngestConfig::load_or_default(args.config.as_deref())
        .with_context(|| format!("Loading ingest configuration from {:?}", args.config))?;
    if let Some(table) = &args.table {
        config.table = table.trim().to_string();
    }
    config.validate()?;
    Ok(config)
}

fn handle_init_config(args: &InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite it",
            args.output
        );
    }
    let config = IngestConfig::default();
    config
        .save(&args.output)
        .with_context(|| format!("Writing default configuration to {:?}", args.output))?;
    info!(
        "Default configuration for table '{}' ({} dictionary entries) written to {:?}",
        config.table,
        config.manual_mapping.len(),
        args.output
    );
    Ok(())
}
