use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::InsertPolicy;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Replace-load customs trade spreadsheets into a SQLite table",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replace the contents of the target table with the rows of a workbook
    Upload(UploadArgs),
    /// Show the columns of the target table
    Structure(StructureArgs),
    /// Show how the headers of a workbook would map onto the target table
    Map(MapArgs),
    /// Write the default ingestion configuration to a YAML file
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Ingestion configuration (YAML); built-in defaults when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Target table, overriding the configuration
    #[arg(short, long)]
    pub table: Option<String>,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Workbook to load (.xlsx, .xls or .xlsm)
    #[arg(short, long)]
    pub file: PathBuf,
    /// MIME type reported by the client, checked alongside the extension
    #[arg(long)]
    pub mime: Option<String>,
    /// SQLite database holding the target table
    #[arg(long)]
    pub db: PathBuf,
    #[command(flatten)]
    pub target: ConfigArgs,
    /// How to react to rejected rows
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,
    /// Abort and roll back once more than this many rows fail
    #[arg(long = "max-row-errors")]
    pub max_row_errors: Option<usize>,
    /// Print the result document as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct StructureArgs {
    /// SQLite database holding the target table
    #[arg(long)]
    pub db: PathBuf,
    #[command(flatten)]
    pub target: ConfigArgs,
    /// Print the column list as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    /// Workbook whose headers should be mapped
    #[arg(short, long)]
    pub file: PathBuf,
    /// SQLite database to introspect; the configured column list is used without it
    #[arg(long)]
    pub db: Option<PathBuf>,
    #[command(flatten)]
    pub target: ConfigArgs,
    /// Print the mapping as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Destination YAML file
    #[arg(short, long)]
    pub output: PathBuf,
    /// Overwrite the destination if it exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Skip rejected rows until the failure ceiling is exceeded
    Tolerant,
    /// Abort when the first data row is rejected
    FirstRowProbe,
}

impl From<PolicyArg> for InsertPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Tolerant => InsertPolicy::Tolerant,
            PolicyArg::FirstRowProbe => InsertPolicy::FirstRowProbe,
        }
    }
}
