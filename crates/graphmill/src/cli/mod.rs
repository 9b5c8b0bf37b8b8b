pub mod id;
pub mod ingest;
pub mod policy;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "graphmill",
    about = "Turn tabular records into a shared knowledge graph",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract a CSV file into the graph store and print run statistics
    Ingest(IngestArgs),
    /// Print the merged access policy for a set of roles
    Policy {
        /// Role names; unknown roles are ignored
        #[arg(required = true)]
        roles: Vec<String>,
        /// JSON policy table to use instead of the built-in roles
        #[arg(long)]
        table: Option<PathBuf>,
    },
    /// Print the stable entity id for a label and its properties
    Id {
        /// Node label (e.g., Employee)
        label: String,
        /// Properties as key=value pairs
        properties: Vec<String>,
    },
}

#[derive(Args)]
pub struct IngestArgs {
    /// CSV file to ingest
    pub path: PathBuf,
    /// SQLite database file (overrides GRAPHMILL_DATABASE)
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Chat-completions base URL (overrides GRAPHMILL_ORACLE_URL)
    #[arg(long)]
    pub oracle_url: Option<String>,
    /// Model name (overrides GRAPHMILL_ORACLE_MODEL)
    #[arg(long)]
    pub model: Option<String>,
    /// Documents per batch
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Simultaneous oracle calls
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Minimum edge confidence
    #[arg(long)]
    pub threshold: Option<f64>,
    /// CSV field delimiter
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,
}
