//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docgate")]
#[command(
    author,
    version,
    about = "Role-gated question answering over internal documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to DOCGATE_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question as a role
    Ask(AskArgs),

    /// Show what a role can see
    Roles(RolesArgs),

    /// Import chunks from a JSONL file
    Import(ImportArgs),

    /// Show recent audit events
    Audit(AuditArgs),

    /// Show index status
    Status,
}

#[derive(Args)]
pub struct AskArgs {
    /// Question text
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Authenticated role of the caller
    #[arg(short, long, env = "DOCGATE_ROLE")]
    pub role: String,

    /// Username recorded in the audit log
    #[arg(short, long, env = "USER", default_value = "anonymous")]
    pub user: String,

    /// Sources handed to generation (0 = configured default)
    #[arg(short = 'n', long, default_value = "0")]
    pub top_k: usize,

    /// Include source previews
    #[arg(long)]
    pub full: bool,
}

#[derive(Args)]
pub struct RolesArgs {
    /// Role to describe
    #[arg(required_unless_present = "list")]
    pub role: Option<String>,

    /// List every role and alias
    #[arg(long, conflicts_with = "role")]
    pub list: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    /// JSONL file, one chunk per line
    pub file: PathBuf,

    /// Skip chunks without an embedding instead of calling the embedding service
    #[arg(long)]
    pub no_embed: bool,
}

#[derive(Args)]
pub struct AuditArgs {
    /// Number of events
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
