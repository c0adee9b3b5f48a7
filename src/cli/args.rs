//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::cli::commands::{
    completions::CompletionsArgs, export::ExportArgs, feat::FeatCommands, init::InitArgs,
    rslt::RsltCommands, session::SessionArgs, spc::SpcArgs, tol::TolArgs,
};

#[derive(Parser)]
#[command(name = "axis")]
#[command(author, version, about = "Drawing balloons and inspection results")]
#[command(long_about = "Balloon the features of a drawing, attach tolerances to them and record \
    measurements per work order. Data lives in a SQLite store next to the drawing.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open or create the store beside a drawing, importing legacy files once
    Init(InitArgs),

    /// Feature (balloon) management
    #[command(subcommand)]
    Feat(FeatCommands),

    /// Inspection result entry and queries
    #[command(subcommand)]
    Rslt(RsltCommands),

    /// Export inspection rows or every recorded result as CSV
    Export(ExportArgs),

    /// Process capability report across work orders
    Spc(SpcArgs),

    /// Parse a tolerance expression
    Tol(TolArgs),

    /// Drive an editing session from line commands on stdin
    Session(SessionArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, tsv for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just IDs, one per line
    Id,
}

impl OutputFormat {
    /// Replace `Auto` with the command's natural format
    pub fn or(self, fallback: OutputFormat) -> OutputFormat {
        match self {
            OutputFormat::Auto => fallback,
            f => f,
        }
    }

    /// Resolve `Auto` through the configured `default_format`, then the
    /// command's natural format
    pub fn resolve(self, configured: Option<&str>, fallback: OutputFormat) -> OutputFormat {
        if self != OutputFormat::Auto {
            return self;
        }
        let from_config = configured.and_then(|name| {
            let parsed = OutputFormat::from_str(name.trim(), true);
            if parsed.is_err() {
                log::warn!("ignoring unknown default_format '{}'", name);
            }
            parsed.ok()
        });
        from_config.unwrap_or(OutputFormat::Auto).or(fallback)
    }
}
