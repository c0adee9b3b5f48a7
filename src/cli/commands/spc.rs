//! `axis spc` command - capability statistics across work orders

use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::helpers::{open_workspace, write_output};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::spc;

#[derive(clap::Args, Debug)]
pub struct SpcArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: SpcArgs, global: &GlobalOpts) -> Result<()> {
    let ws = open_workspace(&args.drawing)?;
    let dataset = spc::load_dataset(&ws.store)?;

    let content = match ws.format(global.format, OutputFormat::Md) {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&dataset).into_diagnostic()?;
            json.push('\n');
            json
        }
        _ => spc::markdown_report(&ws.drawing.file_name(), &dataset),
    };

    write_output(content.as_bytes(), args.output.as_ref(), global.quiet)
}
