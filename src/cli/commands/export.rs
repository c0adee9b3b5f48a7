//! `axis export` command - CSV exports of inspection data

use miette::Result;
use std::path::PathBuf;

use crate::cli::commands::rslt::StatusFilter;
use crate::cli::helpers::{open_workspace, write_output};
use crate::cli::GlobalOpts;
use crate::core::report::{self, RowFilter};

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Work order whose inspection table is exported
    #[arg(long, short = 'w', required_unless_present = "all")]
    pub wo: Option<String>,

    /// Only rows with this status
    #[arg(long, short = 's', default_value = "all", conflicts_with = "all")]
    pub status: StatusFilter,

    /// Case-insensitive method substring
    #[arg(long, short = 'm', conflicts_with = "all")]
    pub method: Option<String>,

    /// Every result of every work order, one row per result
    #[arg(long, conflicts_with = "wo")]
    pub all: bool,

    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: ExportArgs, global: &GlobalOpts) -> Result<()> {
    let ws = open_workspace(&args.drawing)?;
    let features = ws.store.list_features(None)?;

    let bytes = match args.wo.as_deref().filter(|_| !args.all) {
        Some(wo) => {
            let results = ws.store.get_results(wo)?;
            let filter = RowFilter {
                status: args.status.into(),
                method: args.method.clone(),
            };
            let rows = report::build_rows(&features, &results, &filter);
            log::info!("exporting {} row(s) of {}", rows.len(), wo.trim());
            report::export_filtered(&rows)?
        }
        None => {
            let all = ws.store.export_all_results()?;
            log::info!("exporting results of {} work order(s)", all.len());
            report::export_all_results(&features, &all)?
        }
    };

    write_output(&bytes, args.output.as_ref(), global.quiet)
}
