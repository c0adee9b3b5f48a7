//! `axis init` command - create or open the store beside a drawing

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::helpers::open_workspace;
use crate::cli::GlobalOpts;
use crate::core::drawing::Drawing;
use crate::core::store::{StoreOrigin, META_SKIPPED_ROWS};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Drawing file (the PDF itself need not exist yet)
    pub drawing: PathBuf,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let existed = Drawing::new(&args.drawing)
        .into_diagnostic()?
        .store_path()
        .exists();

    let ws = open_workspace(&args.drawing)?;
    if global.quiet {
        return Ok(());
    }

    let store_path = ws.store.path().display().to_string();
    if existed {
        println!(
            "{} Store already present at {}",
            style("•").dim(),
            style(&store_path).cyan()
        );
    } else {
        match ws.store.origin()? {
            StoreOrigin::LegacyImport => println!(
                "{} Imported legacy balloon files into {}",
                style("✓").green(),
                style(&store_path).cyan()
            ),
            StoreOrigin::Fresh => println!(
                "{} Created {}",
                style("✓").green(),
                style(&store_path).cyan()
            ),
        }
    }

    let features = ws.store.list_features(None)?.len();
    let orders = ws.store.list_work_orders()?.len();
    println!(
        "  {} feature(s), {} work order(s)",
        style(features).cyan(),
        style(orders).cyan()
    );

    if let Some(skipped) = ws.store.meta(META_SKIPPED_ROWS)? {
        if skipped != "0" {
            println!(
                "  {} {} legacy result row(s) referenced unknown features and were skipped",
                style("!").yellow(),
                skipped
            );
        }
    }
    Ok(())
}
