//! `axis feat` command - feature (balloon) management

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::helpers::{confirm, open_workspace, parse_point, parse_rect};
use crate::cli::table::{CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::geometry::{Point, Rect};
use crate::core::identity::FeatureId;
use crate::core::tolerance::{format_optional, parse_tolerance};
use crate::entities::{Feature, FeaturePatch, FeatureSpec, NewFeature};

#[derive(Subcommand, Debug)]
pub enum FeatCommands {
    /// List features
    List(ListArgs),

    /// Add a feature from a document-space rectangle
    Add(AddArgs),

    /// Show a feature's details
    Show(ShowArgs),

    /// Change a feature's tolerance, method or geometry
    Set(SetArgs),

    /// Delete a feature and all of its results
    Delete(DeleteArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Only features on this page
    #[arg(long, short = 'p')]
    pub page: Option<u32>,

    /// Case-insensitive method substring
    #[arg(long, short = 'm')]
    pub method: Option<String>,

    /// Print only the number of matching features
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// 1-based page index
    #[arg(long, short = 'p', default_value_t = 1)]
    pub page: u32,

    /// Picked rectangle as x,y,w,h in document units
    #[arg(long, short = 'r', value_parser = parse_rect, allow_hyphen_values = true)]
    pub rect: Rect,

    /// Tolerance expression, e.g. "1.25 ±0.05"
    #[arg(long, short = 't', allow_hyphen_values = true)]
    pub tol: Option<String>,

    /// Measuring method
    #[arg(long, short = 'm')]
    pub method: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Feature id, e.g. 7 or 007
    pub id: FeatureId,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Feature id
    pub id: FeatureId,

    /// Tolerance expression replacing nominal and limits
    #[arg(long, short = 't', allow_hyphen_values = true)]
    pub tol: Option<String>,

    /// Measuring method
    #[arg(long, short = 'm')]
    pub method: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub nominal: Option<f64>,

    /// Lower specification limit
    #[arg(long, allow_negative_numbers = true)]
    pub lsl: Option<f64>,

    /// Upper specification limit
    #[arg(long, allow_negative_numbers = true)]
    pub usl: Option<f64>,

    /// Remove nominal and both limits
    #[arg(long, conflicts_with_all = ["tol", "nominal", "lsl", "usl"])]
    pub clear_spec: bool,

    /// Balloon radius in document units
    #[arg(long)]
    pub radius: Option<f64>,

    /// Balloon offset from the rect center as dx,dy
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    pub offset: Option<Point>,

    /// Replacement rectangle as x,y,w,h
    #[arg(long, value_parser = parse_rect, allow_hyphen_values = true)]
    pub rect: Option<Rect>,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Feature id
    pub id: FeatureId,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

const COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("ID", 6),
    ColumnDef::new("PAGE", 4),
    ColumnDef::new("METHOD", 16),
    ColumnDef::new("NOMINAL", 10),
    ColumnDef::new("LSL", 10),
    ColumnDef::new("USL", 10),
    ColumnDef::new("RECT", 28),
];

pub fn run(cmd: FeatCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        FeatCommands::List(args) => run_list(args, global),
        FeatCommands::Add(args) => run_add(args, global),
        FeatCommands::Show(args) => run_show(args, global),
        FeatCommands::Set(args) => run_set(args, global),
        FeatCommands::Delete(args) => run_delete(args, global),
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ws = open_workspace(&args.drawing)?;
    let needle = args.method.as_deref().map(str::to_lowercase);

    let features: Vec<Feature> = ws
        .store
        .list_features(args.page)?
        .into_iter()
        .filter(|f| match &needle {
            Some(n) => f.spec.method.to_lowercase().contains(n),
            None => true,
        })
        .collect();

    if args.count {
        println!("{}", features.len());
        return Ok(());
    }

    match ws.format(global.format, OutputFormat::Tsv) {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&features).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(&features).into_diagnostic()?;
            print!("{}", yaml);
        }
        format => {
            let rows: Vec<TableRow> = features.iter().map(feature_row).collect();
            let out = TableFormatter::new(COLUMNS, "feature")
                .with_summary(!global.quiet)
                .render(&rows, format);
            print!("{}", out);
        }
    }
    Ok(())
}

fn feature_row(f: &Feature) -> TableRow {
    let r = &f.rect;
    TableRow::new()
        .cell(CellValue::Id(f.id))
        .cell(CellValue::Number(u64::from(f.page)))
        .cell(CellValue::Text(f.spec.method.clone()))
        .cell(CellValue::Value(f.spec.nominal))
        .cell(CellValue::Value(f.spec.lsl))
        .cell(CellValue::Value(f.spec.usl))
        .cell(CellValue::Text(format!(
            "{},{},{},{}",
            format_optional(Some(r.x)),
            format_optional(Some(r.y)),
            format_optional(Some(r.w)),
            format_optional(Some(r.h))
        )))
}

fn run_add(args: AddArgs, global: &GlobalOpts) -> Result<()> {
    // Parse before touching the store so a bad expression creates nothing
    let mut spec = match &args.tol {
        Some(expr) => FeatureSpec::from_tolerance(&parse_tolerance(expr)?),
        None => FeatureSpec::default(),
    };
    if let Some(method) = args.method {
        spec.method = method.trim().to_string();
    }

    let mut ws = open_workspace(&args.drawing)?;
    let feature = ws
        .store
        .create_feature(NewFeature::new(args.page, args.rect).with_spec(spec))?;

    match ws.format(global.format, OutputFormat::Auto) {
        OutputFormat::Id => println!("{}", feature.id),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&feature).into_diagnostic()?;
            println!("{}", json);
        }
        _ if global.quiet => {}
        _ => println!(
            "{} Created feature {} on page {}",
            style("✓").green(),
            style(feature.id).cyan(),
            feature.page
        ),
    }
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ws = open_workspace(&args.drawing)?;
    let feature = ws.store.get_feature(args.id)?;
    let results = ws.store.results_for_feature(args.id)?;

    match ws.format(global.format, OutputFormat::Yaml) {
        OutputFormat::Json => {
            let json = serde_json::json!({ "feature": feature, "results": results });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Id => println!("{}", feature.id),
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&feature).into_diagnostic()?);
            if !results.is_empty() {
                println!("results:");
                for r in &results {
                    println!(
                        "  - work_order: {}\n    value: {}\n    status: {}",
                        r.work_order,
                        r.value,
                        r.status(&feature)
                    );
                }
            }
        }
        _ => {
            println!("{}  {}", style("ID").bold(), style(feature.id).cyan());
            println!("{}  {}", style("Page").bold(), feature.page);
            println!("{}  {}", style("Method").bold(), feature.spec.method);
            println!(
                "{}  {} [{} .. {}]",
                style("Spec").bold(),
                format_optional(feature.spec.nominal),
                format_optional(feature.spec.lsl),
                format_optional(feature.spec.usl)
            );
            for r in &results {
                println!("  {}\t{}\t{}", r.work_order, r.value, r.status(&feature));
            }
        }
    }
    Ok(())
}

/// Translate `set` flags into a patch; explicit limits override `--tol`
fn build_patch(args: &SetArgs) -> Result<FeaturePatch> {
    let mut patch = match &args.tol {
        Some(expr) => FeaturePatch::tolerance(&parse_tolerance(expr)?),
        None => FeaturePatch::default(),
    };
    if args.clear_spec {
        patch.marker = Some(None);
        patch.nominal = Some(None);
        patch.lsl = Some(None);
        patch.usl = Some(None);
    }
    if let Some(v) = args.nominal {
        patch.nominal = Some(Some(v));
    }
    if let Some(v) = args.lsl {
        patch.lsl = Some(Some(v));
    }
    if let Some(v) = args.usl {
        patch.usl = Some(Some(v));
    }
    if let Some(method) = &args.method {
        patch.method = Some(method.trim().to_string());
    }
    patch.balloon_radius = args.radius;
    patch.balloon_offset = args.offset;
    patch.rect = args.rect;
    Ok(patch)
}

fn run_set(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    let patch = build_patch(&args)?;
    if patch.is_empty() {
        return Err(miette::miette!(
            help = "pass --tol, --method, --nominal, --lsl, --usl, --radius, --offset or --rect",
            "nothing to change"
        ));
    }

    let mut ws = open_workspace(&args.drawing)?;
    let feature = ws.store.update_feature(args.id, &patch)?;

    if !global.quiet {
        println!(
            "{} Updated feature {}: {} [{} .. {}]",
            style("✓").green(),
            style(feature.id).cyan(),
            format_optional(feature.spec.nominal),
            format_optional(feature.spec.lsl),
            format_optional(feature.spec.usl)
        );
    }
    Ok(())
}

fn run_delete(args: DeleteArgs, global: &GlobalOpts) -> Result<()> {
    let mut ws = open_workspace(&args.drawing)?;
    let feature = ws.store.get_feature(args.id)?;
    let results = ws.store.results_for_feature(args.id)?;

    let prompt = format!(
        "Delete feature {} and its {} result(s)?",
        feature.id,
        results.len()
    );
    if !confirm(&prompt, args.yes)? {
        println!("Cancelled.");
        return Ok(());
    }

    let removed = ws.store.delete_feature(args.id)?;
    if !global.quiet {
        println!(
            "{} Deleted feature {} ({} result(s))",
            style("✓").green(),
            style(removed.feature.id).cyan(),
            removed.results.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        set: SetArgs,
    }

    fn set_args(argv: &[&str]) -> SetArgs {
        let mut full = vec!["axis", "part.pdf", "3"];
        full.extend_from_slice(argv);
        Harness::parse_from(full).set
    }

    #[test]
    fn test_explicit_limits_override_tolerance() {
        let patch = build_patch(&set_args(&["--tol", "10 ±0.1", "--usl", "10.5"])).unwrap();
        assert_eq!(patch.nominal, Some(Some(10.0)));
        assert_eq!(patch.lsl, Some(Some(9.9)));
        assert_eq!(patch.usl, Some(Some(10.5)));
    }

    #[test]
    fn test_negative_offset_and_clear() {
        let patch = build_patch(&set_args(&["--offset", "-6,-6", "--clear-spec"])).unwrap();
        assert_eq!(patch.balloon_offset, Some(Point::new(-6.0, -6.0)));
        assert_eq!(patch.lsl, Some(None));
        assert_eq!(patch.nominal, Some(None));
    }

    #[test]
    fn test_bad_tolerance_is_a_parse_error() {
        assert!(build_patch(&set_args(&["--tol", "ten"])).is_err());
        assert!(build_patch(&set_args(&[])).unwrap().is_empty());
    }
}
