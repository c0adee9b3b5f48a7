//! `axis rslt` command - inspection result entry and queries

use clap::{Subcommand, ValueEnum};
use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::helpers::{confirm, open_workspace};
use crate::cli::table::{CellValue, ColumnDef, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::FeatureId;
use crate::core::report::{self, InspectionRow, RowFilter};
use crate::core::status::Status;

#[derive(Subcommand, Debug)]
pub enum RsltCommands {
    /// Record a result for one feature in a work order
    Set(SetArgs),

    /// Inspection table of a work order
    List(ListArgs),

    /// Work orders with results
    Orders(OrdersArgs),

    /// Superseded values of one result
    History(HistoryArgs),

    /// Delete every result of a work order
    Reset(ResetArgs),
}

/// Status filter
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum StatusFilter {
    #[default]
    All,
    Pass,
    Fail,
    /// No value, or no limits to judge against
    Unset,
    /// Text that is neither a keyword nor a number
    Invalid,
}

impl From<StatusFilter> for report::StatusFilter {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::All => report::StatusFilter::All,
            StatusFilter::Pass => report::StatusFilter::Only(Status::Pass),
            StatusFilter::Fail => report::StatusFilter::Only(Status::Fail),
            StatusFilter::Unset => report::StatusFilter::Only(Status::Unset),
            StatusFilter::Invalid => report::StatusFilter::Only(Status::Invalid),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Work order or serial number
    #[arg(long, short = 'w')]
    pub wo: String,

    /// Feature id
    pub id: FeatureId,

    /// Measured value, or p/pass, f/fail
    #[arg(allow_hyphen_values = true)]
    pub value: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Work order or serial number
    #[arg(long, short = 'w')]
    pub wo: String,

    /// Only rows with this status
    #[arg(long, short = 's', default_value = "all")]
    pub status: StatusFilter,

    /// Case-insensitive method substring
    #[arg(long, short = 'm')]
    pub method: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct OrdersArgs {
    /// Drawing file
    pub drawing: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct HistoryArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Work order or serial number
    #[arg(long, short = 'w')]
    pub wo: String,

    /// Feature id
    pub id: FeatureId,
}

#[derive(clap::Args, Debug)]
pub struct ResetArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Work order whose results are deleted
    #[arg(long, short = 'w')]
    pub wo: String,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub(crate) const ROW_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("ID", 6),
    ColumnDef::new("Page", 4),
    ColumnDef::new("Method", 16),
    ColumnDef::new("Result", 12),
    ColumnDef::new("Nominal", 10),
    ColumnDef::new("LSL", 10),
    ColumnDef::new("USL", 10),
    ColumnDef::new("Status", 7),
];

pub fn run(cmd: RsltCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        RsltCommands::Set(args) => run_set(args, global),
        RsltCommands::List(args) => run_list(args, global),
        RsltCommands::Orders(args) => run_orders(args, global),
        RsltCommands::History(args) => run_history(args, global),
        RsltCommands::Reset(args) => run_reset(args, global),
    }
}

fn run_set(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    let mut ws = open_workspace(&args.drawing)?;
    let result = ws.store.upsert_result(args.id, &args.wo, &args.value)?;
    let feature = ws.store.get_feature(args.id)?;
    let status = result.status(&feature);

    match ws.format(global.format, OutputFormat::Auto) {
        OutputFormat::Json => {
            let json = serde_json::json!({ "result": result, "status": status });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ if global.quiet => {}
        _ => println!(
            "{} {} {} = {} {}",
            style("✓").green(),
            style(&result.work_order).dim(),
            style(result.feature_id).cyan(),
            result.value,
            styled_status(status)
        ),
    }
    Ok(())
}

pub(crate) fn styled_status(status: Status) -> console::StyledObject<&'static str> {
    let label = status.label();
    match status {
        Status::Pass => style(label).green(),
        Status::Fail => style(label).red().bold(),
        Status::Invalid => style(label).yellow(),
        Status::Unset => style(label).dim(),
    }
}

pub(crate) fn inspection_row(row: &InspectionRow) -> TableRow {
    TableRow::new()
        .cell(CellValue::Id(row.id))
        .cell(CellValue::Number(u64::from(row.page)))
        .cell(CellValue::Text(row.method.clone()))
        .cell(CellValue::Text(row.result.clone()))
        .cell(CellValue::Value(row.nominal))
        .cell(CellValue::Value(row.lsl))
        .cell(CellValue::Value(row.usl))
        .cell(CellValue::Status(row.status))
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ws = open_workspace(&args.drawing)?;
    let features = ws.store.list_features(None)?;
    let results = ws.store.get_results(&args.wo)?;
    let filter = RowFilter {
        status: args.status.into(),
        method: args.method,
    };
    let rows = report::build_rows(&features, &results, &filter);

    match ws.format(global.format, OutputFormat::Tsv) {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows).into_diagnostic()?);
        }
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(&rows).into_diagnostic()?),
        format => {
            let table: Vec<TableRow> = rows.iter().map(inspection_row).collect();
            let out = TableFormatter::new(ROW_COLUMNS, "row")
                .with_summary(!global.quiet)
                .render(&table, format);
            print!("{}", out);
        }
    }
    Ok(())
}

fn run_orders(args: OrdersArgs, global: &GlobalOpts) -> Result<()> {
    const COLUMNS: &[ColumnDef] = &[
        ColumnDef::new("WORK ORDER", 24),
        ColumnDef::new("RESULTS", 7),
        ColumnDef::new("LAST RECORDED", 16),
    ];

    let ws = open_workspace(&args.drawing)?;
    let orders = ws.store.list_work_orders()?;

    match ws.format(global.format, OutputFormat::Tsv) {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&orders).into_diagnostic()?);
        }
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(&orders).into_diagnostic()?),
        OutputFormat::Id => {
            for order in &orders {
                println!("{}", order.work_order);
            }
        }
        format => {
            let rows: Vec<TableRow> = orders
                .iter()
                .map(|o| {
                    let row = TableRow::new()
                        .cell(CellValue::Text(o.work_order.clone()))
                        .cell(CellValue::Number(o.results as u64));
                    match o.last_recorded {
                        Some(at) => row.cell(CellValue::DateTime(at)),
                        None => row.cell(CellValue::Text(String::new())),
                    }
                })
                .collect();
            let out = TableFormatter::new(COLUMNS, "work order")
                .with_summary(!global.quiet)
                .render(&rows, format);
            print!("{}", out);
        }
    }
    Ok(())
}

fn run_history(args: HistoryArgs, global: &GlobalOpts) -> Result<()> {
    let ws = open_workspace(&args.drawing)?;
    let feature = ws.store.get_feature(args.id)?;
    let revisions = ws.store.result_history(args.id, &args.wo)?;
    let current = ws.store.get_results(&args.wo)?.remove(&args.id);

    if ws.format(global.format, OutputFormat::Auto) == OutputFormat::Json {
        let json = serde_json::json!({ "current": current, "superseded": revisions });
        println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        return Ok(());
    }

    match &current {
        Some(r) => println!(
            "{} {} = {} {}",
            style("current").bold(),
            style(feature.id).cyan(),
            r.value,
            styled_status(r.status(&feature))
        ),
        None => println!("{} no live result", style(feature.id).cyan()),
    }
    for rev in revisions.iter().rev() {
        println!(
            "  {}  {}  (superseded {})",
            rev.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            rev.value,
            rev.superseded_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn run_reset(args: ResetArgs, global: &GlobalOpts) -> Result<()> {
    let mut ws = open_workspace(&args.drawing)?;
    let prompt = format!("Delete every result of work order '{}'?", args.wo.trim());
    if !confirm(&prompt, args.yes)? {
        println!("Cancelled.");
        return Ok(());
    }

    let removed = ws.store.reset_results(&args.wo)?;
    if !global.quiet {
        println!(
            "{} Removed {} result(s) from {}",
            style("✓").green(),
            removed,
            style(args.wo.trim()).cyan()
        );
    }
    Ok(())
}
