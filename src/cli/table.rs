//! Table formatting for CLI list commands
//!
//! Every list command builds [`TableRow`]s of typed [`CellValue`]s and lets
//! [`TableFormatter`] lay them out as aligned TSV, CSV, markdown or bare ids.
//! Output is returned as a string so it can go to stdout or a file.

use chrono::{DateTime, Local, Utc};
use console::style;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{escape_csv, truncate_str};
use crate::cli::OutputFormat;
use crate::core::identity::FeatureId;
use crate::core::status::Status;
use crate::core::tolerance::format_optional;

/// A typed cell value with semantic meaning for formatting
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Feature id (zero-padded, cyan)
    Id(FeatureId),
    /// Plain text, truncated to the column width
    Text(String),
    /// Derived status with color coding
    Status(Status),
    Number(u64),
    /// Nominal or limit; blank when absent
    Value(Option<f64>),
    DateTime(DateTime<Utc>),
}

impl CellValue {
    fn raw(&self) -> String {
        match self {
            CellValue::Id(id) => id.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Status(status) => status.label().to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Value(v) => format_optional(*v),
            CellValue::DateTime(dt) => {
                let local: DateTime<Local> = dt.with_timezone(&Local);
                local.format("%Y-%m-%d %H:%M").to_string()
            }
        }
    }

    fn display_width(&self) -> usize {
        self.raw().chars().count()
    }

    /// Format for TSV output (with colors if terminal)
    fn format_tsv(&self, width: usize) -> String {
        let raw = self.raw();
        match self {
            CellValue::Id(_) => format!("{:<width$}", style(raw).cyan(), width = width),
            CellValue::Text(_) => {
                let truncated = truncate_str(&raw, width);
                format!("{:<width$}", truncated, width = width)
            }
            CellValue::Status(status) => {
                let styled = match status {
                    Status::Pass => style(raw).green(),
                    Status::Fail => style(raw).red().bold(),
                    Status::Invalid => style(raw).yellow(),
                    Status::Unset => style(raw).dim(),
                };
                format!("{:<width$}", styled, width = width)
            }
            CellValue::Number(_) | CellValue::Value(_) => {
                format!("{:>width$}", raw, width = width)
            }
            CellValue::DateTime(_) => format!("{:<width$}", raw, width = width),
        }
    }
}

/// Column header and maximum width
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub header: &'static str,
    pub width: usize,
}

impl ColumnDef {
    pub const fn new(header: &'static str, width: usize) -> Self {
        Self { header, width }
    }
}

/// A row of cells in column order
#[derive(Debug, Clone, Default)]
pub struct TableRow {
    pub cells: Vec<CellValue>,
}

impl TableRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(mut self, value: CellValue) -> Self {
        self.cells.push(value);
        self
    }

    fn id(&self) -> Option<String> {
        self.cells.first().map(CellValue::raw)
    }
}

/// Table formatter that outputs rows in various formats
pub struct TableFormatter<'a> {
    columns: &'a [ColumnDef],
    entity_name: &'static str,
    show_summary: bool,
}

impl<'a> TableFormatter<'a> {
    pub fn new(columns: &'a [ColumnDef], entity_name: &'static str) -> Self {
        Self {
            columns,
            entity_name,
            show_summary: true,
        }
    }

    /// Toggle the trailing "N thing(s) found" line of TSV output
    pub fn with_summary(mut self, show: bool) -> Self {
        self.show_summary = show;
        self
    }

    /// Render rows in the specified format
    pub fn render(&self, rows: &[TableRow], format: OutputFormat) -> String {
        match format {
            OutputFormat::Csv => self.render_csv(rows),
            OutputFormat::Md => self.render_md(rows),
            OutputFormat::Id => rows
                .iter()
                .filter_map(TableRow::id)
                .map(|id| id + "\n")
                .collect(),
            _ => self.render_tsv(rows),
        }
    }

    /// Column widths sized to content, capped at each column's maximum
    fn widths(&self, rows: &[TableRow]) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let content = rows
                    .iter()
                    .filter_map(|r| r.cells.get(i))
                    .map(CellValue::display_width)
                    .max()
                    .unwrap_or(0);
                col.header.len().max(content.min(col.width))
            })
            .collect()
    }

    fn render_tsv(&self, rows: &[TableRow]) -> String {
        let widths = self.widths(rows);
        let mut out = String::new();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| format!("{:<width$}", style(col.header).bold(), width = *w))
            .collect();
        out.push_str(header.join(" ").trim_end());
        out.push('\n');

        let total_width: usize = widths.iter().sum::<usize>() + widths.len().saturating_sub(1);
        out.push_str(&"-".repeat(total_width));
        out.push('\n');

        for row in rows {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, w)| match row.cells.get(i) {
                    Some(value) => value.format_tsv(*w),
                    None => format!("{:<width$}", "", width = *w),
                })
                .collect();
            out.push_str(cells.join(" ").trim_end());
            out.push('\n');
        }

        if self.show_summary {
            out.push('\n');
            out.push_str(&format!(
                "{} {}(s) found.\n",
                style(rows.len()).cyan(),
                self.entity_name
            ));
        }
        out
    }

    fn render_csv(&self, rows: &[TableRow]) -> String {
        let mut out = String::new();
        let header: Vec<&str> = self.columns.iter().map(|c| c.header).collect();
        out.push_str(&header.join(","));
        out.push('\n');
        for row in rows {
            let cells: Vec<String> = row.cells.iter().map(|c| escape_csv(&c.raw())).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    fn render_md(&self, rows: &[TableRow]) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.columns.iter().map(|c| c.header.to_string()));
        for row in rows {
            builder.push_record(row.cells.iter().map(|c| c.raw().replace('|', "\\|")));
        }
        let mut out = builder.build().with(Style::markdown()).to_string();
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[ColumnDef] = &[
        ColumnDef::new("ID", 6),
        ColumnDef::new("METHOD", 8),
        ColumnDef::new("LSL", 10),
    ];

    fn rows() -> Vec<TableRow> {
        vec![
            TableRow::new()
                .cell(CellValue::Id(FeatureId::new(1)))
                .cell(CellValue::Text("caliper, digital".into()))
                .cell(CellValue::Value(Some(1.2))),
            TableRow::new()
                .cell(CellValue::Id(FeatureId::new(12)))
                .cell(CellValue::Text("CMM".into()))
                .cell(CellValue::Value(None)),
        ]
    }

    #[test]
    fn test_csv_escapes_and_blanks() {
        let out = TableFormatter::new(COLUMNS, "feature").render(&rows(), OutputFormat::Csv);
        assert_eq!(out, "ID,METHOD,LSL\n001,\"caliper, digital\",1.2\n012,CMM,\n");
    }

    #[test]
    fn test_ids_only() {
        let out = TableFormatter::new(COLUMNS, "feature").render(&rows(), OutputFormat::Id);
        assert_eq!(out, "001\n012\n");
    }

    #[test]
    fn test_tsv_truncates_to_column_width() {
        console::set_colors_enabled(false);
        let out = TableFormatter::new(COLUMNS, "feature")
            .with_summary(false)
            .render(&rows(), OutputFormat::Tsv);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ID "));
        assert!(lines[2].contains("calip..."));
        assert!(!out.contains("found"));
    }

    #[test]
    fn test_markdown_table() {
        let out = TableFormatter::new(COLUMNS, "feature").render(&rows(), OutputFormat::Md);
        assert!(out.contains("| ID "));
        assert!(out.contains("| 012 "));
    }
}
