//! `axis session` command - scripted editing session
//!
//! Reads one command per line and drives a [`Session`], so undo/redo,
//! mode switches and view changes are available from the shell:
//!
//! ```text
//! pick 1 10,10,20,20
//! result 1 1.25 ±0.05
//! mode inspect WO1
//! result 1 1.22
//! rows
//! undo
//! ```

use console::style;
use log::debug;
use miette::{IntoDiagnostic, Result};
use std::cell::Cell;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::rc::Rc;

use crate::cli::commands::rslt::{inspection_row, styled_status, ROW_COLUMNS};
use crate::cli::helpers::{parse_point, parse_rect};
use crate::cli::table::{TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::core::drawing::Drawing;
use crate::core::error::AxisError;
use crate::core::geometry::{Point, Rect};
use crate::core::identity::FeatureId;
use crate::core::render::{BlankRenderer, RenderOutcome, RenderQueue};
use crate::core::report::{RowFilter, StatusFilter};
use crate::core::session::{ChangeKind, Entry, Session, SessionChange, SessionOptions};
use crate::core::tolerance::format_optional;
use crate::entities::Feature;

#[derive(clap::Args, Debug)]
pub struct SessionArgs {
    /// Drawing file
    pub drawing: PathBuf,

    /// Read commands from a file instead of stdin
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,

    /// Page size in document units for the headless renderer, WxH
    #[arg(long, default_value = "612x792", value_parser = parse_page_size)]
    pub page_size: (f64, f64),

    /// Number of pages in the drawing
    #[arg(long, default_value_t = u32::MAX)]
    pub pages: u32,
}

fn parse_page_size(s: &str) -> std::result::Result<(f64, f64), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH but got '{}'", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| format!("'{}' is not a positive size", v))
    };
    Ok((parse(w)?, parse(h)?))
}

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Pick { page: u32, rect: Rect },
    /// Drag in view pixels on the current page
    Drag { start: Point, end: Point },
    Tol { id: FeatureId, expression: String },
    Method { id: FeatureId, method: String },
    Ballooning,
    Inspection(String),
    Result { id: FeatureId, text: String },
    Move { id: FeatureId, offset: Point },
    Radius { id: FeatureId, radius: f64 },
    RadiusAll(f64),
    Delete(FeatureId),
    Undo,
    Redo,
    Focus { id: FeatureId, zoom: Option<f64> },
    Zoom(f64),
    Wheel(f64),
    Page(u32),
    Filter(RowFilter),
    Rows,
    Export(Option<PathBuf>),
    Render,
    Open(PathBuf),
    Close,
    Help,
    Quit,
}

const HELP: &str = "\
pick <page> <x,y,w,h>        add a feature (ballooning mode)
drag <x,y> <x,y>             add a feature from a view-space drag
tol <id> <expression>        set nominal and limits
method <id> <text>           set the measuring method
mode balloon | mode inspect <wo>
result <id> <text>           record a result (or fill a blank spec)
move <id> <dx,dy>            move a balloon
radius <id> <r> | radius-all <r>
delete <id> | undo | redo
focus <id> [zoom] | zoom <z> | wheel <delta> | page <n>
filter <all|pass|fail|unset|invalid> [method]
rows | export [file] | render
open <drawing> | close | quit";

/// Parse one line; blank lines and `#` comments yield `None`
pub fn parse_line(line: &str) -> std::result::Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let mut words = rest.split_whitespace();

    let command = match verb.to_ascii_lowercase().as_str() {
        "pick" => Command::Pick {
            page: number(words.next(), "page")?,
            rect: parse_rect(required(words.next(), "rect")?)?,
        },
        "drag" => Command::Drag {
            start: parse_point(required(words.next(), "start")?)?,
            end: parse_point(required(words.next(), "end")?)?,
        },
        "tol" => {
            let (id, text) = id_and_text(rest)?;
            Command::Tol {
                id,
                expression: text,
            }
        }
        "method" => {
            let (id, text) = id_and_text(rest)?;
            Command::Method { id, method: text }
        }
        "mode" => match words.next().map(str::to_ascii_lowercase).as_deref() {
            Some("balloon") | Some("ballooning") => Command::Ballooning,
            Some("inspect") | Some("inspection") => {
                let wo = words.collect::<Vec<_>>().join(" ");
                if wo.is_empty() {
                    return Err("missing work order".to_string());
                }
                Command::Inspection(wo)
            }
            _ => return Err("expected 'mode balloon' or 'mode inspect <wo>'".to_string()),
        },
        "result" => {
            let (id, text) = id_and_text(rest)?;
            Command::Result { id, text }
        }
        "move" => Command::Move {
            id: feature_id(words.next())?,
            offset: parse_point(required(words.next(), "offset")?)?,
        },
        "radius" => Command::Radius {
            id: feature_id(words.next())?,
            radius: number(words.next(), "radius")?,
        },
        "radius-all" => Command::RadiusAll(number(words.next(), "radius")?),
        "delete" => Command::Delete(feature_id(words.next())?),
        "undo" => Command::Undo,
        "redo" => Command::Redo,
        "focus" => Command::Focus {
            id: feature_id(words.next())?,
            zoom: words.next().map(|z| number(Some(z), "zoom")).transpose()?,
        },
        "zoom" => Command::Zoom(number(words.next(), "zoom")?),
        "wheel" => Command::Wheel(number(words.next(), "delta")?),
        "page" => Command::Page(number(words.next(), "page")?),
        "filter" => {
            let status: StatusFilter = words
                .next()
                .unwrap_or("all")
                .parse()
                .map_err(|e: AxisError| e.to_string())?;
            let method: Vec<&str> = words.collect();
            Command::Filter(RowFilter {
                status,
                method: (!method.is_empty()).then(|| method.join(" ")),
            })
        }
        "rows" => Command::Rows,
        "export" => Command::Export((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "render" => Command::Render,
        "open" => Command::Open(PathBuf::from(required(
            Some(rest).filter(|s| !s.is_empty()),
            "drawing",
        )?)),
        "close" => Command::Close,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{}' (try 'help')", other)),
    };
    Ok(Some(command))
}

fn required<'a>(word: Option<&'a str>, what: &str) -> std::result::Result<&'a str, String> {
    word.ok_or_else(|| format!("missing {}", what))
}

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> std::result::Result<T, String> {
    let word = required(word, what)?;
    word.parse()
        .map_err(|_| format!("{} '{}' is not a number", what, word))
}

fn feature_id(word: Option<&str>) -> std::result::Result<FeatureId, String> {
    let word = required(word, "feature id")?;
    word.parse().map_err(|e: crate::core::identity::IdParseError| e.to_string())
}

fn id_and_text(rest: &str) -> std::result::Result<(FeatureId, String), String> {
    let (id, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let id = feature_id(Some(id).filter(|s| !s.is_empty()))?;
    let text = text.trim();
    if text.is_empty() {
        return Err("missing text".to_string());
    }
    Ok((id, text.to_string()))
}

/// Whether the input loop continues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Session plus the render queue driven by its view changes
pub struct Driver {
    session: Session,
    queue: RenderQueue<BlankRenderer>,
    view_dirty: Rc<Cell<bool>>,
}

impl Driver {
    pub fn new(options: SessionOptions, renderer: BlankRenderer) -> Self {
        let mut session = Session::new(options);
        let view_dirty = Rc::new(Cell::new(false));
        let flag = Rc::clone(&view_dirty);
        session.add_observer(move |change: &SessionChange| {
            debug!(
                "{:?}: {} feature(s), {} row(s)",
                change.kind,
                change.features.len(),
                change.rows.len()
            );
            if matches!(change.kind, ChangeKind::Loaded | ChangeKind::ViewChanged) {
                flag.set(true);
            }
        });
        Self {
            session,
            queue: RenderQueue::new(renderer),
            view_dirty,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn open(&mut self, drawing: Drawing) -> crate::core::error::Result<()> {
        self.session.open(drawing)?;
        self.sync_view();
        Ok(())
    }

    fn sync_view(&mut self) {
        if self.view_dirty.replace(false) {
            self.queue
                .request(self.session.page(), self.session.view().zoom());
        }
    }

    /// Run one command, writing its report to `out`
    pub fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<Flow> {
        let outcome = self.apply(command, out);
        self.sync_view();
        match outcome {
            Ok(flow) => Ok(flow),
            Err(CommandError::Engine(e)) if e.is_recoverable() => {
                writeln!(out, "{} {}", style("error:").red(), e).into_diagnostic()?;
                Ok(Flow::Continue)
            }
            Err(CommandError::Engine(e)) => Err(e.into()),
            Err(CommandError::Io(e)) => Err(e).into_diagnostic(),
        }
    }

    fn apply<W: Write>(&mut self, command: Command, out: &mut W) -> Result<Flow, CommandError> {
        let s = &mut self.session;
        match command {
            Command::Pick { page, rect } => {
                let f = s.pick(page, rect)?;
                writeln!(out, "created {} on page {}", f.id, f.page)?;
            }
            Command::Drag { start, end } => {
                let f = s.pick_drag(start, end)?;
                writeln!(out, "created {} on page {}", f.id, f.page)?;
            }
            Command::Tol { id, expression } => {
                let f = s.enter_tolerance(id, &expression)?;
                writeln!(out, "{}", describe(&f))?;
            }
            Command::Method { id, method } => {
                let f = s.set_method(id, &method)?;
                writeln!(out, "{} method {}", f.id, f.spec.method)?;
            }
            Command::Ballooning => {
                s.enter_ballooning()?;
                writeln!(out, "mode ballooning")?;
            }
            Command::Inspection(wo) => {
                s.enter_inspection(&wo)?;
                if let Some(mode) = s.mode() {
                    writeln!(out, "mode {}", mode)?;
                }
            }
            Command::Result { id, text } => match s.enter_result(id, &text)? {
                Entry::Recorded { result, status } => writeln!(
                    out,
                    "{} = {} {}",
                    result.feature_id,
                    result.value,
                    styled_status(status)
                )?,
                Entry::SpecFilled(f) => writeln!(out, "{}", describe(&f))?,
            },
            Command::Move { id, offset } => {
                let f = s.move_balloon(id, offset)?;
                writeln!(
                    out,
                    "{} balloon offset {},{}",
                    f.id,
                    format_optional(Some(f.balloon_offset.x)),
                    format_optional(Some(f.balloon_offset.y))
                )?;
            }
            Command::Radius { id, radius } => {
                let f = s.resize_balloon(id, radius)?;
                writeln!(out, "{} radius {}", f.id, format_optional(Some(f.balloon_radius)))?;
            }
            Command::RadiusAll(radius) => {
                let changed = s.resize_all_balloons(radius)?;
                writeln!(out, "resized {} balloon(s)", changed)?;
            }
            Command::Delete(id) => {
                let removed = s.delete_feature(id)?;
                writeln!(
                    out,
                    "deleted {} ({} result(s))",
                    removed.feature.id,
                    removed.results.len()
                )?;
            }
            Command::Undo => match s.undo()? {
                Some(op) => writeln!(out, "undid {}", op.label())?,
                None => writeln!(out, "nothing to undo")?,
            },
            Command::Redo => match s.redo()? {
                Some(op) => writeln!(out, "redid {}", op.label())?,
                None => writeln!(out, "nothing to redo")?,
            },
            Command::Focus { id, zoom } => {
                let focus = s.focus(id, zoom)?;
                writeln!(
                    out,
                    "focus {} page {} zoom {} at {},{}",
                    focus.id,
                    focus.page,
                    format_optional(Some(focus.zoom)),
                    format_optional(Some(focus.center.x)),
                    format_optional(Some(focus.center.y))
                )?;
            }
            Command::Zoom(zoom) => {
                s.set_zoom(zoom)?;
                writeln!(out, "zoom {}", format_optional(Some(s.view().zoom())))?;
            }
            Command::Wheel(delta) => {
                s.wheel(delta)?;
                writeln!(out, "zoom {:.3}", s.view().zoom())?;
            }
            Command::Page(page) => {
                s.set_page(page)?;
                writeln!(out, "page {}", s.page())?;
            }
            Command::Filter(filter) => {
                s.set_filter(filter);
                writeln!(out, "{} row(s) shown", s.rows().len())?;
            }
            Command::Rows => {
                let rows: Vec<TableRow> = s.rows().iter().map(inspection_row).collect();
                let table = TableFormatter::new(ROW_COLUMNS, "row")
                    .with_summary(false)
                    .render(&rows, OutputFormat::Tsv);
                write!(out, "{}", table)?;
            }
            Command::Export(path) => {
                let bytes = s.export_rows()?;
                match path {
                    Some(path) => {
                        std::fs::write(&path, &bytes)?;
                        writeln!(out, "exported {} row(s) to {}", s.rows().len(), path.display())?;
                    }
                    None => out.write_all(&bytes)?,
                }
            }
            Command::Render => {
                let pan = s.view().pan();
                match self.queue.flush(s.features(), pan) {
                    RenderOutcome::Idle => writeln!(out, "view is current")?,
                    RenderOutcome::Rendered(request) => {
                        let overlays = self
                            .queue
                            .frame()
                            .map(|frame| frame.overlays.len())
                            .unwrap_or(0);
                        writeln!(
                            out,
                            "rendered page {} at zoom {} with {} balloon(s)",
                            request.page,
                            format_optional(Some(request.zoom)),
                            overlays
                        )?;
                    }
                    RenderOutcome::Failed { request, reason } => writeln!(
                        out,
                        "{} page {}: {}",
                        style("render failed").yellow(),
                        request.page,
                        reason
                    )?,
                }
            }
            Command::Open(path) => {
                let drawing = Drawing::new(&path)
                    .map_err(|e| AxisError::Validation(e.to_string()))?;
                s.open(drawing)?;
                writeln!(out, "opened {}", path.display())?;
            }
            Command::Close => {
                s.close()?;
                writeln!(out, "closed")?;
            }
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Stop),
        }
        Ok(Flow::Continue)
    }
}

fn describe(f: &Feature) -> String {
    format!(
        "{} {}{} [{} .. {}]",
        f.id,
        f.spec.marker.as_deref().unwrap_or(""),
        format_optional(f.spec.nominal),
        format_optional(f.spec.lsl),
        format_optional(f.spec.usl)
    )
}

enum CommandError {
    Engine(AxisError),
    Io(io::Error),
}

impl From<AxisError> for CommandError {
    fn from(e: AxisError) -> Self {
        CommandError::Engine(e)
    }
}

impl From<io::Error> for CommandError {
    fn from(e: io::Error) -> Self {
        CommandError::Io(e)
    }
}

pub fn run(args: SessionArgs, global: &GlobalOpts) -> Result<()> {
    let drawing = Drawing::new(&args.drawing).into_diagnostic()?;
    let config = Config::load(Some(drawing.dir()));
    let renderer = BlankRenderer::new(args.page_size, args.pages);

    let mut driver = Driver::new(SessionOptions::from_config(&config), renderer);
    driver.open(drawing)?;

    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path).into_diagnostic()?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let interactive = args.input.is_none() && console::user_attended() && !global.quiet;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if interactive {
        writeln!(out, "{}", style("type 'help' for commands").dim()).into_diagnostic()?;
    }

    let mut lines = input.lines();
    loop {
        if interactive {
            write!(out, "axis> ").into_diagnostic()?;
            out.flush().into_diagnostic()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.into_diagnostic()?;

        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(command)) => {
                if driver.execute(command, &mut out)? == Flow::Stop {
                    break;
                }
            }
            Err(message) => {
                writeln!(out, "{} {}", style("error:").red(), message).into_diagnostic()?;
            }
        }
    }

    driver.session.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::StoreOptions;
    use tempfile::tempdir;

    fn driver(dir: &std::path::Path) -> Driver {
        let options = SessionOptions {
            store: StoreOptions {
                author: "qa".into(),
                ..StoreOptions::default()
            },
            undo_depth: 10,
        };
        let mut driver = Driver::new(options, BlankRenderer::new((612.0, 792.0), 3));
        driver.open(Drawing::new(dir.join("part.pdf")).unwrap()).unwrap();
        driver
    }

    fn script(driver: &mut Driver, lines: &str) -> String {
        console::set_colors_enabled(false);
        let mut out = Vec::new();
        for line in lines.lines() {
            if let Some(command) = parse_line(line).unwrap() {
                driver.execute(command, &mut out).unwrap();
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  # note").unwrap(), None);
        assert_eq!(
            parse_line("pick 2 10,10,20,20").unwrap(),
            Some(Command::Pick {
                page: 2,
                rect: Rect::new(10.0, 10.0, 20.0, 20.0)
            })
        );
        assert_eq!(
            parse_line("tol 7 10 +0.1/-0.05").unwrap(),
            Some(Command::Tol {
                id: FeatureId::new(7),
                expression: "10 +0.1/-0.05".into()
            })
        );
        assert_eq!(
            parse_line("mode inspect WO 12").unwrap(),
            Some(Command::Inspection("WO 12".into()))
        );
        assert_eq!(
            parse_line("focus 3").unwrap(),
            Some(Command::Focus {
                id: FeatureId::new(3),
                zoom: None
            })
        );
        assert!(parse_line("result 3").is_err());
        assert!(parse_line("pick one 1,1,1,1").is_err());
        assert!(parse_line("frobnicate").is_err());
    }

    #[test]
    fn test_scripted_inspection() {
        let tmp = tempdir().unwrap();
        let mut driver = driver(tmp.path());
        let out = script(
            &mut driver,
            "pick 1 10,10,20,20\n\
             result 1 1.25 ±0.05\n\
             mode inspect WO1\n\
             result 1 1.35\n\
             rows\n\
             delete 1\n\
             undo\n",
        );
        assert!(out.contains("created 001 on page 1"));
        assert!(out.contains("001 1.25 [1.2 .. 1.3]"));
        assert!(out.contains("001 = 1.35 FAIL"));
        assert!(out.contains("deleted 001 (1 result(s))"));
        assert!(out.contains("undid delete feature 001"));
        assert_eq!(driver.session().results().len(), 1);
    }

    #[test]
    fn test_recoverable_errors_do_not_stop_the_script() {
        let tmp = tempdir().unwrap();
        let mut driver = driver(tmp.path());
        let out = script(&mut driver, "tol 9 1 ±0.1\nundo\npick 1 0,0,1,1\n");
        assert!(out.contains("error: feature 009 not found"));
        assert!(out.contains("nothing to undo"));
        assert!(driver.session().features().is_empty());
    }

    #[test]
    fn test_view_changes_are_coalesced_into_one_render() {
        let tmp = tempdir().unwrap();
        let mut driver = driver(tmp.path());
        let out = script(
            &mut driver,
            "pick 2 10,10,20,20\nzoom 2\nzoom 3\nfocus 1 4\nrender\nrender\n",
        );
        assert!(out.contains("focus 001 page 2 zoom 4 at 20,20"));
        assert!(out.contains("rendered page 2 at zoom 4 with 1 balloon(s)"));
        assert!(out.contains("view is current"));
        assert!(driver.queue.superseded() >= 3);
    }

    #[test]
    fn test_render_failure_is_reported() {
        let tmp = tempdir().unwrap();
        let mut driver = driver(tmp.path());
        let out = script(&mut driver, "page 5\nrender\n");
        assert!(out.contains("render failed page 5"));
    }
}
