//! `axis tol` command - parse a tolerance expression

use miette::{IntoDiagnostic, Result};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::core::tolerance::{format_optional, parse_tolerance};

#[derive(clap::Args, Debug)]
pub struct TolArgs {
    /// Expression such as "1.25 ±0.05", "10 +0.1/-0.05" or "Ø6.5 +/- .1"
    #[arg(allow_hyphen_values = true, num_args = 1.., required = true)]
    pub expression: Vec<String>,
}

pub fn run(args: TolArgs, global: &GlobalOpts) -> Result<()> {
    let tolerance = parse_tolerance(&args.expression.join(" "))?;

    let config = Config::load(None);
    match global.format.resolve(config.default_format.as_deref(), OutputFormat::Auto) {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&tolerance).into_diagnostic()?);
        }
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(&tolerance).into_diagnostic()?),
        _ => {
            if let Some(marker) = &tolerance.marker {
                println!("marker\t{}", marker);
            }
            println!("nominal\t{}", format_optional(Some(tolerance.nominal)));
            println!("lsl\t{}", format_optional(tolerance.lsl));
            println!("usl\t{}", format_optional(tolerance.usl));
        }
    }
    Ok(())
}
