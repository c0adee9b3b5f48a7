use clap::Parser;
use miette::Result;
use axis::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    // AXIS_LOG wins; otherwise -v/-vv raise the default level
    let default_level = match global.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("AXIS_LOG", default_level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Init(args) => axis::cli::commands::init::run(args, &global),
        Commands::Feat(cmd) => axis::cli::commands::feat::run(cmd, &global),
        Commands::Rslt(cmd) => axis::cli::commands::rslt::run(cmd, &global),
        Commands::Export(args) => axis::cli::commands::export::run(args, &global),
        Commands::Spc(args) => axis::cli::commands::spc::run(args, &global),
        Commands::Tol(args) => axis::cli::commands::tol::run(args, &global),
        Commands::Session(args) => axis::cli::commands::session::run(args, &global),
        Commands::Completions(args) => axis::cli::commands::completions::run(args),
    }
}
