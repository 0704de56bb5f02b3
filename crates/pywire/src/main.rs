//! # pywire
//!
//! PyWire - compiler for `.pywire` pages.
//!
//! ## Name Origin
//!
//! **PyWire** wires Python page classes to the HTML they render. This crate
//! is the command-line front end over the parser and code generator.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing::Level;

#[derive(Parser)]
#[command(name = "pywire")]
#[command(about = "Compile .pywire pages to Python modules", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile .pywire pages (default command)
    #[command(visible_alias = "atelier")]
    Build(commands::build::BuildArgs),

    /// Parse and generate without writing, reporting diagnostics
    Check(commands::check::CheckArgs),

    /// Print the parsed document of one page as JSON
    #[command(visible_alias = "armature")]
    Inspect(commands::inspect::InspectArgs),

    /// Print the JSON schema of pywire.config.json
    Schema,
}

fn main() {
    let cli = Cli::parse();
    let config = config::load_config(None);
    init_logging(cli.verbose, config.log_level.as_deref());

    match cli.command {
        Some(Commands::Build(args)) => commands::build::run(args, &config),
        Some(Commands::Check(args)) => commands::check::run(args, &config),
        Some(Commands::Inspect(args)) => commands::inspect::run(args, &config),
        Some(Commands::Schema) => println!("{}", config::PYWIRE_CONFIG_SCHEMA),
        None => {
            // Default to build command with default args
            commands::build::run(commands::build::BuildArgs::default(), &config);
        }
    }
}

/// Log to stderr. `-v` flags win over the config file's `logLevel`.
fn init_logging(verbose: u8, config_level: Option<&str>) {
    let level = match verbose {
        0 => config_level
            .and_then(|l| l.parse::<Level>().ok())
            .unwrap_or(Level::WARN),
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .with_target(false)
        .init();
}
