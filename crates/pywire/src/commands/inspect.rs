//! Inspect command - Dump the parsed document or generated module of a page

use clap::Args;
use std::fs;
use std::path::PathBuf;

use pywire_atelier::generate;
use pywire_relief::CompileResult;

use super::page_path;
use crate::config::PywireConfig;

#[derive(Args)]
pub struct InspectArgs {
    /// The .pywire file to inspect
    pub file: PathBuf,

    /// Print the generated Python module instead of the parsed document
    #[arg(long)]
    pub generated: bool,

    /// Single-line JSON
    #[arg(long)]
    pub compact: bool,
}

pub fn run(args: InspectArgs, config: &PywireConfig) {
    let source = match fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read {}: {}", args.file.display(), e);
            std::process::exit(1);
        }
    };

    match inspect(&source, &page_path(&args.file), &args, config) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn inspect(
    source: &str,
    file: &str,
    args: &InspectArgs,
    config: &PywireConfig,
) -> CompileResult<String> {
    let mut doc = pywire_armature::parse_with_options(source, file, &config.compiler.parser)?;
    if args.generated {
        return Ok(generate(&mut doc, &config.compiler)?.code);
    }
    let json = if args.compact {
        serde_json::to_string(&doc)
    } else {
        serde_json::to_string_pretty(&doc)
    };
    Ok(json.unwrap_or_default())
}
