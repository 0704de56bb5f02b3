//! Check command - Parse and generate .pywire pages without writing output

use clap::{Args, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::Instant;

use pywire_atelier::{compile, CompilerOptions};
use pywire_relief::CompileError;

use super::{collect_files, effective_patterns, page_path};
use crate::config::PywireConfig;

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum CheckFormat {
    /// `file:line:column: message` lines
    #[default]
    Text,
    /// One JSON document with every diagnostic
    Json,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Glob pattern(s) to match .pywire files
    pub patterns: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: CheckFormat,

    /// Quiet mode - only show summary
    #[arg(short, long)]
    pub quiet: bool,
}

/// JSON output structure
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput {
    files: Vec<FileResult>,
    error_count: usize,
    file_count: usize,
}

#[derive(Debug, Serialize)]
pub struct FileResult {
    pub file: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
pub struct Diagnostic {
    /// Display form, `file:line[:column]: message`
    pub rendered: String,
    #[serde(flatten)]
    pub error: CompileError,
}

impl From<CompileError> for Diagnostic {
    fn from(error: CompileError) -> Self {
        Self {
            rendered: error.to_string(),
            error,
        }
    }
}

pub fn run(args: CheckArgs, config: &PywireConfig) {
    let start = Instant::now();
    let patterns = effective_patterns(&args.patterns, &config.build.patterns);
    let files = collect_files(&patterns);

    if files.is_empty() {
        eprintln!("No .pywire files found matching patterns: {:?}", patterns);
        return;
    }

    let results: Vec<FileResult> = files
        .par_iter()
        .map(|path| check_file(path, &config.compiler))
        .collect();
    let error_count: usize = results.iter().map(|r| r.diagnostics.len()).sum();

    match args.format {
        CheckFormat::Json => {
            let output = JsonOutput {
                file_count: results.len(),
                error_count,
                files: results,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&output).unwrap_or_default()
            );
        }
        CheckFormat::Text => {
            if !args.quiet {
                for diagnostic in results.iter().flat_map(|r| &r.diagnostics) {
                    println!("{}", diagnostic.rendered);
                }
            }
            eprintln!(
                "{}",
                summary(error_count, files.len(), start.elapsed().as_secs_f64())
            );
        }
    }

    if error_count > 0 {
        std::process::exit(1);
    }
}

/// Closing line of a text-format run. Plain text, so redirected output
/// stays readable.
fn summary(error_count: usize, file_count: usize, seconds: f64) -> String {
    if error_count > 0 {
        format!(
            "✗ {} error(s) in {} file(s) ({:.4}s)",
            error_count, file_count, seconds
        )
    } else {
        format!("✓ {} file(s) checked ({:.4}s)", file_count, seconds)
    }
}

/// Parse and generate one page, collecting its diagnostic.
pub fn check_file(path: &Path, options: &CompilerOptions) -> FileResult {
    let file = page_path(path);
    let diagnostics = match fs::read_to_string(path) {
        Ok(source) => match compile(&source, &file, options) {
            Ok(_) => Vec::new(),
            Err(err) => vec![Diagnostic::from(err)],
        },
        Err(e) => vec![Diagnostic::from(CompileError::syntax(
            &file,
            0,
            0,
            format!("failed to read file: {}", e),
        ))],
    };
    FileResult { file, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.pywire");
        fs::write(&path, "<p>{1 + 1}</p>").unwrap();
        let result = check_file(&path, &CompilerOptions::default());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_summary_is_plain_text() {
        assert_eq!(summary(2, 3, 0.5), "✗ 2 error(s) in 3 file(s) (0.5000s)");
        assert_eq!(summary(0, 1, 0.25), "✓ 1 file(s) checked (0.2500s)");
        assert!(!summary(1, 1, 0.0).contains('\x1b'));
    }

    #[test]
    fn test_diagnostic_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pywire");
        fs::write(&path, "<div>\n  <p $if=\"ready\">x</p>\n</div>").unwrap();
        let result = check_file(&path, &CompilerOptions::default());
        assert_eq!(result.diagnostics.len(), 1);

        let diagnostic = &result.diagnostics[0];
        assert_eq!(diagnostic.error.line(), 2);
        assert!(diagnostic.rendered.starts_with(&format!("{}:2:", result.file)));

        let json = serde_json::to_value(diagnostic).unwrap();
        assert_eq!(json["kind"], "syntax");
        assert_eq!(json["line"], 2);
    }
}
