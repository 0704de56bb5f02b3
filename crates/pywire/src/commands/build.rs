//! Build command - Compile .pywire pages to Python modules

use clap::{Args, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use pywire_atelier::{compile, CompiledModule, CompilerOptions, StyleCollector};
use pywire_relief::CompileError;

use super::{collect_files, effective_patterns, page_path, relative_output_path};
use crate::config::PywireConfig;

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Output the generated Python module and its line map
    #[default]
    Py,
    /// Output JSON with code and metadata
    Json,
    /// Only show statistics (no output)
    Stats,
}

#[derive(Args, Default)]
pub struct BuildArgs {
    /// Glob pattern(s) to match .pywire files (default: config, else ./**/*.pywire)
    pub patterns: Vec<String>,

    /// Output directory (default: config outDir, else ./dist)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "py")]
    pub format: OutputFormat,

    /// Emit the SPA bootstrap on every page
    #[arg(long)]
    pub pjax: bool,

    /// Write the scoped CSS of all pages to this file
    #[arg(long)]
    pub css_bundle: Option<PathBuf>,

    /// Number of threads (default: number of CPUs)
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,

    /// Show timing profile breakdown
    #[arg(long)]
    pub profile: bool,

    /// Continue on errors
    #[arg(long)]
    pub continue_on_error: bool,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Compile(#[from] CompileError),
}

#[derive(Debug)]
struct CompileStats {
    success: AtomicUsize,
    failed: AtomicUsize,
    total_bytes: AtomicUsize,
    output_bytes: AtomicUsize,
}

impl CompileStats {
    fn new() -> Self {
        Self {
            success: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            total_bytes: AtomicUsize::new(0),
            output_bytes: AtomicUsize::new(0),
        }
    }
}

/// JSON record written per page with `--format json`.
#[derive(Debug, Serialize)]
pub struct CompileOutput {
    pub filename: String,
    #[serde(flatten)]
    pub module: CompiledModule,
}

pub fn run(args: BuildArgs, config: &PywireConfig) {
    let start = Instant::now();

    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            warn!("failed to configure thread pool: {}", e);
        }
    }

    let patterns = effective_patterns(&args.patterns, &config.build.patterns);
    let files = collect_files(&patterns);

    if files.is_empty() {
        eprintln!("No .pywire files found matching the patterns");
        std::process::exit(1);
    }

    let mut options = config.compiler.clone();
    options.pjax |= args.pjax;

    let stats = CompileStats::new();
    let collect_elapsed = start.elapsed();

    if args.profile {
        eprintln!(
            "Found {} files in {:.4}s. Compiling using {} threads...",
            files.len(),
            collect_elapsed.as_secs_f64(),
            rayon::current_num_threads()
        );
    }

    let compile_start = Instant::now();
    let results: Vec<_> = files
        .par_iter()
        .map(|path| match compile_file(path, &options) {
            Ok((output, source_len)) => {
                stats.success.fetch_add(1, Ordering::Relaxed);
                stats.total_bytes.fetch_add(source_len, Ordering::Relaxed);
                stats
                    .output_bytes
                    .fetch_add(output.module.code.len(), Ordering::Relaxed);
                Some((path.clone(), output))
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                eprintln!("Error compiling {}: {}", path.display(), e);

                if !args.continue_on_error {
                    std::process::exit(1);
                }

                None
            }
        })
        .collect();
    let compile_elapsed = compile_start.elapsed();

    let io_start = Instant::now();
    let out_dir = args
        .output
        .clone()
        .or_else(|| config.build.out_dir.clone())
        .unwrap_or_else(|| PathBuf::from("./dist"));
    let outputs: Vec<(PathBuf, CompileOutput)> = results.into_iter().flatten().collect();

    let mut write_failed = 0;
    if args.format != OutputFormat::Stats {
        for (path, output) in &outputs {
            if let Err(e) = write_output(&out_dir, path, output, args.format) {
                eprintln!("{}", e);
                write_failed += 1;
            }
        }
    }
    if let Some(bundle) = &args.css_bundle {
        let css = bundle_css(outputs.iter().map(|(_, o)| &o.module));
        if let Err(e) = write_file(bundle, &css) {
            eprintln!("{}", e);
            write_failed += 1;
        }
    }
    let io_elapsed = io_start.elapsed();

    let total_elapsed = start.elapsed();
    let success = stats.success.load(Ordering::Relaxed);
    let failed = stats.failed.load(Ordering::Relaxed) + write_failed;

    if args.profile {
        eprintln!();
        eprintln!("Timing breakdown:");
        eprintln!("  File collection: {:.4}s", collect_elapsed.as_secs_f64());
        eprintln!("  Compilation:     {:.4}s", compile_elapsed.as_secs_f64());
        eprintln!("  I/O operations:  {:.4}s", io_elapsed.as_secs_f64());
        eprintln!("  Total:           {:.4}s", total_elapsed.as_secs_f64());
        eprintln!(
            "  Input: {} bytes, output: {} bytes",
            stats.total_bytes.load(Ordering::Relaxed),
            stats.output_bytes.load(Ordering::Relaxed)
        );
        eprintln!();
    }

    if failed > 0 {
        eprintln!(
            "✗ {} file(s) failed, {} compiled in {:.4}s",
            failed,
            success,
            total_elapsed.as_secs_f64()
        );
        std::process::exit(1);
    }

    let file_word = if success == 1 { "file" } else { "files" };
    eprintln!(
        "✓ {} {} compiled in {:.4}s",
        success,
        file_word,
        total_elapsed.as_secs_f64()
    );
}

/// Compile one page. Returns the output and the source size in bytes.
pub fn compile_file(
    path: &Path,
    options: &CompilerOptions,
) -> Result<(CompileOutput, usize), BuildError> {
    let source = fs::read_to_string(path).map_err(|source| BuildError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = page_path(path);
    let module = compile(&source, &filename, options)?;
    debug!(file = %filename, handlers = module.handlers.len(), "compiled");
    Ok((CompileOutput { filename, module }, source.len()))
}

/// Write `<stem>.py` and `<stem>.py.map.json`, or `<stem>.json`.
pub fn write_output(
    out_dir: &Path,
    path: &Path,
    output: &CompileOutput,
    format: OutputFormat,
) -> Result<(), BuildError> {
    let target = out_dir.join(relative_output_path(path));
    match format {
        OutputFormat::Py => {
            let py = target.with_extension("py");
            write_file(&py, &output.module.code)?;
            let map = serde_json::to_string(&output.module.line_map).unwrap_or_default();
            write_file(&py.with_extension("py.map.json"), &map)
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(output).unwrap_or_default();
            write_file(&target.with_extension("json"), &json)
        }
        OutputFormat::Stats => Ok(()),
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), BuildError> {
    let write_err = |source| BuildError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, content).map_err(write_err)
}

/// Scoped CSS of every module, each scope once, in build order.
pub fn bundle_css<'a>(modules: impl Iterator<Item = &'a CompiledModule>) -> String {
    let mut collector = StyleCollector::new();
    for module in modules {
        for style in &module.styles {
            collector.add(&style.scope_id, &style.css);
        }
    }
    collector.css()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(dir: &Path, rel: &str, source: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, source).unwrap();
        path
    }

    #[test]
    fn test_compile_and_write_py() {
        let dir = tempfile::tempdir().unwrap();
        let path = page(dir.path(), "pages/index.pywire", "<h1>{title}</h1>\n---\ntitle = 'Home'\n");

        let (output, len) = compile_file(&path, &CompilerOptions::default()).unwrap();
        assert!(len > 0);
        assert_eq!(output.module.page.class_name, "IndexPage");

        let out_dir = dir.path().join("dist");
        write_output(&out_dir, Path::new("pages/index.pywire"), &output, OutputFormat::Py).unwrap();

        let code = fs::read_to_string(out_dir.join("pages/index.py")).unwrap();
        assert!(code.contains("class IndexPage(BasePage):"));
        let map: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out_dir.join("pages/index.py.map.json")).unwrap())
                .unwrap();
        assert!(map["lines"].as_array().is_some_and(|l| !l.is_empty()));
    }

    #[test]
    fn test_write_json_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = page(dir.path(), "about.pywire", "<p>About</p>");
        let (output, _) = compile_file(&path, &CompilerOptions::default()).unwrap();

        write_output(dir.path(), Path::new("about.pywire"), &output, OutputFormat::Json).unwrap();
        let record: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("about.json")).unwrap()).unwrap();
        assert_eq!(record["page"]["class_name"], "AboutPage");
        assert!(record["code"].as_str().is_some_and(|c| c.contains("__page_class__")));
    }

    #[test]
    fn test_compile_error_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = page(dir.path(), "bad.pywire", "!path '/a'\n!path '/b'\n<p>x</p>");
        let err = compile_file(&path, &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, BuildError::Compile(CompileError::CodeGeneration { line: 2, .. })));
    }

    #[test]
    fn test_missing_file() {
        let err = compile_file(Path::new("/nonexistent/x.pywire"), &CompilerOptions::default())
            .unwrap_err();
        assert!(matches!(err, BuildError::Read { .. }));
    }

    #[test]
    fn test_bundle_css_dedupes_scopes() {
        let options = CompilerOptions::default();
        let a = compile("<style scoped>p { color: red; }</style><p>a</p>", "a.pywire", &options).unwrap();
        let b = compile("<style scoped>p { color: blue; }</style><p>b</p>", "b.pywire", &options).unwrap();
        let css = bundle_css([&a, &a, &b].into_iter());
        assert_eq!(css.lines().count(), 2);
        assert!(css.contains("color: red"));
        assert!(css.contains("color: blue"));
    }
}
