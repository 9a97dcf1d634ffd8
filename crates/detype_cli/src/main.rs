//! detype: strip static type annotations from a source tree.
//!
//! Usage:
//!   detype [options] [SRC_DIR] [OUT_DIR]
//!
//! Converts every `.ts` file under SRC_DIR into untyped `.js` under
//! OUT_DIR, copying markup and manifest assets through unchanged. With no
//! directories given, settings come from a `detype.json` in the current
//! directory.

use clap::Parser as ClapParser;
use detype_core::text::LineMap;
use detype_options::ConvertOptions;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

#[derive(ClapParser, Debug)]
#[command(name = "detype", about = "detype - a type-annotation stripping transformer", disable_version_flag = true)]
struct Cli {
    /// Directory containing the typed sources.
    #[arg(value_name = "SRC_DIR")]
    src_dir: Option<String>,

    /// Directory receiving the untyped output.
    #[arg(value_name = "OUT_DIR")]
    out_dir: Option<String>,

    /// Path to detype.json.
    #[arg(short = 'p', long = "project")]
    project: Option<String>,

    /// Treat any diagnostic as a failure.
    #[arg(long)]
    strict: bool,

    /// List the files that would be processed.
    #[arg(long = "listFiles")]
    list_files: bool,

    /// Re-run the conversion when sources change.
    #[arg(short = 'w', long)]
    watch: bool,

    /// Enable pretty printing for diagnostics.
    #[arg(long, default_value_t = true)]
    pretty: bool,

    /// Print the version.
    #[arg(short = 'v', long)]
    version: bool,
}

// ANSI color codes
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const GRAY: &str = "\x1b[90m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("detype Version 0.1.0");
        return;
    }

    if cli.watch {
        run_watch(&cli);
        return;
    }

    let exit_code = run_convert(&cli);
    process::exit(exit_code);
}

fn run_convert(cli: &Cli) -> i32 {
    let start = Instant::now();

    let options = match resolve_options(cli) {
        Ok(o) => o,
        Err(msg) => {
            print_error(&msg);
            return 1;
        }
    };

    let src_dir = PathBuf::from(options.src_dir());
    let out_dir = PathBuf::from(options.out_dir());

    let items = match detype_project::discover_work(&src_dir, &out_dir, &options) {
        Ok(items) => items,
        Err(e) => {
            print_error(&e.to_string());
            return 1;
        }
    };

    if items.is_empty() {
        print_error("No input files found.");
        return 1;
    }

    if cli.list_files {
        for item in &items {
            println!("{}", item.source().display());
        }
    }

    let summary = detype_converter::convert_project(&items);

    let use_color = cli.pretty && atty_is_terminal();
    for outcome in &summary.outcomes {
        if let Some(ref err) = outcome.error {
            print_error(&err.to_string());
        }
        if outcome.diagnostics.is_empty() {
            continue;
        }
        let line_map = std::fs::read_to_string(&outcome.source)
            .ok()
            .map(|text| LineMap::new(&text));
        for diag in outcome.diagnostics.diagnostics() {
            print_diagnostic(diag, use_color, line_map.as_ref());
        }
    }

    let elapsed = start.elapsed();
    let diag_count = summary.diagnostic_count();

    if use_color {
        eprintln!(
            "{}Converted {} file{}, copied {} asset{} in {:.2}s.{}",
            GRAY,
            summary.converted(),
            if summary.converted() == 1 { "" } else { "s" },
            summary.copied(),
            if summary.copied() == 1 { "" } else { "s" },
            elapsed.as_secs_f64(),
            RESET
        );
    } else {
        eprintln!(
            "Converted {} file{}, copied {} asset{} in {:.2}s.",
            summary.converted(),
            if summary.converted() == 1 { "" } else { "s" },
            summary.copied(),
            if summary.copied() == 1 { "" } else { "s" },
            elapsed.as_secs_f64(),
        );
    }

    if summary.failed() > 0 {
        return 1;
    }
    if options.strict() && diag_count > 0 {
        eprintln!(
            "Found {} diagnostic{} requiring review.",
            diag_count,
            if diag_count == 1 { "" } else { "s" }
        );
        return 2;
    }
    0
}

fn run_watch(cli: &Cli) {
    println!("Starting conversion in watch mode...");
    println!();

    let _ = run_convert(cli);

    println!();
    println!("Watching for file changes...");

    let mut last_modified = watched_mtime(cli);
    loop {
        std::thread::sleep(std::time::Duration::from_millis(500));
        let current = watched_mtime(cli);
        if current > last_modified {
            last_modified = current;
            println!();
            println!("File change detected. Starting conversion...");
            println!();
            let _ = run_convert(cli);
        }
    }
}

fn watched_mtime(cli: &Cli) -> std::time::SystemTime {
    let options = match resolve_options(cli) {
        Ok(o) => o,
        Err(_) => return std::time::SystemTime::UNIX_EPOCH,
    };
    let src_dir = PathBuf::from(options.src_dir());
    let out_dir = PathBuf::from(options.out_dir());
    match detype_project::discover_work(&src_dir, &out_dir, &options) {
        Ok(items) => {
            let paths: Vec<PathBuf> = items.iter().map(|i| i.source().to_path_buf()).collect();
            detype_project::latest_mtime(&paths)
        }
        Err(_) => std::time::SystemTime::UNIX_EPOCH,
    }
}

/// Resolution order: explicit --project file, then positional directories,
/// then a detype.json in the current directory. CLI flags override the
/// project file.
fn resolve_options(cli: &Cli) -> Result<ConvertOptions, String> {
    let mut base = if let Some(ref project) = cli.project {
        detype_options::parse_options_file(project)
            .map_err(|e| format!("Failed to read project '{}': {}", project, e))?
    } else if Path::new("detype.json").exists() && cli.src_dir.is_none() {
        detype_options::parse_options_file("detype.json")
            .map_err(|e| format!("Failed to read detype.json: {}", e))?
    } else {
        ConvertOptions::default()
    };

    let overrides = ConvertOptions {
        src_dir: cli.src_dir.clone(),
        out_dir: cli.out_dir.clone(),
        strict: if cli.strict { Some(true) } else { None },
        ..Default::default()
    };
    base = base.merged_with(&overrides);
    Ok(base)
}

fn print_diagnostic(
    diag: &detype_diagnostics::Diagnostic,
    use_color: bool,
    line_map: Option<&LineMap>,
) {
    let location = diag.span.map(|span| match line_map {
        Some(map) => {
            let lc = map.line_and_column_of(span.start);
            format!("({},{})", lc.line + 1, lc.column + 1)
        }
        None => format!("({})", span.start),
    });
    if use_color {
        let color = if diag.is_error() { RED } else { YELLOW };
        let category = if diag.is_error() { "error" } else { "warning" };
        if let Some(ref file) = diag.file {
            eprint!("{}{}{}", CYAN, file, RESET);
            if let Some(ref loc) = location {
                eprint!("{}", loc);
            }
            eprint!(": ");
        }
        eprintln!(
            "{}{}{}{} {}{}{}: {}",
            BOLD,
            color,
            category,
            RESET,
            CYAN,
            format!("DT{}", diag.code),
            RESET,
            diag.message_text
        );
    } else if let (Some(ref file), Some(ref loc)) = (&diag.file, &location) {
        eprintln!(
            "{}{}: {} DT{}: {}",
            file, loc, diag.category, diag.code, diag.message_text
        );
    } else {
        eprintln!("{}", diag);
    }
}

fn print_error(msg: &str) {
    if atty_is_terminal() {
        eprintln!("{}{}error{}: {}", BOLD, RED, RESET, msg);
    } else {
        eprintln!("error: {}", msg);
    }
}

fn atty_is_terminal() -> bool {
    // Simple check - on Unix, check if stderr is a terminal
    #[cfg(unix)]
    {
        unsafe { libc::isatty(2) != 0 }
    }
    #[cfg(not(unix))]
    {
        true // Assume terminal on other platforms
    }
}
