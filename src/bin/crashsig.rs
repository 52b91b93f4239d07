extern crate anyhow;
extern crate clap;
extern crate crashsig;
#[macro_use]
extern crate log;

use anyhow::{Context, Result};
use clap::{App, Arg};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use simplelog::*;

use std::fs;
use std::path::{Path, PathBuf};

use crashsig::error::Error;
use crashsig::report::{Config, CrashReport, DEFAULT_SIGNATURE_DEPTH};

/// Collect regular files under `path`, recursing into directories.
/// `pattern` is a substring filter on file names.
fn collect_files(path: &Path, pattern: Option<&str>, files: &mut Vec<PathBuf>) -> Result<()> {
    if path.is_dir() {
        let dir = fs::read_dir(path)
            .with_context(|| format!("Couldn't read directory {}", path.display()))?;
        for entry in dir {
            collect_files(&entry?.path(), pattern, files)?;
        }
    } else if path.is_file() {
        if let Some(pattern) = pattern {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !name.contains(pattern) {
                return Ok(());
            }
        }
        files.push(path.to_path_buf());
    }
    Ok(())
}

/// Produce the output block for one document: `<signature>\t<path>`,
/// plus the canonical hashable-backtrace string on a second line if
/// requested. Per-document failures never abort the batch.
fn analyze_file(path: &Path, config: &Config, print_backtrace: bool) -> Option<String> {
    debug!("File: {}", path.display());
    let report = match CrashReport::from_file(path, config) {
        Ok(report) => Some(report),
        Err(Error::UnrecognizedFormat(_)) => {
            info!("Skipping {} -- unknown type", path.display());
            None
        }
        Err(Error::UnsupportedDialect(ref dialect)) => {
            warn!("No engine defined for dialect {dialect} ({})", path.display());
            None
        }
        Err(err) => {
            warn!("Skipping {}: {err}", path.display());
            return None;
        }
    };

    let Some(report) = report else {
        return Some(format!("{:<32}\t{}", "unknown_type", path.display()));
    };

    let mut signature = report
        .signature(DEFAULT_SIGNATURE_DEPTH)
        .unwrap_or_else(|| "no_signature_found".to_string());
    if report.total_stack_corruption() {
        signature = "total_stack_corruption".to_string();
    }

    let mut out = format!("{signature:<32}\t{}", path.display());
    if print_backtrace {
        out.push_str(&format!(
            "\n{:<32}\t{}\n",
            "",
            report.hashable_backtrace_string(DEFAULT_SIGNATURE_DEPTH)
        ));
    }
    Some(out)
}

fn main() -> Result<()> {
    let matches = App::new("crashsig")
        .version("0.1.0")
        .about("Compute crash signatures from debugger output to deduplicate fuzzing results")
        .term_width(90)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .short('l')
                .takes_value(true)
                .default_value("info")
                .possible_values(["info", "debug"])
                .help("Logging level"),
        )
        .arg(
            Arg::new("print-hashable-backtrace")
                .long("print-hashable-backtrace")
                .help("Print the hashable backtrace string on a second line"),
        )
        .arg(
            Arg::new("pattern")
                .long("pattern")
                .takes_value(true)
                .value_name("SUBSTRING")
                .help("Only analyze files whose name contains SUBSTRING"),
        )
        .arg(
            Arg::new("keep-unmapped-frames")
                .long("keep-unmapped-frames")
                .help("Do not drop backtrace frames whose address is outside every mapped module"),
        )
        .arg(
            Arg::new("unique-faulting-address")
                .long("unique-faulting-address")
                .help("Fold the faulting address into the signature"),
        )
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .short('j')
                .takes_value(true)
                .value_name("N")
                .help("Number of parallel jobs")
                .validator(|arg| {
                    if let Ok(x) = arg.parse::<u64>() {
                        if x > 0 {
                            return Ok(());
                        }
                    }
                    Err(String::from("Couldn't parse jobs value"))
                }),
        )
        .arg(
            Arg::new("PATHS")
                .multiple_values(true)
                .takes_value(true)
                .required(true)
                .help("Debugger output files or directories to analyze"),
        )
        .get_matches();

    // Init log.
    let log_level = if matches.value_of("log-level").unwrap() == "debug" {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = TermLogger::init(
        log_level,
        ConfigBuilder::new().set_time_to_local(true).build(),
        TerminalMode::Stderr,
    );

    let config = Config {
        exclude_unmapped_frames: !matches.is_present("keep-unmapped-frames"),
        keep_unique_faulting_address: matches.is_present("unique-faulting-address"),
    };
    let print_backtrace = matches.is_present("print-hashable-backtrace");
    let pattern = matches.value_of("pattern");

    let mut files: Vec<PathBuf> = Vec::new();
    for path in matches.values_of("PATHS").unwrap() {
        collect_files(Path::new(path), pattern, &mut files)?;
    }
    if files.is_empty() {
        info!("Nothing to analyze");
        return Ok(());
    }

    let jobs = if let Some(jobs) = matches.value_of("jobs") {
        jobs.parse::<usize>().unwrap()
    } else {
        std::cmp::max(1, num_cpus::get() / 2)
    };

    // Start thread pool. Documents share no state, so they are
    // processed fully in parallel; output order follows input order.
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.min(files.len()))
        .build_global()
        .unwrap();

    let results: Vec<Option<String>> = files
        .par_iter()
        .map(|file| analyze_file(file, &config, print_backtrace))
        .collect();

    for line in results.into_iter().flatten() {
        println!("{line}");
    }

    Ok(())
}
