//! pentlyas command line: compile Pently MML into assembly for the Pently NES audio engine.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, warn};

use pentlyas::config::AssemblerConfig;
use pentlyas::mml::error::MAX_UNKNOWN_KEYWORD_WARNINGS;
use pentlyas::mml::periods::MAX_PERIODS;
use pentlyas::mml::{render_asm, render_inc, CompiledMusic, Compiler, Region};

#[derive(Parser)]
#[command(name = "pentlyas")]
#[command(about = "Compile Pently music macro language to ca65 assembly", version)]
struct Args {
    /// Pently-MML file to process, or - for standard input; omit for a period table only
    infile: Option<String>,

    /// Write output to a file instead of standard output
    #[arg(short)]
    o: Option<PathBuf>,

    /// Include a period table of this many semitones (usually 64 to 80)
    #[arg(long, value_name = "NUMSEMITONES")]
    periods: Option<u32>,

    /// Make the period table for this region
    #[arg(long, value_enum)]
    period_region: Option<Region>,

    /// Frequency of A4 in Hz for the period table
    #[arg(long, value_name = "HZ")]
    tuning: Option<f64>,

    /// Place output in this segment
    #[arg(long)]
    segment: Option<String>,

    /// Also write song, sound effect and metadata constants to this file
    #[arg(long, value_name = "FILE")]
    write_inc: Option<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    strict: bool,

    /// Print the parsed entities as JSON to standard error
    #[arg(long)]
    dump_json: bool,

    /// Read settings from this YAML file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log compiler passes to standard error
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = if verbose > 0 { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

/// Apply command-line overrides on top of the loaded config.
fn merge_args(args: &Args, mut config: AssemblerConfig) -> AssemblerConfig {
    if let Some(segment) = &args.segment {
        config.segment = segment.clone();
    }
    if let Some(periods) = args.periods {
        config.periods = periods;
    }
    if let Some(region) = args.period_region {
        config.period_region = region;
    }
    if let Some(tuning) = args.tuning {
        config.tuning = tuning;
    }
    config.strict |= args.strict;
    config
}

fn compile_input(infile: &str, config: &AssemblerConfig) -> Result<(CompiledMusic, String)> {
    let options = config.compile_options();
    if infile == "-" {
        let mut source = String::new();
        io::stdin()
            .read_to_string(&mut source)
            .context("cannot read standard input")?;
        let music = Compiler::compile_source(&source, "<stdin>", None, options)?;
        return Ok((music, "standard input".to_string()));
    }
    let music = Compiler::compile_file(Path::new(infile), options)?;
    Ok((music, infile.to_string()))
}

/// Print accumulated warnings; fail if strict.
fn report_warnings(music: &CompiledMusic, strict: bool) -> Result<()> {
    let diag = &music.diagnostics;
    for warning in diag.warnings() {
        eprintln!("{warning}");
    }
    let unknown = diag.unknown_keywords();
    if unknown > MAX_UNKNOWN_KEYWORD_WARNINGS {
        eprintln!(
            "warning: {} more unknown keywords not shown",
            unknown - MAX_UNKNOWN_KEYWORD_WARNINGS
        );
    }
    if !diag.is_empty() {
        warn!(count = diag.len(), "compiled with warnings");
        if strict {
            bail!("{} warnings treated as errors (--strict)", diag.len());
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let config = merge_args(&args, AssemblerConfig::discover(args.config.as_deref())?);
    if args.infile.is_none() && config.periods == 0 {
        bail!("at least one of INFILE and --periods is required");
    }
    if config.periods > MAX_PERIODS {
        bail!("2A03 not precise enough for more than {MAX_PERIODS} semitones");
    }

    let compiled = match &args.infile {
        Some(infile) => Some(compile_input(infile, &config)?),
        None => None,
    };
    let source_name = compiled.as_ref().map_or("", |(_, name)| name.as_str());
    let music = compiled.as_ref().map(|(music, _)| music);

    if let Some(music) = music {
        if args.dump_json {
            let json = serde_json::to_string_pretty(&music.score).context("cannot dump score")?;
            eprintln!("{json}");
        }
        report_warnings(music, config.strict)?;
        debug!(bytes = music.total_bytes(), "compiled music");
    }

    let text = render_asm(music, &config.output_options(source_name));
    match &args.o {
        Some(path) => fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))?,
        None => io::stdout()
            .write_all(text.as_bytes())
            .context("cannot write standard output")?,
    }

    if let Some(path) = &args.write_inc {
        let Some(music) = music else {
            bail!("--write-inc requires an input file");
        };
        fs::write(path, render_inc(music)).with_context(|| format!("cannot write {}", path.display()))?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pentlyas: {e:#}");
            ExitCode::FAILURE
        }
    }
}
