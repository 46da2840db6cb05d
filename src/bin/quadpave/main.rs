//! quadpave CLI - all-quad region meshing.
//!
//! Usage: quadpave <COMMAND> [OPTIONS] <INPUT>
//!
//! Run `quadpave --help` for available commands. Set `RUST_LOG=quadpave=debug`
//! to follow the scheme interpreter.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quadpave::algo::progress::Progress;
use quadpave::driver::{mesh_regions, RegionOutcome};
use quadpave::io::{self, MeshFile};
use quadpave::region::{check_region, classify_scheme};

#[derive(Parser)]
#[command(name = "quadpave")]
#[command(author, version, about = "All-quadrilateral region mesher", long_about = None)]
struct Cli {
    /// Increase logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable logging
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mesh every region of a region file
    Mesh {
        /// Input region file (JSON)
        input: PathBuf,

        /// Output mesh file (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Scheme for regions that have none
        #[arg(short, long)]
        scheme: Option<String>,

        /// Mesh regions on all cores
        #[arg(long)]
        parallel: bool,
    },

    /// Check and classify regions without meshing them
    Check {
        /// Input region file (JSON)
        input: PathBuf,
    },
}

/// Initialize the tracing subscriber; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "quadpave=info",
            2 => "quadpave=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Mesh {
            input,
            output,
            scheme,
            parallel,
        } => cmd_mesh(&input, &output, scheme, parallel)?,
        Commands::Check { input } => cmd_check(&input)?,
    }
    Ok(())
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }
        let done = current + 1;
        let raw_percent = ((done * 100) + (total / 2)) / total;

        // regions finish out of order in parallel runs; never move backwards
        let percent = max_percent.fetch_max(raw_percent, Ordering::Relaxed).max(raw_percent);

        let bar_width = 30;
        let filled = (percent.min(100) * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);
        eprint!("\r[{}{}] {:3}% {:<16}", bar, space, percent, message);
        let _ = std::io::stderr().flush();

        if done >= total {
            eprintln!();
        }
    })
}

fn cmd_mesh(
    input: &PathBuf,
    output: &PathBuf,
    scheme: Option<String>,
    parallel: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = io::load_regions(input)?;
    let mut config = file.config.clone().unwrap_or_default();
    if let Some(scheme) = scheme {
        config = config.with_default_scheme(scheme);
    }
    if parallel {
        config = config.with_parallel(true);
    }
    config.validate()?;

    println!("Loaded: {} regions", file.regions.len());
    let mode = if config.parallel { "parallel" } else { "sequential" };
    println!("Meshing ({}, default scheme {:?})...", mode, config.default_scheme);

    let start = Instant::now();
    let batch = mesh_regions(&file.regions, &config, &create_progress());
    let elapsed = start.elapsed();

    for outcome in &batch.outcomes {
        match outcome {
            RegionOutcome::Meshed(m) => println!(
                "  region {:>4}: {:>6} nodes {:>6} elements  scheme {:?}{}",
                m.output.region,
                m.output.num_nodes(),
                m.output.num_elements(),
                m.output.scheme,
                if m.growths > 0 {
                    format!("  ({} capacity increases)", m.growths)
                } else {
                    String::new()
                }
            ),
            RegionOutcome::Skipped { region, reason } => println!("  region {:>4}: skipped, {}", region, reason),
        }
    }
    println!(
        "Result: {} of {} regions, {} nodes, {} elements",
        batch.meshed_count(),
        batch.outcomes.len(),
        batch.merged.nodes.len(),
        batch.merged.elements.len()
    );

    io::save_output(output, &MeshFile::from_batch(&batch))?;
    println!("Saved: {} ({:.2?})", output.display(), elapsed);
    Ok(())
}

fn cmd_check(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let file = io::load_regions(input)?;
    let config = file.config.clone().unwrap_or_default();

    println!("File: {}", input.display());
    let mut failures = 0;
    for region in &file.regions {
        let automatic = region.scheme.trim().is_empty();
        let scheme = if automatic {
            config.default_scheme.as_str()
        } else {
            region.scheme.as_str()
        };
        let result = check_region(region).and_then(|checked| {
            let (class, _) = classify_scheme(&checked, scheme, automatic)?;
            Ok((checked, class))
        });
        match result {
            Ok((checked, class)) => println!(
                "  region {:>4}: {:?}, {} perimeter nodes, {} holes, sides {:?}",
                region.id,
                class.shape,
                checked.perimeter.len(),
                checked.holes.len(),
                class.sides
            ),
            Err(e) => {
                failures += 1;
                println!("  region {:>4}: {}", region.id, e);
            }
        }
    }
    if failures > 0 {
        return Err(format!("{} of {} regions failed the check", failures, file.regions.len()).into());
    }
    Ok(())
}
