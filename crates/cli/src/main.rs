//! PIM accelerator simulator CLI.
//!
//! This binary provides a single entry point for the simulator. It performs:
//! 1. **Run:** Load a chip configuration and one program per core, simulate
//!    and print the report, optionally writing it as JSON.
//! 2. **Check:** Validate a configuration and print a summary of the chip.

use std::path::{Path, PathBuf};
use std::{fs, process};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pimsim_core::Simulator;
use pimsim_core::sim::loader;
use pimsim_core::stats::REPORT_SECTIONS;

#[derive(Parser, Debug)]
#[command(
    name = "pimsim",
    author,
    version,
    about = "Processing-in-memory accelerator simulator",
    long_about = "Simulate a multi-core PIM chip running one instruction program per core.\n\nExamples:\n  pimsim run --config config.json --program core0.json\n  pimsim run -c config.json -p core0.json -p core1.json --report report.json\n  pimsim check --config config.json"
)]
struct Cli {
    /// Log instruction-level events (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate the chip and print the report.
    Run {
        /// Chip configuration (JSON).
        #[arg(short, long)]
        config: PathBuf,

        /// Instruction program (JSON array), one per core in core order.
        #[arg(short, long = "program", required = true)]
        programs: Vec<PathBuf>,

        /// Write the report as JSON to this file.
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Report sections to print; all of them when omitted.
        #[arg(short, long, value_delimiter = ',', value_parser = clap::builder::PossibleValuesParser::new(REPORT_SECTIONS.iter().copied()))]
        sections: Vec<String>,
    },

    /// Validate a configuration and print a summary.
    Check {
        /// Chip configuration (JSON).
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            programs,
            report,
            sections,
        } => cmd_run(&config, &programs, report, &sections),
        Commands::Check { config } => cmd_check(&config),
    }
}

/// Installs the log subscriber: `warn` by default, `debug` with `--verbose`,
/// and whatever `RUST_LOG` says when it is set.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs the simulation and prints the report; exits with code 1 on any error.
fn cmd_run(config: &Path, programs: &[PathBuf], report: Option<PathBuf>, sections: &[String]) {
    tracing::info!(config = %config.display(), programs = programs.len(), "starting run");
    let simulator = Simulator::from_files(config, programs).unwrap_or_else(|e| {
        eprintln!("[!] FATAL: {e}");
        process::exit(1);
    });
    let reporter = simulator.run().unwrap_or_else(|e| {
        eprintln!("[!] FATAL: simulation failed: {e}");
        process::exit(1);
    });
    reporter.print_sections(sections);

    if let Some(path) = report {
        let json = serde_json::to_string_pretty(&reporter).unwrap_or_else(|e| {
            eprintln!("[!] FATAL: could not serialize report: {e}");
            process::exit(1);
        });
        if let Err(e) = fs::write(&path, json) {
            eprintln!("[!] FATAL: could not write report '{}': {e}", path.display());
            process::exit(1);
        }
        println!("[*] Report written to {}", path.display());
    }
}

/// Validates a configuration and prints the shape of the chip.
fn cmd_check(config: &Path) {
    let config = loader::load_config(config).unwrap_or_else(|e| {
        eprintln!("[!] Invalid configuration: {e}");
        process::exit(1);
    });
    let chip = &config.chip_config;
    let core = &chip.core_config;
    let pim = &core.pim_unit_config;
    println!("[*] Configuration is valid");
    println!(
        "  Period: {} ns  Mode: {:?}  Data: {:?}",
        config.sim_config.period_ns, config.sim_config.sim_mode, config.sim_config.data_mode
    );
    println!("  Cores: {}", chip.core_cnt);
    println!(
        "  PIM: {} macros in groups of {}  value sparse: {}  bit sparse: {}",
        pim.macro_total_cnt, pim.macro_group_size, pim.value_sparse, pim.bit_sparse
    );
    println!("  Local memory banks:");
    for bank in &core.local_memory_unit_config.local_memory_list {
        println!(
            "    {:<16} [{:#x}, {:#x})",
            bank.name,
            bank.addressing.offset_byte,
            bank.addressing.end()
        );
    }
    println!(
        "  Global memory: [{:#x}, {:#x})",
        chip.global_memory_addressing.offset_byte,
        chip.global_memory_addressing.end()
    );
}
