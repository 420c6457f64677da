//! Out-of-order pipeline simulator CLI.
//!
//! Loads a JSON [`Config`], replays a textual uop trace through a single
//! [`ScriptedFrontend`] context, and runs until one of the termination
//! conditions in spec.md §6 is hit, then prints the requested stats
//! sections and exits with a code reflecting why the run stopped.

mod trace;

use std::fs;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use uarchsim_core::config::Config;
use uarchsim_core::frontend::scripted::ScriptedFrontend;
use uarchsim_core::memory::directory::DirectoryMemoryModule;
use uarchsim_core::memory::simple::SimpleMemoryModule;
use uarchsim_core::memory::MemoryModule;
use uarchsim_core::stats::STATS_SECTIONS;
use uarchsim_core::{RunLimits, Simulator, TerminationReason};

#[derive(Parser, Debug)]
#[command(
    name = "uarchsim",
    author,
    version,
    about = "Out-of-order superscalar pipeline simulator",
    long_about = "Replays a textual uop trace through the out-of-order back end and \
reports microarchitectural stats.\n\nExamples:\n  uarchsim trace.txt\n  \
uarchsim trace.txt --config config.json --max-cycles 100000\n  \
uarchsim trace.txt --memory directory --stats-section summary --stats-section branch"
)]
struct Cli {
    /// Path to the textual uop trace to replay.
    trace: String,

    /// Path to a JSON configuration file (uses built-in defaults if omitted).
    #[arg(long)]
    config: Option<String>,

    /// Memory-module backend.
    #[arg(long, value_enum, default_value = "simple")]
    memory: MemoryBackend,

    /// Fixed per-access latency in cycles, for either memory backend.
    #[arg(long, default_value_t = 50)]
    memory_latency: u64,

    /// Coherence line size in bytes, for the directory backend.
    #[arg(long, default_value_t = 64)]
    line_bytes: u64,

    /// Stop after this many cycles.
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Stop after this many committed uops.
    #[arg(long)]
    max_instructions: Option<u64>,

    /// Stop after this many seconds of wall-clock time.
    #[arg(long)]
    max_wall_seconds: Option<u64>,

    /// Consecutive stalled cycles (no commits anywhere) before giving up.
    #[arg(long)]
    stall_threshold: Option<u64>,

    /// Stats section to print (repeatable); prints every section if omitted.
    #[arg(long = "stats-section")]
    stats_section: Vec<String>,

    /// Write a per-cycle JSONL event trace to this path (requires the
    /// `trace-events` build feature).
    #[arg(long)]
    event_trace: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum MemoryBackend {
    Simple,
    Directory,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    for section in &cli.stats_section {
        if !STATS_SECTIONS.contains(&section.as_str()) {
            eprintln!(
                "unknown stats section {section:?}; valid sections are {}",
                STATS_SECTIONS.join(", ")
            );
            process::exit(2);
        }
    }

    let config = match &cli.config {
        Some(path) => load_config(path),
        None => Config::default(),
    };

    let steps = match fs::read_to_string(&cli.trace) {
        Ok(source) => match trace::parse(&source) {
            Ok(steps) => steps,
            Err(err) => {
                eprintln!("{}: {err}", cli.trace);
                process::exit(2);
            }
        },
        Err(err) => {
            eprintln!("{}: {err}", cli.trace);
            process::exit(2);
        }
    };

    let memory: Box<dyn MemoryModule> = match cli.memory {
        MemoryBackend::Simple => Box::new(SimpleMemoryModule::new(cli.memory_latency)),
        MemoryBackend::Directory => Box::new(DirectoryMemoryModule::new(
            cli.line_bytes,
            cli.memory_latency,
        )),
    };

    let entry_eip = steps.first().map_or(0, |s| s.uops[0].eip);
    let mut sim = match Simulator::new(config, memory) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            process::exit(2);
        }
    };
    sim.spawn_context(entry_eip, Box::new(ScriptedFrontend::new(steps)));

    if let Some(path) = &cli.event_trace {
        install_event_trace(&mut sim, path);
    }

    let limits = RunLimits {
        max_cycles: cli.max_cycles,
        max_instructions: cli.max_instructions,
        max_wall_time: cli.max_wall_seconds.map(Duration::from_secs),
        stall_threshold: cli
            .stall_threshold
            .unwrap_or_else(|| RunLimits::default().stall_threshold),
    };

    let reason = sim.run_until(limits);

    sim.stats().print_sections(&cli.stats_section);
    println!("Termination: {reason:?}");

    process::exit(exit_code(reason));
}

#[cfg(feature = "trace-events")]
fn install_event_trace(sim: &mut Simulator, path: &str) {
    use uarchsim_core::common::CoreId;
    use uarchsim_core::events::JsonlEventSink;

    match JsonlEventSink::new(path) {
        Ok(sink) => sim.set_event_sink(CoreId(0), Box::new(sink)),
        Err(err) => {
            eprintln!("{path}: {err}");
            process::exit(2);
        }
    }
}

#[cfg(not(feature = "trace-events"))]
fn install_event_trace(_sim: &mut Simulator, _path: &str) {
    eprintln!("--event-trace requires the `trace-events` build feature");
    process::exit(2);
}

fn load_config(path: &str) -> Config {
    let text = fs::read_to_string(path).unwrap_or_else(|err| {
        eprintln!("{path}: {err}");
        process::exit(2);
    });
    serde_json::from_str(&text).unwrap_or_else(|err| {
        eprintln!("{path}: {err}");
        process::exit(2);
    })
}

/// Maps a termination reason to a process exit code (spec.md §6/§7:
/// successful completion is `0`, every other termination is a distinct
/// nonzero code so a calling script can discriminate).
fn exit_code(reason: TerminationReason) -> i32 {
    match reason {
        TerminationReason::ContextsFinished => 0,
        TerminationReason::MaxCpuCycles => 10,
        TerminationReason::MaxCpuInstructions => 11,
        TerminationReason::MaxWallTime => 12,
        TerminationReason::Signal => 13,
        TerminationReason::Stall => 14,
    }
}
