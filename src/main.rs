//! VPCSIM - CLI Entry Point
//!
//! Plant-community succession simulator.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;
use vpcsim::checkpoint::{Checkpoint, CheckpointManager};
use vpcsim::export::ExportSystem;
use vpcsim::{benchmark, RngMode, SimulationConfig, SimulationRun};

#[derive(Parser)]
#[command(name = "vpcsim")]
#[command(version)]
#[command(about = "Spatial, stochastic plant-community succession simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Sequential,
    Substream,
}

impl From<ModeArg> for RngMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => RngMode::Sequential,
            ModeArg::Substream => RngMode::Substream,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a new simulation
    Run {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Number of generations to simulate after generation 0
        #[arg(short, long, default_value = "500")]
        generations: u64,

        /// Output directory for checkpoints and reports
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Stop early once at most one species holds live cells
        #[arg(long)]
        stop_on_monoculture: bool,

        /// Quiet mode (minimal output)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Resume simulation from checkpoint
    Resume {
        /// Checkpoint file, or a checkpoint directory to resume its newest file
        #[arg(short, long)]
        checkpoint: PathBuf,

        /// Number of additional generations
        #[arg(short, long, default_value = "500")]
        generations: u64,

        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of generations
        #[arg(short, long, default_value = "100")]
        generations: u64,

        /// Grid side length
        #[arg(short, long, default_value = "200")]
        size: usize,

        /// Random draw strategy
        #[arg(long, value_enum, default_value = "substream")]
        mode: ModeArg,
    },

    /// Generate default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },

    /// Analyze a checkpoint file
    Analyze {
        /// Checkpoint file
        checkpoint: PathBuf,
    },

    /// Export a checkpoint's history as CSV and JSON
    Export {
        /// Checkpoint file
        checkpoint: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "export")]
        output: PathBuf,

        /// Also dump the cells of this generation (default: latest)
        #[arg(long)]
        generation: Option<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            generations,
            output,
            seed,
            stop_on_monoculture,
            quiet,
        } => run_simulation(config, generations, output, seed, stop_on_monoculture, quiet),

        Commands::Resume {
            checkpoint,
            generations,
            output,
        } => resume_simulation(checkpoint, generations, output),

        Commands::Benchmark {
            generations,
            size,
            mode,
        } => run_benchmark(generations, size, mode.into()),

        Commands::Init { output } => generate_config(output),

        Commands::Analyze { checkpoint } => analyze_checkpoint(checkpoint),

        Commands::Export {
            checkpoint,
            output,
            generation,
        } => export_checkpoint(checkpoint, output, generation),
    }
}

fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

/// Step `run` for `generations`, printing summaries and writing checkpoints.
/// Returns the number of generations computed.
fn drive(
    run: &mut SimulationRun,
    generations: u64,
    output: &Path,
    stop_on_monoculture: bool,
    quiet: bool,
) -> Result<u64, Box<dyn std::error::Error>> {
    let logging = run.config().logging.clone();
    let mut checkpoint_mgr = CheckpointManager::new(output, logging.checkpoint_interval, 10)?;

    for i in 0..generations {
        let stats = run.step().stats().clone();

        if !quiet && stats.generation % logging.stats_interval == 0 {
            println!("{}", stats.summary());
        }

        if checkpoint_mgr.should_save(stats.generation) {
            match checkpoint_mgr.save(&run.create_checkpoint()) {
                Ok(path) => {
                    if !quiet {
                        println!("  Checkpoint saved: {}", path.display());
                    }
                }
                Err(e) => log::error!("Checkpoint error: {}", e),
            }
        }

        if stop_on_monoculture {
            if let Some(message) = collapse_message(stats.richness(), stats.generation) {
                println!("\n{}", message);
                return Ok(i + 1);
            }
        }
    }

    Ok(generations)
}

/// Why a run stopping on monoculture stops, if it should
fn collapse_message(richness: usize, generation: u64) -> Option<String> {
    match richness {
        0 => Some(format!("No live plants left at generation {}", generation)),
        1 => Some(format!("Single species left at generation {}", generation)),
        _ => None,
    }
}

fn run_simulation(
    config_path: PathBuf,
    generations: u64,
    output: PathBuf,
    seed: Option<u64>,
    stop_on_monoculture: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = if config_path.exists() {
        let config = SimulationConfig::from_file(&config_path)?;
        init_logging(&config.logging.log_level);
        log::info!("Loaded config from {}", config_path.display());
        config
    } else {
        init_logging("info");
        log::info!("Using default configuration");
        SimulationConfig::default()
    };

    std::fs::create_dir_all(&output)?;

    let mut run = match seed {
        Some(s) => SimulationRun::new_with_seed(config, s)?,
        None => SimulationRun::new(config)?,
    };

    println!("Starting simulation");
    println!("  Seed: {}", run.seed());
    println!("  Grid size: {}x{}", run.config().world.x_cells, run.config().world.z_cells);
    println!("  Species: {}", run.engine().species().names().join(", "));
    println!("  Generations: {}", generations);
    println!();

    let start = Instant::now();
    let taken = drive(&mut run, generations, &output, stop_on_monoculture, quiet)?;
    let elapsed = start.elapsed();

    println!();
    println!("=== Simulation Complete ===");
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Generations: {}", taken);
    println!("Speed: {:.1} generations/s", taken as f64 / elapsed.as_secs_f64());
    println!("{}", run.latest().stats().summary());

    write_reports(&run, &output)
}

fn resume_simulation(
    checkpoint_path: PathBuf,
    generations: u64,
    output: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    // A directory resumes from its newest rotated checkpoint
    let checkpoint_path = if checkpoint_path.is_dir() {
        CheckpointManager::new(&checkpoint_path, 0, usize::MAX)?
            .find_latest()
            .ok_or_else(|| format!("no checkpoints in {}", checkpoint_path.display()))?
    } else {
        checkpoint_path
    };

    let checkpoint = Checkpoint::load(&checkpoint_path)?;
    init_logging(&checkpoint.config.logging.log_level);
    log::info!("Loaded checkpoint {}", checkpoint_path.display());

    let mut run = SimulationRun::from_checkpoint(checkpoint)?;

    println!("Resumed at generation {}", run.latest().index());
    println!("Running {} additional generations", generations);
    println!();

    std::fs::create_dir_all(&output)?;

    let start = Instant::now();
    let taken = drive(&mut run, generations, &output, false, false)?;
    let elapsed = start.elapsed();

    println!();
    println!("=== Resume Complete ===");
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Final generation: {}", run.latest().index());
    println!("Speed: {:.1} generations/s", taken as f64 / elapsed.as_secs_f64());

    write_reports(&run, &output)
}

/// Final checkpoint plus stats history
fn write_reports(run: &SimulationRun, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let final_path = output.join("final.bin");
    run.create_checkpoint().save(&final_path)?;
    println!("Final checkpoint: {}", final_path.display());

    let history = run.stats_history();
    let json_path = output.join("stats_history.json");
    ExportSystem::export_history_json(&history, &json_path)?;
    let csv_path = output.join("stats_history.csv");
    ExportSystem::export_history_csv(&history, run.engine().species(), &csv_path)?;
    println!("Stats history: {} / {}", json_path.display(), csv_path.display());

    Ok(())
}

fn run_benchmark(generations: u64, size: usize, mode: RngMode) -> Result<(), Box<dyn std::error::Error>> {
    init_logging("warn");
    println!("=== VPCSIM Benchmark ===");
    println!("Generations: {}", generations);
    println!("Grid: {}x{}", size, size);
    println!();

    let result = benchmark(generations, size, mode)?;
    println!("{}", result);

    Ok(())
}

fn generate_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = SimulationConfig::default();
    config.save(&output)?;
    println!("Configuration saved to: {}", output.display());
    Ok(())
}

fn analyze_checkpoint(checkpoint_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Checkpoint Analysis ===");
    println!("File: {}", checkpoint_path.display());
    println!();

    let checkpoint = Checkpoint::load(&checkpoint_path)?;
    let species = checkpoint.engine.species();

    println!("Seed: {}", checkpoint.random_seed);
    println!("Generations stored: {}", checkpoint.history.len());

    if let Some(latest) = checkpoint.history.last() {
        let stats = latest.stats();
        let total = stats.total_cells().max(1) as f32;

        println!("Latest generation: {}", stats.generation);
        println!(
            "Gaps: {} open, {} permanent",
            stats.open_gaps(),
            stats.permanent_gaps
        );
        println!();
        println!("{:<16} {:>8} {:>7} {:>9} {:>10}", "Species", "Cells", "Cover", "Mean age", "Biomass");
        for (id, name) in species.ids().zip(species.names()) {
            let slot = id as usize;
            let cells = stats.counts_by_species[slot];
            println!(
                "{:<16} {:>8} {:>6.1}% {:>9.1} {:>10.0}",
                name,
                cells,
                100.0 * cells as f32 / total,
                stats.average_age_by_species[slot],
                stats.total_biomass_by_species[slot],
            );
        }

        let clamped: u64 = checkpoint
            .history
            .iter()
            .map(|g| g.stats().clamped_selections as u64)
            .sum();
        if clamped > 0 {
            println!();
            println!("Clamped selection draws over the run: {}", clamped);
        }
    }

    println!();
    println!(
        "Checkpoint size: {:.2} MB",
        checkpoint.size_bytes() as f64 / 1_000_000.0
    );

    Ok(())
}

fn export_checkpoint(
    checkpoint_path: PathBuf,
    output: PathBuf,
    generation: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info");
    let checkpoint = Checkpoint::load(&checkpoint_path)?;
    let run = SimulationRun::from_checkpoint(checkpoint)?;
    std::fs::create_dir_all(&output)?;

    let history = run.stats_history();
    ExportSystem::export_history_csv(&history, run.engine().species(), output.join("species.csv"))?;
    ExportSystem::export_history_json(&history, output.join("stats_history.json"))?;

    let index = generation.unwrap_or(run.history().len() - 1);
    let snapshot = run
        .generation(index)
        .ok_or_else(|| format!("generation {} not in checkpoint (latest {})", index, run.latest().index()))?;
    let cells_path = output.join(format!("cells_{:06}.csv", index));
    ExportSystem::export_generation_csv(snapshot, &cells_path)?;

    println!("Exported {} generations to {}", history.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_message() {
        assert_eq!(collapse_message(0, 12).unwrap(), "No live plants left at generation 12");
        assert_eq!(collapse_message(1, 40).unwrap(), "Single species left at generation 40");
        assert_eq!(collapse_message(2, 40), None);
    }
}
