use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use flockgrid::{Backend, FrameMonitor, Simulation, SimulationSettings, StepOutcome, DEFAULT_SAMPLE_INTERVAL};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "flockgrid", version, about = "Run a grid-partitioned boid flock headless")]
struct Cli {
    /// JSON settings file. Defaults are used when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the effective settings to this path and exit.
    #[arg(long)]
    write_settings: Option<PathBuf>,

    /// Override the agent count from the settings file.
    #[arg(long)]
    agents: Option<usize>,

    /// Compute backend: cpu or gpu.
    #[arg(long, default_value_t = Backend::Cpu)]
    backend: Backend,

    /// Number of steps to run.
    #[arg(long, default_value_t = 600)]
    steps: u64,

    /// Simulated seconds per step.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Spawn seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Halt when the measured step rate drops below this. 0 disables the check.
    #[arg(long, default_value_t = 0.0)]
    min_fps: f32,

    /// Steps between progress reports.
    #[arg(long, default_value_t = 60)]
    report_every: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => SimulationSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => SimulationSettings::default(),
    };
    if let Some(agents) = cli.agents {
        settings.agent_count = agents;
    }

    if let Some(path) = &cli.write_settings {
        settings
            .save(path)
            .with_context(|| format!("failed to write settings to {}", path.display()))?;
        info!(path = %path.display(), "settings written");
        return Ok(());
    }

    let monitor = if cli.min_fps > 0.0 {
        FrameMonitor::new(cli.min_fps, DEFAULT_SAMPLE_INTERVAL)
    } else {
        FrameMonitor::disabled()
    };

    let mut sim = Simulation::builder()
        .with_settings(settings)
        .with_backend(cli.backend)
        .with_seed(cli.seed)
        .with_frame_monitor(monitor)
        .build()
        .context("failed to build simulation")?;

    let stats = sim.grid_stats();
    info!(
        backend = %sim.backend_kind(),
        agents = stats.agent_count,
        cells = stats.cell_count,
        "starting run"
    );

    let started = Instant::now();
    let mut skipped = 0u64;
    for step in 1..=cli.steps {
        let frame_start = Instant::now();
        let outcome = sim.step(cli.dt);
        sim.record_frame(frame_start.elapsed());

        if let StepOutcome::Skipped(reason) = outcome {
            skipped += 1;
            if reason.is_sticky() {
                warn!(step, %reason, "run stopped");
                break;
            }
        }

        if cli.report_every > 0 && step % cli.report_every == 0 {
            info!(
                step,
                completed = sim.steps(),
                skipped,
                fps = sim.frame_monitor().fps().unwrap_or(0.0),
                "progress"
            );
        }
    }

    let elapsed = started.elapsed().max(Duration::from_micros(1));
    let snapshot = sim.agent_snapshot()?;
    let mean_neighbours = if snapshot.is_empty() {
        0.0
    } else {
        snapshot.iter().map(|a| a.neighbours as f64).sum::<f64>() / snapshot.len() as f64
    };
    info!(
        completed = sim.steps(),
        skipped,
        seconds = elapsed.as_secs_f64(),
        steps_per_second = sim.steps() as f64 / elapsed.as_secs_f64(),
        mean_neighbours,
        "run finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
