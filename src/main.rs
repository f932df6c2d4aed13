use clap::Parser;
use dotswarm::config::SimConfig;
use dotswarm::Simulation;
use env_logger::Env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Swarm exploration simulator.
#[derive(Parser, Debug)]
#[command(name = "dotswarm", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of robots, overrides the configuration.
    #[arg(short, long)]
    robots: Option<usize>,

    /// RNG seed, overrides the configuration.
    #[arg(short, long)]
    seed: Option<u64>,

    /// ASCII floorplan file, overrides the configuration.
    #[arg(short, long)]
    floorplan: Option<PathBuf>,

    /// Throttle to this multiple of real time instead of fast-forward.
    #[arg(long)]
    play_speed: Option<f64>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("[Main] {}", e);
            return ExitCode::FAILURE;
        }
    };

    let simulation = match Simulation::build(&config) {
        Ok(simulation) => simulation,
        Err(e) => {
            log::error!("[Main] {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = simulation.run_at(args.play_speed);
    log::info!(
        "[Main] done: {:.1}s simulated, {} events, {} cells explored, {} bumps, map complete: {}",
        report.sim_time_s,
        report.events_dispatched,
        report.explored_cells,
        report.bumps,
        report.map.complete
    );
    log::info!(
        "[Main] channel: {} sent, {} delivered, {} dropped",
        report.channel.frames_sent,
        report.channel.frames_delivered,
        report.channel.frames_dropped
    );
    ExitCode::SUCCESS
}

fn load_config(args: &Args) -> dotswarm::Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(robots) = args.robots {
        config.simulation.num_robots = robots;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    if let Some(floorplan) = &args.floorplan {
        config.simulation.floorplan = Some(floorplan.clone());
    }
    config.validate()?;
    Ok(config)
}
