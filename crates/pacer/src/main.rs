use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pacer::errors::{EXIT_MALFORMED, SimulationError};
use pacer::types::requests::{EnvironmentSpec, RiderSpec, SimulationRequest, UserSegmentSpec};
use pacer::types::responses::SimulationResponse;
use pacer::{gpx_import, loader};

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}

#[derive(Parser)]
#[command(name = "pacer", about = "Predicts race time and pacing for a cyclist on a course")]
struct Cli {
    /// Solver wall-clock budget in seconds.
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Simulate one JSON request file and write the result JSON.
    Simulate {
        request: PathBuf,
        /// Output path; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Simulate a GPX course with a separate rider file.
    Gpx {
        course: PathBuf,
        /// JSON file with rider, optional environment and segments.
        #[arg(long)]
        rider: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Simulate many request files concurrently.
    Batch {
        requests: Vec<PathBuf>,
        #[arg(long)]
        output_dir: PathBuf,
    },
}

/// Rider-side payload for the `gpx` subcommand: a request without the course.
#[derive(Deserialize)]
struct GpxRequest {
    rider: RiderSpec,
    #[serde(default)]
    environment: EnvironmentSpec,
    #[serde(default)]
    segments: Vec<UserSegmentSpec>,
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let deadline = cli.deadline_secs.map(Duration::from_secs);

    match run(cli.command, deadline) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(command: Command, deadline: Option<Duration>) -> anyhow::Result<()> {
    match command {
        Command::Simulate { request, output } => {
            let response = simulate_file(&request, deadline)?;
            write_response(&response, output.as_deref())
        }
        Command::Gpx {
            course,
            rider,
            output,
        } => {
            let file = File::open(&course)
                .with_context(|| format!("opening course {}", course.display()))?;
            let raw = gpx_import::read_course(BufReader::new(file))?;
            let built = loader::build_course(&raw)?;

            let spec: GpxRequest = read_json(&rider)?;
            let profile = spec.rider.into_profile()?;
            let env = spec.environment.into_environment()?;
            let segments = spec
                .segments
                .into_iter()
                .enumerate()
                .map(|(i, s)| s.into_segment(i))
                .collect::<Result<Vec<_>, _>>()?;

            let solution = pacer::simulate_course(&built, &profile, env, segments, deadline)?;
            let response = SimulationResponse::from_solution(&built, &solution);
            write_response(&response, output.as_deref())
        }
        Command::Batch {
            requests,
            output_dir,
        } => {
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("creating {}", output_dir.display()))?;

            // Requests are independent; results are written per input file,
            // so parallel execution cannot change any single output.
            let failures: Vec<anyhow::Error> = requests
                .par_iter()
                .filter_map(|path| {
                    let result = simulate_file(path, deadline).and_then(|response| {
                        let stem = path.file_stem().unwrap_or_default().to_string_lossy();
                        let out = output_dir.join(format!("{stem}.result.json"));
                        write_response(&response, Some(&out))
                    });
                    match result {
                        Ok(()) => {
                            info!(request = %path.display(), "batch item done");
                            None
                        }
                        Err(err) => {
                            error!(request = %path.display(), "batch item failed: {err:#}");
                            Some(err)
                        }
                    }
                })
                .collect();

            match failures.into_iter().next() {
                None => Ok(()),
                Some(first) => Err(first),
            }
        }
    }
}

fn simulate_file(path: &Path, deadline: Option<Duration>) -> anyhow::Result<SimulationResponse> {
    let request: SimulationRequest = read_json(path)?;
    Ok(pacer::run_request(request, deadline)?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| SimulationError::malformed(path.display().to_string(), e.to_string()))?;
    Ok(value)
}

fn write_response(response: &SimulationResponse, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(response).context("serializing response")?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    info!(
        total_time_sec = format!("{:.0}", response.total_time_sec),
        base_power_w = format!("{:.0}", response.base_power_w),
        "simulation finished"
    );
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<SimulationError>()
        .map(|e| e.exit_code() as u8)
        .unwrap_or(EXIT_MALFORMED as u8)
}
