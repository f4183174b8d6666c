//! ESKF REPLAY: drive the IMU / lidar error-state Kalman filter from recorded logs.
//!
//! The `run` command merges an inertial CSV log with a lidar pose CSV log, feeds them through
//! the filter in time order, and writes one odometry row per absorbed inertial sample. The
//! `create-config` command writes the default filter configuration so it can be edited.
//!
//! For the CSV column layouts, see the `lio_eskf::replay` module documentation.

mod common;

use clap::{Args, Parser, Subcommand};
use common::{ensure_parent_dir, init_logger, validate_input_file};
use lio_eskf::replay::{
    ImuRecord, PoseRecord, build_event_stream, read_csv, run_closed_loop, write_csv,
};
use lio_eskf::{ErrorStateKalmanFilter, FilterConfig};
use log::{error, info};
use std::error::Error;
use std::path::{Path, PathBuf};

const LONG_ABOUT: &str = "ESKF REPLAY: drive the IMU / lidar error-state Kalman filter from recorded logs.

Inertial log columns: time,gyro_x,gyro_y,gyro_z,acc_x,acc_y,acc_z[,qw,qx,qy,qz]
Lidar pose log columns: time,x,y,z,qw,qx,qy,qz

The filter configuration can be given as a TOML, JSON or YAML file; the built-in defaults are
used otherwise.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Replay IMU and lidar logs through an error-state Kalman filter.", long_about = LONG_ABOUT)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
enum Command {
    /// Run the filter over recorded logs
    Run(RunArgs),
    /// Write the default filter configuration to a file (.toml/.json/.yaml)
    CreateConfig {
        /// Output configuration file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Filter configuration file (TOML/JSON/YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Inertial CSV log
    #[arg(long)]
    imu: PathBuf,
    /// Lidar pose CSV log
    #[arg(long)]
    poses: PathBuf,
    /// Output odometry CSV
    #[arg(short, long)]
    output: PathBuf,
}

fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    validate_input_file(&args.imu)?;
    validate_input_file(&args.poses)?;
    let config = match &args.config {
        Some(path) => FilterConfig::load(path)?,
        None => {
            info!("No configuration file given, using defaults");
            FilterConfig::default()
        }
    };

    let imu: Vec<ImuRecord> = read_csv(&args.imu)?;
    let poses: Vec<PoseRecord> = read_csv(&args.poses)?;
    info!(
        "Read {} inertial samples from {} and {} poses from {}",
        imu.len(),
        args.imu.display(),
        poses.len(),
        args.poses.display()
    );

    let events = build_event_stream(&imu, &poses);
    let mut filter = ErrorStateKalmanFilter::new(&config);
    let output = run_closed_loop(&mut filter, &events)?;

    ensure_parent_dir(&args.output)?;
    write_csv(&output.records, &args.output)?;
    info!(
        "Wrote {} odometry records to {}",
        output.records.len(),
        args.output.display()
    );
    Ok(())
}

fn create_config(output: &Path) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(output)?;
    FilterConfig::default().to_file(output)?;
    info!("Default configuration written to {}", output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    let result = match &cli.command {
        Command::Run(args) => run(args),
        Command::CreateConfig { output } => create_config(output),
    };
    if let Err(e) = &result {
        error!("{e}");
    }
    result
}
