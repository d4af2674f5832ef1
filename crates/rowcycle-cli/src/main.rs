//! Rowcycle command-line interface.
//!
//! Invert matrices on an in-process cluster, or under `mpirun` when built
//! with `--features mpi`:
//! ```sh
//! rowcycle generate a.bin --order 512
//! rowcycle invert a.bin inv.bin --participants 4 --backend cpu
//! rowcycle check a.bin inv.bin
//! rowcycle bench a.bin --repeat 10
//! ```

mod config;
mod runner;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::config::{FileConfig, JobConfig};
use crate::runner::Settings;

#[derive(Parser)]
#[command(name = "rowcycle")]
#[command(about = "Row-cyclic distributed Gauss-Jordan matrix inversion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by the commands that run an inversion. Each one overrides
/// the job file.
#[derive(Args)]
struct ComputeArgs {
    /// TOML job file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Participants in the group.
    #[arg(short, long)]
    participants: Option<usize>,
    /// Per-participant backend: "serial" or "cpu".
    #[arg(short, long)]
    backend: Option<String>,
    /// Worker threads per participant (0 = all cores).
    #[arg(short, long)]
    threads: Option<usize>,
    /// Smallest accepted pivot magnitude.
    #[arg(long)]
    tolerance: Option<f64>,
}

impl ComputeArgs {
    fn job(&self) -> Result<JobConfig> {
        match &self.config {
            Some(path) => config::load_config(path),
            None => Ok(JobConfig::default()),
        }
    }

    fn settings(&self, job: &JobConfig) -> Settings {
        let mut settings = Settings::from_job(job);
        if let Some(participants) = self.participants {
            settings.participants = participants;
        }
        if let Some(backend) = &self.backend {
            settings.backend = backend.clone();
        }
        if let Some(threads) = self.threads {
            settings.threads = threads;
        }
        if let Some(tolerance) = self.tolerance {
            settings.tolerance = tolerance;
        }
        settings
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Invert a matrix file and write the inverse.
    Invert {
        /// Input matrix (overrides [input] in the job file).
        input: Option<PathBuf>,
        /// Output file for the inverse (overrides [output]).
        output: Option<PathBuf>,
        /// File format: "t" (text) or "b" (binary). Inferred from the
        /// extension when omitted.
        #[arg(short, long)]
        format: Option<String>,
        /// Run as one process of an MPI job instead of a local cluster.
        #[arg(long)]
        mpi: bool,
        #[command(flatten)]
        compute: ComputeArgs,
    },
    /// Time repeated distributed inversions against the serial solver.
    Bench {
        input: PathBuf,
        #[arg(short, long, default_value_t = 10)]
        repeat: usize,
        #[arg(short, long)]
        format: Option<String>,
        #[command(flatten)]
        compute: ComputeArgs,
    },
    /// Write a random diagonally dominant matrix.
    Generate {
        output: PathBuf,
        /// Matrix order.
        #[arg(short = 'n', long)]
        order: usize,
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
        #[arg(short, long)]
        format: Option<String>,
    },
    /// Verify that the product of a matrix and its claimed inverse is the
    /// identity.
    Check {
        matrix: PathBuf,
        inverse: PathBuf,
        #[arg(short, long)]
        format: Option<String>,
    },
}

/// Command-line path first, then the job file entry.
fn resolve_file(
    arg: Option<PathBuf>,
    section: Option<&FileConfig>,
    name: &str,
) -> Result<(PathBuf, Option<String>)> {
    match (arg, section) {
        (Some(path), section) => Ok((path, section.and_then(|s| s.format.clone()))),
        (None, Some(section)) => Ok((section.path.clone(), section.format.clone())),
        (None, None) => anyhow::bail!("No {name} file given on the command line or in the job file"),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Invert {
            input,
            output,
            format,
            mpi,
            compute,
        } => {
            let job = compute.job()?;
            let settings = compute.settings(&job);
            let (input, input_format) = resolve_file(input, job.input.as_ref(), "input")?;
            let (output, output_format) = resolve_file(output, job.output.as_ref(), "output")?;
            let input_format = runner::parse_format(format.as_deref().or(input_format.as_deref()))?;
            let output_format =
                runner::parse_format(format.as_deref().or(output_format.as_deref()))?;

            if mpi {
                #[cfg(feature = "mpi")]
                {
                    return runner::invert_mpi(
                        &input,
                        &output,
                        input_format,
                        output_format,
                        &settings,
                    );
                }
                #[cfg(not(feature = "mpi"))]
                {
                    anyhow::bail!("--mpi requires a binary built with --features mpi");
                }
            }

            println!(
                "Inverting {} on {} participant(s)",
                input.display(),
                settings.participants
            );
            runner::invert_files(&input, &output, input_format, output_format, &settings)?;
            println!("Inverse written to {}", output.display());
            Ok(())
        }
        Commands::Bench {
            input,
            repeat,
            format,
            compute,
        } => {
            let job = compute.job()?;
            let settings = compute.settings(&job);
            let matrix = runner::load(&input, runner::parse_format(format.as_deref())?)?;
            let report = runner::bench(&matrix, repeat, &settings)?;
            println!(
                "order = {}, participants = {}, repeats = {}",
                matrix.nrows(),
                settings.participants,
                report.repeats
            );
            println!("distributed mean = {} ns", report.distributed.as_nanos());
            println!("serial mean      = {} ns", report.serial.as_nanos());
            Ok(())
        }
        Commands::Generate {
            output,
            order,
            seed,
            format,
        } => {
            runner::generate(&output, order, seed, runner::parse_format(format.as_deref())?)?;
            println!("Wrote {order}x{order} matrix to {}", output.display());
            Ok(())
        }
        Commands::Check {
            matrix,
            inverse,
            format,
        } => {
            let format = runner::parse_format(format.as_deref())?;
            let a = runner::load(&matrix, format)?;
            let b = runner::load(&inverse, format)?;
            let deviation = runner::check(&a, &b)?;
            println!("OK: max |A·B - I| = {deviation:e}");
            Ok(())
        }
    }
}
