//! Command runner: ties together matrix files, the backend and the solvers.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use ndarray::Array2;

use rowcycle_compute::{ClusterContext, ComputeBackend, LocalCluster, SerialBackend};
use rowcycle_core::io::{read_matrix, write_matrix, MatrixFormat};
use rowcycle_core::matrix::{diagonally_dominant, dot, identity, max_abs_diff, EQ_TOLERANCE};
use rowcycle_core::solver::invert_with;
use rowcycle_core::{invert_distributed, invert_on_local_cluster, DistributedSolver, SolverError};

use crate::config::JobConfig;

/// Effective settings after merging the job file and command-line flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub participants: usize,
    pub backend: String,
    pub threads: usize,
    pub tolerance: f64,
}

impl Settings {
    pub fn from_job(job: &JobConfig) -> Self {
        Self {
            participants: job.cluster.participants,
            backend: job.compute.backend.clone(),
            threads: job.compute.threads,
            tolerance: job.compute.tolerance,
        }
    }

    /// Build the solver these settings describe.
    pub fn solver(&self) -> Result<DistributedSolver> {
        let backend = create_backend(&self.backend, self.threads)?;
        DistributedSolver::new(backend)
            .with_tolerance(self.tolerance)
            .context("Invalid pivot tolerance")
    }
}

/// Select the per-participant compute backend.
pub fn create_backend(preference: &str, threads: usize) -> Result<Arc<dyn ComputeBackend>> {
    let backend: Arc<dyn ComputeBackend> = match preference {
        "serial" => Arc::new(SerialBackend),
        "cpu" => {
            #[cfg(feature = "cpu")]
            {
                if threads == 0 {
                    Arc::new(rowcycle_compute::CpuBackend::new())
                } else {
                    Arc::new(
                        rowcycle_compute::CpuBackend::with_threads(threads)
                            .context("Failed to start the worker pool")?,
                    )
                }
            }
            #[cfg(not(feature = "cpu"))]
            {
                let _ = threads;
                bail!("CPU backend requested but binary was built without --features cpu");
            }
        }
        other => bail!("Unknown backend '{other}' (expected 'serial' or 'cpu')"),
    };
    log::info!("Backend: {}", backend.device_info().name);
    Ok(backend)
}

/// Parse an optional `t`/`b` format flag.
pub fn parse_format(flag: Option<&str>) -> Result<Option<MatrixFormat>> {
    flag.map(|f| f.parse::<MatrixFormat>())
        .transpose()
        .context("Invalid matrix format flag")
}

pub fn load(path: &Path, format: Option<MatrixFormat>) -> Result<Array2<f64>> {
    read_matrix(path, format).with_context(|| format!("Failed to read {}", path.display()))
}

pub fn store(path: &Path, matrix: &Array2<f64>, format: Option<MatrixFormat>) -> Result<()> {
    write_matrix(path, matrix.view(), format)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Invert `matrix` on an in-process cluster, or serially for a single
/// participant.
pub fn invert(matrix: &Array2<f64>, settings: &Settings) -> Result<Array2<f64>> {
    let solver = settings.solver()?;
    let inverse = if settings.participants <= 1 {
        log::info!("Single participant: using the serial solver");
        invert_with(matrix.view(), solver.backend(), solver.tolerance())?
    } else {
        invert_on_local_cluster(matrix, settings.participants, &solver)?
    };
    Ok(inverse)
}

/// One participant's share of a file-to-file inversion.
///
/// Only the root calls `load` and `store`. A failed load reaches the peers
/// through the solver's own agreement on the missing input; a failed store
/// is agreed on before the group is left, so no participant waits on one
/// that has already returned.
pub fn invert_collective<L, S>(
    ctx: ClusterContext,
    solver: &DistributedSolver,
    load: L,
    store: S,
) -> Result<()>
where
    L: FnOnce() -> Result<Array2<f64>>,
    S: FnOnce(&Array2<f64>) -> Result<()>,
{
    let mut load_error = None;
    let matrix = if ctx.is_root() {
        match load() {
            Ok(matrix) => {
                log::info!("Root loaded a {}x{} matrix", matrix.nrows(), matrix.ncols());
                Some(matrix)
            }
            Err(e) => {
                log::error!("Root failed to load the input: {e:#}");
                load_error = Some(e);
                None
            }
        }
    } else {
        None
    };

    let inverse = match invert_distributed(&ctx, matrix, solver) {
        Ok(inverse) => inverse,
        Err(e) => return Err(load_error.unwrap_or_else(|| e.into())),
    };

    let stored = match &inverse {
        Some(inverse) => store(inverse),
        None => Ok(()),
    };
    let everyone = ctx.comm().all_agree(stored.is_ok())?;
    stored?;
    if !everyone {
        bail!("Participant {}: the root failed to write the inverse", ctx.index());
    }
    ctx.leave()?;
    Ok(())
}

/// Read `input`, invert it with `settings` and write the inverse to
/// `output`.
pub fn invert_files(
    input: &Path,
    output: &Path,
    input_format: Option<MatrixFormat>,
    output_format: Option<MatrixFormat>,
    settings: &Settings,
) -> Result<()> {
    if settings.participants <= 1 {
        let matrix = load(input, input_format)?;
        let inverse = invert(&matrix, settings)
            .with_context(|| format!("Failed to invert {}", input.display()))?;
        return store(output, &inverse, output_format);
    }

    let solver = settings.solver()?;
    let results = LocalCluster::new(settings.participants).run(|comm| -> Result<()> {
        let ctx = ClusterContext::join(comm)?;
        invert_collective(
            ctx,
            &solver,
            || load(input, input_format),
            |inverse| store(output, inverse, output_format),
        )
    })?;
    first_failure(results).with_context(|| format!("Failed to invert {}", input.display()))
}

/// The most informative error of a group: the first one that is not merely
/// a reaction to another participant's failure.
fn first_failure(results: Vec<Result<()>>) -> Result<()> {
    let mut first_abort = None;
    for outcome in results {
        match outcome {
            Ok(()) => {}
            Err(e) if is_peer_abort(&e) => {
                first_abort.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    first_abort.map_or(Ok(()), Err)
}

fn is_peer_abort(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<SolverError>()
        .is_some_and(SolverError::is_peer_abort)
}

/// Run the inversion as one process of an MPI job. Only the root reads
/// `input` and writes `output`.
#[cfg(feature = "mpi")]
pub fn invert_mpi(
    input: &Path,
    output: &Path,
    input_format: Option<MatrixFormat>,
    output_format: Option<MatrixFormat>,
    settings: &Settings,
) -> Result<()> {
    let solver = settings.solver()?;
    let ctx = ClusterContext::join_mpi().context("Failed to join the MPI world")?;
    invert_collective(
        ctx,
        &solver,
        || load(input, input_format),
        |inverse| store(output, inverse, output_format),
    )
}

/// Mean wall-clock time of repeated inversions.
#[derive(Debug, Clone, Copy)]
pub struct BenchReport {
    pub repeats: usize,
    pub distributed: Duration,
    pub serial: Duration,
}

/// Time `repeats` distributed inversions of `matrix`, plus the serial
/// reference on the same backend.
pub fn bench(matrix: &Array2<f64>, repeats: usize, settings: &Settings) -> Result<BenchReport> {
    if repeats == 0 {
        bail!("Repeat count must be positive");
    }
    let solver = settings.solver()?;

    let mut distributed = Duration::ZERO;
    for run in 0..repeats {
        let started = Instant::now();
        invert_on_local_cluster(matrix, settings.participants, &solver)
            .with_context(|| format!("Distributed run {} failed", run + 1))?;
        distributed += started.elapsed();
    }

    let mut serial = Duration::ZERO;
    for _ in 0..repeats {
        let started = Instant::now();
        invert_with(matrix.view(), solver.backend(), solver.tolerance())?;
        serial += started.elapsed();
    }

    let n = repeats as u32;
    Ok(BenchReport {
        repeats,
        distributed: distributed / n,
        serial: serial / n,
    })
}

/// Write a random diagonally dominant matrix of order `order`.
pub fn generate(
    output: &Path,
    order: usize,
    seed: u64,
    format: Option<MatrixFormat>,
) -> Result<()> {
    let matrix = diagonally_dominant(order, seed);
    store(output, &matrix, format)
}

/// Largest deviation of `matrix · inverse` from the identity. Fails when it
/// exceeds the comparison tolerance.
pub fn check(matrix: &Array2<f64>, inverse: &Array2<f64>) -> Result<f64> {
    let product = dot(matrix.view(), inverse.view()).context("Incompatible matrices")?;
    let deviation = max_abs_diff(product.view(), identity(matrix.nrows()).view())
        .context("Product is not square")?;
    if deviation > EQ_TOLERANCE {
        bail!("Not an inverse: max |A·B - I| = {deviation:e} exceeds {EQ_TOLERANCE:e}");
    }
    Ok(deviation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn settings(participants: usize, backend: &str) -> Settings {
        Settings {
            participants,
            backend: backend.into(),
            threads: 2,
            tolerance: 1e-6,
        }
    }

    #[test]
    fn test_invert_then_check() {
        let matrix = diagonally_dominant(9, 1);
        for participants in [1, 3] {
            let inverse = invert(&matrix, &settings(participants, "serial")).unwrap();
            assert!(check(&matrix, &inverse).unwrap() <= EQ_TOLERANCE);
        }
    }

    #[test]
    fn test_check_rejects_wrong_inverse() {
        let matrix = array![[2.0, 0.0], [0.0, 2.0]];
        assert!(check(&matrix, &identity(2)).is_err());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(create_backend("gpu", 0).is_err());
    }

    #[test]
    fn test_generate_writes_readable_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.bin");
        generate(&path, 5, 3, None).unwrap();
        assert_eq!(load(&path, None).unwrap(), diagonally_dominant(5, 3));
    }

    #[test]
    fn test_bench_reports_means() {
        let matrix = diagonally_dominant(6, 2);
        let report = bench(&matrix, 2, &settings(2, "serial")).unwrap();
        assert_eq!(report.repeats, 2);
        assert!(bench(&matrix, 0, &settings(2, "serial")).is_err());
    }

    #[test]
    fn test_invalid_tolerance_is_rejected() {
        for tolerance in [f64::NAN, -1e-6] {
            let settings = Settings {
                tolerance,
                ..settings(2, "serial")
            };
            assert!(settings.solver().is_err());
        }
    }

    #[cfg(feature = "cpu")]
    #[test]
    fn test_cpu_backend_available() {
        assert!(create_backend("cpu", 2).unwrap().device_info().name.starts_with("CPU"));
    }

    #[cfg(not(feature = "cpu"))]
    #[test]
    fn test_cpu_backend_needs_feature() {
        assert!(create_backend("cpu", 2).is_err());
        assert!(create_backend("serial", 0).is_ok());
    }

    #[test]
    fn test_root_load_failure_releases_every_participant() {
        let solver = DistributedSolver::default();
        let results = LocalCluster::new(3)
            .run(|comm| -> Result<()> {
                let ctx = ClusterContext::join(comm)?;
                invert_collective(ctx, &solver, || bail!("unreadable input"), |_| Ok(()))
            })
            .unwrap();
        assert!(results[0].as_ref().unwrap_err().to_string().contains("unreadable input"));
        for outcome in &results[1..] {
            assert!(is_peer_abort(outcome.as_ref().unwrap_err()));
        }
    }

    #[test]
    fn test_root_store_failure_releases_every_participant() {
        let solver = DistributedSolver::default();
        let results = LocalCluster::new(3)
            .run(|comm| -> Result<()> {
                let ctx = ClusterContext::join(comm)?;
                invert_collective(
                    ctx,
                    &solver,
                    || Ok(diagonally_dominant(5, 8)),
                    |_| bail!("disk full"),
                )
            })
            .unwrap();
        assert!(results[0].as_ref().unwrap_err().to_string().contains("disk full"));
        assert!(results.iter().all(Result::is_err));
    }

    #[test]
    fn test_invert_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.bin");
        let output = dir.path().join("inv.bin");
        generate(&input, 7, 5, None).unwrap();
        for participants in [1, 3] {
            invert_files(&input, &output, None, None, &settings(participants, "serial")).unwrap();
            let inverse = load(&output, None).unwrap();
            assert!(check(&diagonally_dominant(7, 5), &inverse).unwrap() <= EQ_TOLERANCE);
        }
    }

    #[test]
    fn test_invert_files_reports_unwritable_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.bin");
        generate(&input, 4, 1, None).unwrap();
        let output = dir.path().join("missing").join("inv.bin");
        let err = invert_files(&input, &output, None, None, &settings(3, "serial")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to write"));
    }

    #[test]
    fn test_invert_files_reports_unreadable_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("absent.bin");
        let output = dir.path().join("inv.bin");
        let err = invert_files(&input, &output, None, None, &settings(3, "serial")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read"));
        assert!(!output.exists());
    }

    #[test]
    fn test_format_flags() {
        assert_eq!(parse_format(Some("b")).unwrap(), Some(MatrixFormat::Binary));
        assert_eq!(parse_format(None).unwrap(), None);
        assert!(parse_format(Some("z")).is_err());
    }
}
