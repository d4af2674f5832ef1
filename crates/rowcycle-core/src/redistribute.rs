//! Scatter and gather of the inversion task across the group.
//!
//! Both operations are collective: every participant calls them in the same
//! order with its own task. Any step that can fail locally (validation,
//! allocation) is followed by an agreement round before the next collective
//! call, so either every participant proceeds or every participant returns an
//! error.
//!
//! Wire protocol of [`scatter`]:
//!
//! 1. The root sends three `u64` scalars to each non-root participant: the
//!    upper-bound shard rows, the column count and that participant's exact
//!    row count. Barrier.
//! 2. For the forward matrix, then the reverse matrix: the root posts one
//!    non-blocking send per non-root participant (a shard padded to the
//!    upper bound with zero rows), waits for all of them, then keeps its own
//!    shard. Non-root participants receive into a buffer of the same padded
//!    size. Barrier.
//!
//! [`gather`] has the root receive exactly `shard_row_count` rows from each
//! participant in index order and place them at their strided positions.

use std::time::Instant;

use ndarray::{s, Array2, ArrayView2};
use rowcycle_compute::{
    ClusterContext, Communicator, ContextError, LocalCluster, MIN_GROUP_SIZE, ROOT,
};

use crate::matrix::try_zeros;
use crate::partition::{copy_strided_rows, place_shard, shard_row_count, ShardGeometry};
use crate::solver::{DistributedSolver, SolverError};
use crate::types::InversionTask;

/// Exchange the outcome of a locally fallible step with the whole group.
///
/// Returns the local value only if every participant succeeded. A
/// participant whose own step failed gets its own error back; the others get
/// [`SolverError::PeerAborted`] naming `phase`.
pub(crate) fn agree<T>(
    ctx: &ClusterContext,
    local: Result<T, SolverError>,
    phase: &str,
) -> Result<T, SolverError> {
    let everyone = ctx.comm().all_agree(local.is_ok())?;
    match local {
        Err(e) => {
            log::error!("Participant {}: {phase} failed: {e}", ctx.index());
            Err(e)
        }
        Ok(_) if !everyone => {
            log::warn!(
                "Participant {}: aborting {phase}, another participant failed",
                ctx.index()
            );
            Err(SolverError::PeerAborted {
                phase: phase.to_string(),
            })
        }
        Ok(value) => Ok(value),
    }
}

/// Distribute the root's forward and reverse matrices row-cyclically.
///
/// On return every participant's task holds its padded shards and their
/// geometry. The root's full matrices are released.
pub fn scatter(ctx: &ClusterContext, task: &mut InversionTask) -> Result<(), SolverError> {
    let comm = ctx.comm();
    let local = if ctx.is_root() {
        validate(task)
    } else {
        Ok(())
    };
    agree(ctx, local, "scatter validation")?;

    let geometry = if ctx.is_root() {
        let geometry = send_geometry(ctx, task.forward.nrows())?;
        agree(ctx, Ok(geometry), "scatter geometry")?
    } else {
        let words = receive_geometry(ctx)?;
        agree(ctx, decode_geometry(words), "scatter geometry")?
    };
    comm.barrier()?;
    log::debug!(
        "Participant {}: shard geometry {} rows (buffer {}) x {} cols",
        ctx.index(),
        geometry.exact_rows,
        geometry.rows,
        geometry.cols
    );

    let forward = scatter_pass(ctx, task.forward.view(), geometry, "forward")?;
    let reverse = scatter_pass(ctx, task.reverse.view(), geometry, "reverse")?;
    task.forward = forward;
    task.reverse = reverse;
    task.geometry = Some(geometry);
    Ok(())
}

/// Reassemble the distributed reverse shards into the full inverse.
///
/// Returns `Some(inverse)` at the root and `None` everywhere else.
pub fn gather(
    ctx: &ClusterContext,
    task: InversionTask,
) -> Result<Option<Array2<f64>>, SolverError> {
    let local = task.geometry().ok_or(SolverError::NotScattered);
    let geometry = agree(ctx, local, "gather setup")?;
    let n = geometry.cols;
    let size = ctx.size();
    let comm = ctx.comm();

    if !ctx.is_root() {
        agree(ctx, Ok(()), "gather allocation")?;
        comm.send_buffer(ctx.root(), contiguous(task.reverse_shard())?)?;
        log::debug!(
            "Participant {}: sent {} rows to the root",
            ctx.index(),
            geometry.exact_rows
        );
        return Ok(None);
    }

    let buffers = try_zeros(n, n).and_then(|result| Ok((result, try_zeros(geometry.rows, n)?)));
    let (mut result, mut buffer) = agree(ctx, buffers, "gather allocation")?;

    for owner in 0..size {
        if owner == ctx.root() {
            place_shard(&mut result, task.reverse_shard(), owner, size);
            continue;
        }
        let rows = shard_row_count(n, size, owner);
        let mut dest = buffer.slice_mut(s![..rows, ..]);
        let slice = dest
            .as_slice_mut()
            .ok_or(SolverError::Layout("gather buffer is not contiguous"))?;
        comm.recv_buffer_into(owner, slice)?;
        place_shard(&mut result, buffer.view(), owner, size);
    }

    log::debug!("Root gathered {n}x{n} inverse from {size} participants");
    Ok(Some(result))
}

/// Validate, scatter, eliminate and gather in one collective call.
///
/// The root passes the matrix to invert; other participants pass `None`
/// (anything they pass is ignored). Returns the inverse at the root.
pub fn invert_distributed(
    ctx: &ClusterContext,
    matrix: Option<Array2<f64>>,
    solver: &DistributedSolver,
) -> Result<Option<Array2<f64>>, SolverError> {
    let started = Instant::now();
    let local = match (ctx.is_root(), matrix) {
        (true, Some(matrix)) => Ok(InversionTask::root(matrix)),
        (true, None) => Err(SolverError::MissingInput),
        (false, _) => Ok(InversionTask::participant()),
    };
    let mut task = agree(ctx, local, "input")?;

    scatter(ctx, &mut task)?;
    solver.invert(ctx, &mut task)?;
    let inverse = gather(ctx, task)?;

    if let Some(inverse) = &inverse {
        log::info!(
            "Inverted {}x{} on {} participants in {:.3?}",
            inverse.nrows(),
            inverse.ncols(),
            ctx.size(),
            started.elapsed()
        );
    }
    Ok(inverse)
}

/// Run [`invert_distributed`] on an in-process group of `participants`
/// threads and return the inverse.
///
/// When several participants fail, the error of the one that detected the
/// problem is returned in preference to the peer aborts it caused.
pub fn invert_on_local_cluster(
    matrix: &Array2<f64>,
    participants: usize,
    solver: &DistributedSolver,
) -> Result<Array2<f64>, SolverError> {
    if participants < MIN_GROUP_SIZE {
        return Err(ContextError::GroupTooSmall { size: participants }.into());
    }
    let results = LocalCluster::new(participants).run(|comm| {
        let ctx = ClusterContext::join(comm)?;
        let input = ctx.is_root().then(|| matrix.clone());
        let inverse = invert_distributed(&ctx, input, solver)?;
        ctx.leave()?;
        Ok::<_, SolverError>(inverse)
    })?;

    let mut root_result = None;
    let mut first_abort = None;
    for (index, outcome) in results.into_iter().enumerate() {
        match outcome {
            Err(e) if e.is_peer_abort() => {
                first_abort.get_or_insert(e);
            }
            Err(e) => return Err(e),
            Ok(inverse) if index == ROOT => root_result = inverse,
            Ok(_) => {}
        }
    }
    if let Some(e) = first_abort {
        return Err(e);
    }
    root_result.ok_or(SolverError::Layout("root returned no inverse"))
}

fn validate(task: &InversionTask) -> Result<(), SolverError> {
    let (rows, cols) = task.forward.dim();
    if rows != cols {
        return Err(SolverError::NotSquare { rows, cols });
    }
    if task.reverse.dim() != task.forward.dim() {
        return Err(SolverError::ShapeMismatch {
            expected: task.forward.dim(),
            found: task.reverse.dim(),
        });
    }
    Ok(())
}

fn send_geometry(ctx: &ClusterContext, order: usize) -> Result<ShardGeometry, SolverError> {
    let comm = ctx.comm();
    let size = ctx.size();
    for peer in (0..size).filter(|&p| p != ctx.root()) {
        let geometry = ShardGeometry::for_owner(order, order, size, peer);
        for word in [geometry.rows, geometry.cols, geometry.exact_rows] {
            comm.send_scalar(peer, word as u64)?;
        }
    }
    Ok(ShardGeometry::for_owner(order, order, size, ctx.root()))
}

fn receive_geometry(ctx: &ClusterContext) -> Result<[u64; 3], SolverError> {
    let mut words = [0u64; 3];
    for word in &mut words {
        *word = ctx.comm().recv_scalar(ctx.root())?;
    }
    Ok(words)
}

fn decode_geometry([rows, cols, exact_rows]: [u64; 3]) -> Result<ShardGeometry, SolverError> {
    let decode = |word: u64| {
        usize::try_from(word).map_err(|_| SolverError::Layout("shard geometry overflows usize"))
    };
    let geometry = ShardGeometry {
        rows: decode(rows)?,
        cols: decode(cols)?,
        exact_rows: decode(exact_rows)?,
    };
    if geometry.exact_rows > geometry.rows {
        return Err(SolverError::Layout("exact rows exceed the shard upper bound"));
    }
    Ok(geometry)
}

/// Move one matrix's shards from the root to every participant.
fn scatter_pass(
    ctx: &ClusterContext,
    source: ArrayView2<'_, f64>,
    geometry: ShardGeometry,
    name: &str,
) -> Result<Array2<f64>, SolverError> {
    let comm: &dyn Communicator = ctx.comm();
    let size = ctx.size();
    let root = ctx.root();
    let phase = format!("scatter of the {name} matrix");

    let shard = if ctx.is_root() {
        let peers: Vec<usize> = (0..size).filter(|&p| p != root).collect();
        let local = peers
            .iter()
            .map(|&peer| padded_shard(source, peer, size, geometry).map(|shard| (peer, shard)))
            .collect::<Result<Vec<_>, _>>()
            .and_then(|shards| Ok((shards, padded_shard(source, root, size, geometry)?)));
        let (outgoing, own) = agree(ctx, local, &phase)?;

        let sends = outgoing
            .iter()
            .map(|(peer, shard)| Ok((*peer, contiguous(shard.view())?)))
            .collect::<Result<Vec<_>, SolverError>>()?;
        comm.send_all(&sends)?;
        log::debug!(
            "Root sent {name} shards to {} participants",
            outgoing.len()
        );
        own
    } else {
        let mut buffer = agree(ctx, try_zeros(geometry.rows, geometry.cols), &phase)?;
        let slice = buffer
            .as_slice_mut()
            .ok_or(SolverError::Layout("shard buffer is not contiguous"))?;
        comm.recv_buffer_into(root, slice)?;
        buffer
    };

    comm.barrier()?;
    Ok(shard)
}

/// `owner`'s rows of `source`, padded with zero rows to the upper bound.
fn padded_shard(
    source: ArrayView2<'_, f64>,
    owner: usize,
    size: usize,
    geometry: ShardGeometry,
) -> Result<Array2<f64>, SolverError> {
    let mut shard = try_zeros(geometry.rows, geometry.cols)?;
    copy_strided_rows(source, owner, size, shard.view_mut());
    Ok(shard)
}

fn contiguous<'a>(view: ArrayView2<'a, f64>) -> Result<&'a [f64], SolverError> {
    view.to_slice()
        .ok_or(SolverError::Layout("shard rows are not contiguous"))
}
