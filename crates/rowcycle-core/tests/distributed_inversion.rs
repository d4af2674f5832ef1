//! End-to-end distributed inversion over in-process clusters.

use std::sync::Arc;

use ndarray::{array, Array2};
use rowcycle_compute::{ClusterContext, ContextError, LocalCluster, SerialBackend};
use rowcycle_core::matrix::{approx_eq, diagonally_dominant, dot, identity, max_abs_diff};
use rowcycle_core::{
    invert_distributed, invert_on_local_cluster, invert_serial, DistributedSolver, SolverError,
};

const GROUP_SIZES: [usize; 4] = [2, 3, 5, 7];
const ORDERS: [usize; 3] = [3, 8, 17];

#[test]
fn test_matches_serial_reference() {
    let solver = DistributedSolver::default();
    for &order in &ORDERS {
        let matrix = diagonally_dominant(order, order as u64);
        let reference = invert_serial(matrix.view()).unwrap();
        for &size in &GROUP_SIZES {
            let inverse = invert_on_local_cluster(&matrix, size, &solver).unwrap();
            let diff = max_abs_diff(inverse.view(), reference.view()).unwrap();
            assert!(
                approx_eq(inverse.view(), reference.view()),
                "order {order}, {size} participants: max difference {diff:e}"
            );
        }
    }
}

#[test]
fn test_identity_is_its_own_inverse() {
    let solver = DistributedSolver::default();
    for &order in &[1, 4, 9] {
        let inverse = invert_on_local_cluster(&identity(order), 3, &solver).unwrap();
        assert!(approx_eq(inverse.view(), identity(order).view()));
    }
}

#[test]
fn test_known_four_by_four_recovers_identity() {
    let matrix = array![
        [5.0, 1.0, 0.0, 2.0],
        [1.0, 6.0, 1.0, 0.0],
        [0.0, 2.0, 7.0, 1.0],
        [2.0, 0.0, 1.0, 8.0]
    ];
    let inverse = invert_on_local_cluster(&matrix, 2, &DistributedSolver::default()).unwrap();
    let product = dot(matrix.view(), inverse.view()).unwrap();
    assert!(approx_eq(product.view(), identity(4).view()));
}

#[test]
fn test_singular_input_aborts_every_participant() {
    let matrix = array![[1.0, 2.0], [2.0, 4.0]];
    let solver = DistributedSolver::default();
    let results = LocalCluster::new(2)
        .run(|comm| -> Result<Option<Array2<f64>>, SolverError> {
            let ctx = ClusterContext::join(comm)?;
            invert_distributed(&ctx, ctx.is_root().then(|| matrix.clone()), &solver)
        })
        .unwrap();

    // Step 1 is owned by participant 1, which detects the zero pivot.
    match &results[1] {
        Err(SolverError::SingularPivot { step, value }) => {
            assert_eq!(*step, 1);
            assert!(value.abs() < 1e-12);
        }
        other => panic!("expected a singular pivot, got {other:?}"),
    }
    assert!(matches!(&results[0], Err(e) if e.is_peer_abort()));

    assert!(matches!(
        invert_on_local_cluster(&matrix, 2, &solver),
        Err(SolverError::SingularPivot { step: 1, .. })
    ));
}

#[test]
fn test_tolerance_is_configurable() {
    let matrix = array![[1e-7, 1.0], [1.0, 1.0]];
    assert!(matches!(
        invert_on_local_cluster(&matrix, 2, &DistributedSolver::default()),
        Err(SolverError::SingularPivot { step: 0, .. })
    ));

    let relaxed = DistributedSolver::default().with_tolerance(1e-9).unwrap();
    let inverse = invert_on_local_cluster(&matrix, 2, &relaxed).unwrap();
    let product = dot(matrix.view(), inverse.view()).unwrap();
    assert!(approx_eq(product.view(), identity(2).view()));
}

#[test]
fn test_more_participants_than_rows() {
    let matrix = diagonally_dominant(3, 21);
    let reference = invert_serial(matrix.view()).unwrap();
    let inverse = invert_on_local_cluster(&matrix, 7, &DistributedSolver::default()).unwrap();
    assert!(approx_eq(inverse.view(), reference.view()));
}

#[test]
fn test_non_square_input_is_rejected() {
    let matrix = Array2::<f64>::zeros((3, 4));
    assert!(matches!(
        invert_on_local_cluster(&matrix, 3, &DistributedSolver::default()),
        Err(SolverError::NotSquare { rows: 3, cols: 4 })
    ));
}

#[test]
fn test_groups_below_two_are_rejected() {
    let matrix = identity(2);
    for participants in [0, 1] {
        match invert_on_local_cluster(&matrix, participants, &DistributedSolver::default()) {
            Err(SolverError::Cluster(ContextError::GroupTooSmall { size })) => {
                assert_eq!(size, participants)
            }
            other => panic!("{participants} participant(s): unexpected {other:?}"),
        }
    }
}

#[test]
fn test_explicit_serial_backend() {
    let solver = DistributedSolver::new(Arc::new(SerialBackend));
    let matrix = diagonally_dominant(10, 4);
    let inverse = invert_on_local_cluster(&matrix, 4, &solver).unwrap();
    let product = dot(matrix.view(), inverse.view()).unwrap();
    assert!(approx_eq(product.view(), identity(10).view()));
}

#[cfg(feature = "cpu")]
#[test]
fn test_thread_pool_backend_matches_serial() {
    use rowcycle_compute::CpuBackend;

    let matrix = diagonally_dominant(17, 8);
    let serial = invert_on_local_cluster(&matrix, 3, &DistributedSolver::default()).unwrap();
    let backend = CpuBackend::with_threads(2).unwrap();
    let parallel =
        invert_on_local_cluster(&matrix, 3, &DistributedSolver::new(Arc::new(backend))).unwrap();
    assert_eq!(parallel, serial);
}
