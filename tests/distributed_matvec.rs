//! End-to-end runs of the coordinator over in-process groups.

use ferromatvec::{
    multiply_sequential, run, Collective, DistributionTable, Error, Inputs, Kernel, LocalGroup,
    RunConfig, RunReport,
};

/// Run `config` on `workers` threads and return the coordinator's report.
fn run_group<T: ferromatvec::Scalar>(
    workers: i32,
    config: &RunConfig,
    inputs: &Inputs<T>,
) -> RunReport<T> {
    let reports = LocalGroup::run(workers, |comm| {
        let mine = comm.is_root(config.root).then(|| inputs.clone());
        run(comm, config, mine)
    })
    .unwrap();

    let mut roots = reports.into_iter().enumerate().filter_map(|(rank, report)| {
        if rank as i32 != config.root {
            assert!(report.is_none(), "rank {rank} produced a report");
        }
        report
    });
    let report = roots.next().expect("coordinator report");
    assert!(roots.next().is_none());
    report
}

#[test]
fn staircase_over_three_workers() {
    let config = RunConfig::new(8, 4);
    let inputs = Inputs::from_fn(8, 4, |r, _| (r + 1) as f64, |_| 1.0).unwrap();
    let report = run_group(3, &config, &inputs);

    assert_eq!(report.y, vec![4.0, 8.0, 12.0, 16.0, 20.0, 24.0, 28.0, 32.0]);
    assert_eq!(report.table.row_counts(), vec![3, 3, 2]);
    assert_eq!(report.table.row_offsets(), vec![0, 3, 6]);
    assert_eq!(report.table.gather_layout().unwrap().displs, vec![0, 3, 6]);
    assert_eq!(report.table.scatter_layout(4).unwrap().counts, vec![12, 12, 8]);
}

#[test]
fn empty_matrix_gives_empty_result() {
    let config = RunConfig::new(0, 4);
    let inputs = Inputs::<f64>::from_fn(0, 4, |_, _| 1.0, |_| 1.0).unwrap();
    let report = run_group(3, &config, &inputs);
    assert!(report.y.is_empty());
    assert_eq!(report.table.row_counts(), vec![0, 0, 0]);
}

#[test]
fn single_worker_matches_sequential() {
    let config = RunConfig::new(23, 11);
    let inputs = Inputs::random(23, 11, 5).unwrap();
    let report = run_group(1, &config, &inputs);
    let expected = multiply_sequential(&inputs.matrix, &inputs.vector).unwrap();
    assert_eq!(report.y, expected);
}

#[test]
fn result_does_not_depend_on_worker_count() {
    let config = RunConfig::new(41, 13);
    let inputs = Inputs::random(41, 13, 2024).unwrap();
    let expected = multiply_sequential(&inputs.matrix, &inputs.vector).unwrap();
    for workers in [1, 2, 5, 7] {
        let report = run_group(workers, &config, &inputs);
        assert_eq!(report.y, expected, "P = {workers}");
        assert_eq!(report.workers, workers);
    }
}

#[test]
fn more_workers_than_rows() {
    let config = RunConfig::new(3, 2);
    let inputs = Inputs::from_fn(3, 2, |r, c| (r * 10 + c) as i64, |c| c as i64 + 1).unwrap();
    let report = run_group(5, &config, &inputs);
    assert_eq!(report.y, vec![2, 32, 62]);
    assert_eq!(report.table.row_counts(), vec![1, 1, 1, 0, 0]);
}

#[test]
fn coordinator_need_not_be_rank_zero() {
    let config = RunConfig::new(10, 3).with_root(2);
    let inputs = Inputs::from_fn(10, 3, |r, c| (r + c) as i32, |_| 2).unwrap();
    let report = run_group(4, &config, &inputs);
    let expected: Vec<i32> = (0..10).map(|r| 2 * (3 * r + 3)).collect();
    assert_eq!(report.y, expected);
}

#[test]
fn threaded_kernel_inside_the_group() {
    let config = RunConfig::new(64, 48).with_kernel(Kernel::Threaded { threads: 3 });
    let inputs = Inputs::random(64, 48, 11).unwrap();
    let report = run_group(3, &config, &inputs);
    let expected = multiply_sequential(&inputs.matrix, &inputs.vector).unwrap();
    assert_eq!(report.y, expected);
}

#[test]
fn single_precision_values() {
    let config = RunConfig::new(6, 2);
    let inputs = Inputs::from_fn(6, 2, |r, _| r as f32, |_| 0.5f32).unwrap();
    let report = run_group(4, &config, &inputs);
    assert_eq!(report.y, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn configuration_from_toml_drives_a_run() {
    let config = RunConfig::from_toml_str(
        r#"
        rows = 12
        cols = 5
        root = 1

        [kernel]
        strategy = "threaded"
        threads = 2
        "#,
    )
    .unwrap();
    let inputs = Inputs::from_fn(12, 5, |r, _| r as i64, |_| 1).unwrap();
    let report = run_group(3, &config, &inputs);
    let expected: Vec<i64> = (0..12).map(|r| 5 * r).collect();
    assert_eq!(report.y, expected);
}

#[test]
fn failing_worker_aborts_coordinator() {
    let config = RunConfig::new(9, 3);
    let outcomes = LocalGroup::spawn(3, |comm| {
        if comm.rank() == 2 {
            return Err(Error::Communication("peer lost".to_string()));
        }
        let inputs = comm
            .is_root(0)
            .then(|| Inputs::<f64>::from_fn(9, 3, |_, _| 1.0, |_| 1.0))
            .transpose()?;
        run(comm, &config, inputs)
    })
    .unwrap();

    assert!(matches!(outcomes[2], Err(Error::Communication(_))));
    assert!(matches!(outcomes[0], Err(Error::Aborted { origin: 2, .. })));
}

#[test]
fn group_size_must_match_table() {
    let table = DistributionTable::plan(8, 2).unwrap();
    let err = LocalGroup::run(3, |comm| {
        ferromatvec::gather_partials(comm, &[0.0f64; 3], &table, 0)
    })
    .unwrap_err();
    assert!(matches!(err, Error::GroupSizeMismatch { table: 2, group: 3 }));
}

#[test]
fn integer_overflow_is_reported_not_panicked() {
    let config = RunConfig::new(2, 2);
    let err = LocalGroup::run(2, |comm| {
        let inputs = comm
            .is_root(0)
            .then(|| Inputs::from_fn(2, 2, |_, _| i32::MAX, |_| 2))
            .transpose()?;
        run(comm, &config, inputs)
    })
    .unwrap_err();
    assert!(matches!(err, Error::Overflow { .. }), "{err}");
    assert_eq!(err.category(), ferromatvec::ErrorCategory::Arithmetic);
}
