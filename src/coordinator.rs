//! The fixed call sequence every worker runs, with the coordinator's extra
//! duties on the root.
//!
//! ```text
//! plan ─► broadcast x ─► scatter rows ─► multiply slice ─► gather partials
//! ```
//!
//! Each worker plans the distribution table for itself; only the root holds
//! A and x going in and y coming out.

use crate::comm::Collective;
use crate::config::RunConfig;
use crate::datatype::Scalar;
use crate::error::{Error, Result};
use crate::inputs::Inputs;
use crate::kernel::multiply_slice_with;
use crate::partition::DistributionTable;
use crate::transport::{broadcast_vector, gather_partials, scatter_rows};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What the coordinator hands to reporting after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport<T> {
    /// `y = A·x`, in row order
    pub y: Vec<T>,
    /// Wall-clock time from the broadcast to the end of the gather
    pub elapsed: Duration,
    /// The distribution table used
    pub table: DistributionTable,
    /// Group size
    pub workers: i32,
}

/// Compute `y = A·x` across the group.
///
/// Every worker calls this with the same `config`. The root passes
/// `Some(inputs)` and receives `Some(report)`; every other worker passes
/// `None` and receives `None`.
///
/// Any error is fatal to the group: the failing worker aborts it, so peers
/// return [`Error::Aborted`] rather than blocking in a collective.
pub fn run<C: Collective, T: Scalar>(
    comm: &C,
    config: &RunConfig,
    inputs: Option<Inputs<T>>,
) -> Result<Option<RunReport<T>>> {
    let outcome = drive(comm, config, inputs);
    if let Err(err) = &outcome {
        if !matches!(err, Error::Aborted { .. }) {
            error!(rank = comm.rank(), error = %err, "run failed");
            comm.abort(err.exit_code());
        }
    }
    outcome
}

fn drive<C: Collective, T: Scalar>(
    comm: &C,
    config: &RunConfig,
    inputs: Option<Inputs<T>>,
) -> Result<Option<RunReport<T>>> {
    let rank = comm.rank();
    let workers = comm.size();
    config.validate(workers)?;
    let table = DistributionTable::plan(config.rows, workers)?;
    let is_root = comm.is_root(config.root);

    let (matrix, vector) = match (is_root, inputs) {
        (true, Some(inputs)) => {
            let expected = (config.rows, config.cols);
            if inputs.shape() != expected {
                let (what, want, got) = if inputs.shape().0 != expected.0 {
                    ("input rows", expected.0, inputs.shape().0)
                } else {
                    ("input columns", expected.1, inputs.shape().1)
                };
                return Err(Error::ShapeMismatch {
                    what,
                    expected: want,
                    actual: got,
                });
            }
            (Some(inputs.matrix), Some(inputs.vector))
        }
        (true, None) => {
            return Err(Error::Configuration(format!(
                "coordinator rank {rank} was given no inputs"
            )))
        }
        (false, Some(_)) => {
            return Err(Error::Configuration(format!(
                "rank {rank} is not the coordinator but was given inputs"
            )))
        }
        (false, None) => (None, None),
    };

    if is_root {
        if !table.is_even() {
            warn!(
                rows = config.rows,
                workers,
                "row count is not divisible by worker count; shares differ by one row"
            );
        }
        info!(
            rows = config.rows,
            cols = config.cols,
            workers,
            kernel = ?config.kernel,
            "starting distributed multiplication"
        );
    }

    let start = Instant::now();
    let x = broadcast_vector(comm, vector, config.cols, config.root)?;
    let slice = scatter_rows(comm, matrix.as_ref(), &table, config.cols, config.root)?;
    drop(matrix);

    let first_row = table.range(rank).start;
    let partial = multiply_slice_with(config.kernel, &slice, &x).map_err(|err| match err {
        Error::Overflow { row } => Error::Overflow {
            row: first_row + row,
        },
        other => other,
    })?;
    debug!(rank, rows = partial.len(), "local slice multiplied");

    let gathered = gather_partials(comm, &partial, &table, config.root)?;
    let elapsed = start.elapsed();

    Ok(gathered.map(|y| RunReport {
        y,
        elapsed,
        table,
        workers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalGroup;

    fn staircase() -> Inputs<f64> {
        Inputs::from_fn(8, 4, |r, _| (r + 1) as f64, |_| 1.0).unwrap()
    }

    #[test]
    fn uneven_rows_over_three_workers() {
        let config = RunConfig::new(8, 4);
        let reports = LocalGroup::run(3, |comm| {
            let inputs = comm.is_root(0).then(staircase);
            run(comm, &config, inputs)
        })
        .unwrap();

        let report = reports[0].as_ref().unwrap();
        assert_eq!(report.y, vec![4.0, 8.0, 12.0, 16.0, 20.0, 24.0, 28.0, 32.0]);
        assert_eq!(report.table.row_counts(), vec![3, 3, 2]);
        assert_eq!(report.workers, 3);
        assert!(reports[1].is_none() && reports[2].is_none());
    }

    #[test]
    fn root_without_inputs_aborts_everyone() {
        let config = RunConfig::new(8, 4);
        let outcomes = LocalGroup::spawn(3, |comm| run::<_, f64>(comm, &config, None)).unwrap();
        assert!(matches!(outcomes[0], Err(Error::Configuration(_))));
        for outcome in &outcomes[1..] {
            assert!(matches!(outcome, Err(Error::Aborted { origin: 0, .. })));
        }
    }

    #[test]
    fn inputs_on_a_worker_are_rejected() {
        let config = RunConfig::new(8, 4);
        let err = LocalGroup::run(2, |comm| run(comm, &config, Some(staircase()))).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn mis_shaped_inputs_are_rejected() {
        let config = RunConfig::new(8, 5);
        let err = LocalGroup::run(2, |comm| {
            let inputs = comm.is_root(0).then(staircase);
            run(comm, &config, inputs)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                what: "input columns",
                expected: 5,
                actual: 4
            }
        ));
    }

    #[test]
    fn root_outside_group_is_a_configuration_error() {
        let config = RunConfig::new(8, 4).with_root(4);
        let err = LocalGroup::run(2, |comm| run::<_, f64>(comm, &config, None)).unwrap_err();
        assert!(matches!(err, Error::InvalidRank { rank: 4, size: 2 }));
    }

    #[test]
    fn overflow_names_the_global_row() {
        let config = RunConfig::new(4, 2);
        let err = LocalGroup::run(2, |comm| {
            let inputs = comm.is_root(0).then(|| {
                Inputs::from_fn(4, 2, |r, _| if r == 3 { i32::MAX } else { 1 }, |_| 2).unwrap()
            });
            run(comm, &config, inputs)
        })
        .unwrap_err();
        assert!(matches!(err, Error::Overflow { row: 3 }));
        assert_eq!(err.exit_code(), 6);
    }
}
