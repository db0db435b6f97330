//! Matrix-aware collectives: broadcast the vector, scatter rows, gather
//! partial results.
//!
//! All three take the same [`DistributionTable`]. Row scatter uses
//! `rows × N` element blocks, result gather uses `rows × 1`, both projected
//! from the table's shares so each rank's rows land back where they came
//! from.

use crate::comm::{check_root, Collective};
use crate::datatype::Scalar;
use crate::error::{Error, Result};
use crate::matrix::{try_zeroed, Matrix};
use crate::partition::{DistributionTable, Share};
use tracing::debug;

fn own_share<C: Collective>(comm: &C, table: &DistributionTable) -> Result<Share> {
    if table.workers() != comm.size() as usize {
        return Err(Error::GroupSizeMismatch {
            table: table.workers(),
            group: comm.size(),
        });
    }
    table.share(comm.rank()).ok_or(Error::InvalidRank {
        rank: comm.rank(),
        size: comm.size(),
    })
}

/// Replicate the root's vector on every worker.
///
/// The root passes `Some(x)` with `x.len() == len`; other workers pass
/// `None` (a value passed by a non-root worker is discarded). Every worker
/// returns the root's `x`.
pub fn broadcast_vector<C: Collective, T: Scalar>(
    comm: &C,
    x: Option<Vec<T>>,
    len: usize,
    root: i32,
) -> Result<Vec<T>> {
    check_root(root, comm.size())?;
    let mut buf = match x {
        Some(x) if comm.is_root(root) => {
            if x.len() != len {
                return Err(Error::ShapeMismatch {
                    what: "broadcast vector",
                    expected: len,
                    actual: x.len(),
                });
            }
            x
        }
        None if comm.is_root(root) => {
            return Err(Error::Configuration(format!(
                "root rank {root} has no vector to broadcast"
            )))
        }
        _ => try_zeroed(len, "shared vector")?,
    };
    comm.broadcast(&mut buf, root)?;
    debug!(rank = comm.rank(), len, "vector broadcast complete");
    Ok(buf)
}

/// Deliver each worker its rows of the root's matrix.
///
/// The root passes `Some(&a)` where `a` is `table.total_rows() × cols`;
/// other workers pass `None`. Worker `i` returns a
/// `table.shares()[i].rows × cols` matrix holding those rows in order.
pub fn scatter_rows<C: Collective, T: Scalar>(
    comm: &C,
    full: Option<&Matrix<T>>,
    table: &DistributionTable,
    cols: usize,
    root: i32,
) -> Result<Matrix<T>> {
    check_root(root, comm.size())?;
    let share = own_share(comm, table)?;
    let layout = table.scatter_layout(cols)?;

    let send: &[T] = if comm.is_root(root) {
        let full = full.ok_or_else(|| {
            Error::Configuration(format!("root rank {root} has no matrix to scatter"))
        })?;
        if full.rows() != table.total_rows() {
            return Err(Error::ShapeMismatch {
                what: "scattered matrix rows",
                expected: table.total_rows(),
                actual: full.rows(),
            });
        }
        if full.cols() != cols {
            return Err(Error::ShapeMismatch {
                what: "scattered matrix columns",
                expected: cols,
                actual: full.cols(),
            });
        }
        full.as_slice()
    } else {
        &[]
    };

    let mut slice = Matrix::zeros(share.rows, cols)?;
    comm.scatterv(
        send,
        &layout.counts,
        &layout.displs,
        slice.as_mut_slice(),
        root,
    )?;
    debug!(
        rank = comm.rank(),
        rows = share.rows,
        first_row = share.offset,
        "rows scattered"
    );
    Ok(slice)
}

/// Reassemble the partial results at the root, in global row order.
///
/// Every worker passes its `partial` (one scalar per owned row). Returns
/// `Some(y)` with `y.len() == table.total_rows()` at the root and `None`
/// elsewhere.
pub fn gather_partials<C: Collective, T: Scalar>(
    comm: &C,
    partial: &[T],
    table: &DistributionTable,
    root: i32,
) -> Result<Option<Vec<T>>> {
    check_root(root, comm.size())?;
    let share = own_share(comm, table)?;
    if partial.len() != share.rows {
        return Err(Error::ShapeMismatch {
            what: "partial result",
            expected: share.rows,
            actual: partial.len(),
        });
    }
    let layout = table.gather_layout()?;

    if comm.is_root(root) {
        let mut y = try_zeroed(table.total_rows(), "result vector")?;
        comm.gatherv(partial, &mut y, &layout.counts, &layout.displs, root)?;
        debug!(rank = comm.rank(), rows = y.len(), "partials gathered");
        Ok(Some(y))
    } else {
        comm.gatherv(partial, &mut [], &layout.counts, &layout.displs, root)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalGroup;

    #[test]
    fn rows_arrive_in_original_order() {
        let table = DistributionTable::plan(7, 3).unwrap();
        let a = Matrix::from_fn(7, 2, |r, c| (r * 100 + c) as i64).unwrap();

        let slices = LocalGroup::run(3, |comm| {
            let full = comm.is_root(0).then_some(&a);
            scatter_rows(comm, full, &table, 2, 0)
        })
        .unwrap();

        for (rank, slice) in slices.iter().enumerate() {
            let range = table.range(rank as i32);
            let expected = a.rows_range(range.start, range.end).unwrap();
            assert_eq!(slice, &expected, "rank {rank}");
        }
    }

    #[test]
    fn gather_places_partials_by_offset() {
        let table = DistributionTable::plan(5, 2).unwrap();
        let results = LocalGroup::run(2, |comm| {
            let range = table.range(comm.rank());
            let partial: Vec<f32> = range.map(|r| r as f32 * 0.5).collect();
            gather_partials(comm, &partial, &table, 1)
        })
        .unwrap();

        assert_eq!(results[0], None);
        assert_eq!(results[1], Some(vec![0.0, 0.5, 1.0, 1.5, 2.0]));
    }

    #[test]
    fn broadcast_discards_non_root_values() {
        let results = LocalGroup::run(3, |comm| {
            let x = if comm.is_root(0) {
                Some(vec![1.0, 2.0])
            } else {
                Some(vec![9.0, 9.0])
            };
            broadcast_vector(comm, x, 2, 0)
        })
        .unwrap();
        assert!(results.iter().all(|x| x == &vec![1.0f64, 2.0]));
    }

    #[test]
    fn table_for_another_group_size_is_rejected() {
        let table = DistributionTable::plan(6, 3).unwrap();
        let err = LocalGroup::run(2, |comm| {
            gather_partials(comm, &[0.0f64; 3], &table, 0)
        })
        .unwrap_err();
        assert!(matches!(err, Error::GroupSizeMismatch { table: 3, group: 2 }));
    }

    #[test]
    fn wrong_partial_length_is_rejected() {
        let table = DistributionTable::plan(4, 1).unwrap();
        let err = LocalGroup::run(1, |comm| gather_partials(comm, &[1i32; 3], &table, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                what: "partial result",
                expected: 4,
                actual: 3
            }
        ));
    }
}
