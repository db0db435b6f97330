//! Row partitioning across workers.
//!
//! A [`DistributionTable`] assigns every row of an M×N matrix to exactly one
//! rank. Ranks below `M % P` receive one extra row, so no two workers differ
//! by more than one row. Each share is a closed-form function of
//! `(M, P, rank)`: every worker can plan locally and arrive at the same table
//! without exchanging it.
//!
//! The element layouts handed to the v-collectives are projections of the
//! table: rows × N elements for the matrix scatter, rows × 1 for the result
//! gather. Both come from [`DistributionTable::layout`], so the scatter and
//! gather offsets cannot drift apart.
//!
//! ```
//! use ferromatvec::DistributionTable;
//!
//! let table = DistributionTable::plan(8, 3).unwrap();
//! assert_eq!(table.row_counts(), vec![3, 3, 2]);
//! assert_eq!(table.row_offsets(), vec![0, 3, 6]);
//!
//! let scatter = table.scatter_layout(4).unwrap();
//! assert_eq!(scatter.counts, vec![12, 12, 8]);
//! assert_eq!(scatter.displs, vec![0, 12, 24]);
//!
//! let gather = table.gather_layout().unwrap();
//! assert_eq!(gather.displs, vec![0, 3, 6]);
//! ```

use crate::error::{Error, Result};
use std::ops::Range;

/// One rank's contiguous block of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    /// Number of rows owned by the rank
    pub rows: usize,
    /// Index of the first owned row
    pub offset: usize,
}

impl Share {
    /// Global row indices covered by this share.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.rows
    }
}

/// Number of rows rank `rank` owns when `rows` are split over `workers`.
///
/// `workers` must be non-zero.
pub fn rows_for(rows: usize, workers: usize, rank: usize) -> usize {
    let base = rows / workers;
    let remainder = rows % workers;
    if rank < remainder {
        base + 1
    } else {
        base
    }
}

/// First row owned by rank `rank`; `rank * base + min(rank, remainder)`.
fn offset_for(rows: usize, workers: usize, rank: usize) -> usize {
    let base = rows / workers;
    let remainder = rows % workers;
    rank * base + rank.min(remainder)
}

/// Per-rank element counts and displacements for a v-collective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Elements sent to or received from each rank
    pub counts: Vec<i32>,
    /// Offset of each rank's block in the full buffer
    pub displs: Vec<i32>,
}

impl Layout {
    /// Total number of elements covered by the layout.
    pub fn total(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }
}

/// Assignment of rows `[0, M)` to ranks `0..P`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionTable {
    total_rows: usize,
    shares: Vec<Share>,
}

impl DistributionTable {
    /// Plan the split of `rows` rows over `workers` ranks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `workers <= 0`.
    pub fn plan(rows: usize, workers: i32) -> Result<Self> {
        if workers <= 0 {
            return Err(Error::Configuration(format!(
                "worker count must be at least 1, got {workers}"
            )));
        }
        let workers = workers as usize;
        let shares = (0..workers)
            .map(|rank| Share {
                rows: rows_for(rows, workers, rank),
                offset: offset_for(rows, workers, rank),
            })
            .collect();
        Ok(DistributionTable {
            total_rows: rows,
            shares,
        })
    }

    /// Total number of rows (M).
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Number of ranks the table was planned for (P).
    pub fn workers(&self) -> usize {
        self.shares.len()
    }

    /// All shares, ordered by rank.
    pub fn shares(&self) -> &[Share] {
        &self.shares
    }

    /// Share of `rank`, or `None` if the rank is outside the table.
    pub fn share(&self, rank: i32) -> Option<Share> {
        usize::try_from(rank)
            .ok()
            .and_then(|r| self.shares.get(r).copied())
    }

    /// Row range owned by `rank` (empty for ranks outside the table).
    pub fn range(&self, rank: i32) -> Range<usize> {
        self.share(rank).map_or(0..0, |s| s.range())
    }

    /// Row counts, ordered by rank.
    pub fn row_counts(&self) -> Vec<usize> {
        self.shares.iter().map(|s| s.rows).collect()
    }

    /// Row offsets, ordered by rank.
    pub fn row_offsets(&self) -> Vec<usize> {
        self.shares.iter().map(|s| s.offset).collect()
    }

    /// Rank owning global row `row`, or `None` if `row >= M`.
    pub fn owner_of(&self, row: usize) -> Option<i32> {
        if row >= self.total_rows {
            return None;
        }
        let workers = self.workers();
        let base = self.total_rows / workers;
        let remainder = self.total_rows % workers;
        let wide = remainder * (base + 1);
        let rank = if row < wide {
            row / (base + 1)
        } else {
            remainder + (row - wide) / base
        };
        Some(rank as i32)
    }

    /// Whether every rank owns the same number of rows.
    pub fn is_even(&self) -> bool {
        self.total_rows % self.workers() == 0
    }

    /// Largest share.
    pub fn max_rows(&self) -> usize {
        self.shares.iter().map(|s| s.rows).max().unwrap_or(0)
    }

    /// Smallest share.
    pub fn min_rows(&self) -> usize {
        self.shares.iter().map(|s| s.rows).min().unwrap_or(0)
    }

    /// Element layout for scattering an M×`cols` row-major matrix.
    pub fn scatter_layout(&self, cols: usize) -> Result<Layout> {
        self.layout(cols)
    }

    /// Element layout for gathering one scalar per row.
    pub fn gather_layout(&self) -> Result<Layout> {
        self.layout(1)
    }

    /// Layout where every row contributes `width` elements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a count or displacement does not
    /// fit the `i32` counts used by the collectives.
    pub fn layout(&self, width: usize) -> Result<Layout> {
        let to_i32 = |rows: usize| -> Result<i32> {
            rows.checked_mul(width)
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "{rows} rows of width {width} exceed the collective count limit"
                    ))
                })
        };
        let mut counts = Vec::with_capacity(self.shares.len());
        let mut displs = Vec::with_capacity(self.shares.len());
        for share in &self.shares {
            counts.push(to_i32(share.rows)?);
            displs.push(to_i32(share.offset)?);
        }
        // The last block must also end inside i32 range.
        to_i32(self.total_rows)?;
        Ok(Layout { counts, displs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn uneven_split_matches_worked_example() {
        let table = DistributionTable::plan(8, 3).unwrap();
        assert_eq!(table.row_counts(), vec![3, 3, 2]);
        assert_eq!(table.row_offsets(), vec![0, 3, 6]);
        assert!(!table.is_even());

        let gather = table.gather_layout().unwrap();
        assert_eq!(gather.counts, vec![3, 3, 2]);
        assert_eq!(gather.displs, vec![0, 3, 6]);

        let scatter = table.scatter_layout(4).unwrap();
        assert_eq!(scatter.counts, vec![12, 12, 8]);
        assert_eq!(scatter.displs, vec![0, 12, 24]);
        assert_eq!(scatter.total(), 32);
    }

    #[test]
    fn zero_rows_gives_empty_shares() {
        let table = DistributionTable::plan(0, 4).unwrap();
        assert_eq!(table.row_counts(), vec![0, 0, 0, 0]);
        assert_eq!(table.row_offsets(), vec![0, 0, 0, 0]);
        assert!(table.is_even());
        assert_eq!(table.owner_of(0), None);
        assert_eq!(table.gather_layout().unwrap().total(), 0);
    }

    #[test]
    fn single_worker_owns_everything() {
        let table = DistributionTable::plan(17, 1).unwrap();
        assert_eq!(table.shares(), &[Share { rows: 17, offset: 0 }]);
        assert_eq!(table.range(0), 0..17);
        assert_eq!(table.owner_of(16), Some(0));
    }

    #[test]
    fn more_workers_than_rows() {
        let table = DistributionTable::plan(3, 5).unwrap();
        assert_eq!(table.row_counts(), vec![1, 1, 1, 0, 0]);
        assert_eq!(table.row_offsets(), vec![0, 1, 2, 3, 3]);
        assert_eq!(table.range(4), 3..3);
        assert_eq!(table.owner_of(2), Some(2));
    }

    #[test]
    fn non_positive_worker_count_is_rejected() {
        for workers in [0, -1, i32::MIN] {
            let err = DistributionTable::plan(10, workers).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{err}");
        }
    }

    #[test]
    fn out_of_table_rank_has_no_share() {
        let table = DistributionTable::plan(10, 2).unwrap();
        assert_eq!(table.share(2), None);
        assert_eq!(table.share(-1), None);
        assert_eq!(table.range(7), 0..0);
    }

    #[test]
    fn oversized_layout_is_rejected() {
        let table = DistributionTable::plan(1 << 20, 2).unwrap();
        assert!(table.gather_layout().is_ok());
        let err = table.scatter_layout(1 << 12).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    proptest! {
        #[test]
        fn shares_partition_all_rows(rows in 0usize..5000, workers in 1i32..64) {
            let table = DistributionTable::plan(rows, workers).unwrap();
            prop_assert_eq!(table.workers(), workers as usize);
            prop_assert_eq!(table.row_counts().iter().sum::<usize>(), rows);

            let mut next = 0;
            for share in table.shares() {
                prop_assert_eq!(share.offset, next);
                next += share.rows;
            }
            prop_assert_eq!(next, rows);
        }

        #[test]
        fn imbalance_is_at_most_one_row(rows in 0usize..5000, workers in 1i32..64) {
            let table = DistributionTable::plan(rows, workers).unwrap();
            prop_assert!(table.max_rows() - table.min_rows() <= 1);
        }

        #[test]
        fn owner_agrees_with_ranges(rows in 1usize..2000, workers in 1i32..40) {
            let table = DistributionTable::plan(rows, workers).unwrap();
            for row in 0..rows {
                let owner = table.owner_of(row).unwrap();
                prop_assert!(table.range(owner).contains(&row));
            }
        }

        #[test]
        fn layouts_scale_the_same_shares(rows in 0usize..2000, workers in 1i32..32, cols in 0usize..64) {
            let table = DistributionTable::plan(rows, workers).unwrap();
            let scatter = table.scatter_layout(cols).unwrap();
            let gather = table.gather_layout().unwrap();
            for rank in 0..workers as usize {
                prop_assert_eq!(scatter.counts[rank] as usize, gather.counts[rank] as usize * cols);
                prop_assert_eq!(scatter.displs[rank] as usize, gather.displs[rank] as usize * cols);
            }
        }
    }
}
