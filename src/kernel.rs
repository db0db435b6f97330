//! Local compute kernel: one worker's rows times the shared vector.
//!
//! Every row is reduced by exactly one thread, left to right, starting from
//! zero. A row's result therefore depends only on its own elements and `x`,
//! never on how many workers or threads took part.

use crate::datatype::Scalar;
use crate::error::{Error, Result};
use crate::matrix::{try_zeroed, Matrix};
use rayon::prelude::*;
use serde::Deserialize;

/// Execution strategy for the local kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Kernel {
    /// One thread, rows in order
    #[default]
    Sequential,
    /// Rows spread over a rayon pool; `threads == 0` uses the global pool
    Threaded {
        /// Pool size
        #[serde(default)]
        threads: usize,
    },
}

/// Left-to-right dot product; `None` on integer overflow.
fn dot<T: Scalar>(row: &[T], x: &[T]) -> Option<T> {
    row.iter()
        .zip(x)
        .try_fold(T::default(), |acc, (&a, &b)| acc.checked_mul_add(a, b))
}

fn check_width<T: Scalar>(slice: &Matrix<T>, x: &[T]) -> Result<()> {
    if slice.cols() != x.len() {
        return Err(Error::ShapeMismatch {
            what: "vector length",
            expected: slice.cols(),
            actual: x.len(),
        });
    }
    Ok(())
}

/// `partial[r] = Σ_j slice[r][j] * x[j]` on the calling thread.
///
/// # Errors
///
/// [`Error::Overflow`] with the slice-local row index if an integer row
/// overflows.
pub fn multiply_slice<T: Scalar>(slice: &Matrix<T>, x: &[T]) -> Result<Vec<T>> {
    check_width(slice, x)?;
    let mut partial = try_zeroed(slice.rows(), "partial result")?;
    for (r, (out, row)) in partial.iter_mut().zip(slice.iter_rows()).enumerate() {
        *out = dot(row, x).ok_or(Error::Overflow { row: r })?;
    }
    Ok(partial)
}

/// Same result as [`multiply_slice`], rows computed in parallel.
///
/// If several rows overflow, the reported row is whichever a pool thread
/// hit first.
pub fn multiply_slice_threaded<T: Scalar>(
    slice: &Matrix<T>,
    x: &[T],
    threads: usize,
) -> Result<Vec<T>> {
    check_width(slice, x)?;
    let mut partial = try_zeroed(slice.rows(), "partial result")?;
    let fill = |partial: &mut [T]| -> std::result::Result<(), usize> {
        partial
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(r, out)| {
                *out = dot(slice.row(r), x).ok_or(r)?;
                Ok(())
            })
    };
    let filled = if threads == 0 {
        fill(partial.as_mut_slice())
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build kernel thread pool: {e}")))?;
        pool.install(|| fill(partial.as_mut_slice()))
    };
    filled.map_err(|row| Error::Overflow { row })?;
    Ok(partial)
}

/// Run the kernel with the given strategy.
pub fn multiply_slice_with<T: Scalar>(kernel: Kernel, slice: &Matrix<T>, x: &[T]) -> Result<Vec<T>> {
    match kernel {
        Kernel::Sequential => multiply_slice(slice, x),
        Kernel::Threaded { threads } => multiply_slice_threaded(slice, x, threads),
    }
}

/// Whole-matrix product with no communication; the reference result.
pub fn multiply_sequential<T: Scalar>(a: &Matrix<T>, x: &[T]) -> Result<Vec<T>> {
    multiply_slice(a, x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn rows_are_dot_products() {
        let a = Matrix::from_vec(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let y = multiply_slice(&a, &[1, 0, -1]).unwrap();
        assert_eq!(y, vec![-2, -2]);
    }

    #[test]
    fn width_mismatch_is_reported() {
        let a = Matrix::<f64>::zeros(2, 3).unwrap();
        let err = multiply_slice(&a, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
        assert!(multiply_slice_threaded(&a, &[0.0; 4], 2).is_err());
    }

    #[test]
    fn empty_inputs() {
        let no_rows = Matrix::<f64>::zeros(0, 4).unwrap();
        assert!(multiply_slice(&no_rows, &[1.0; 4]).unwrap().is_empty());

        let no_cols = Matrix::<f64>::zeros(3, 0).unwrap();
        assert_eq!(multiply_slice(&no_cols, &[]).unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn threaded_matches_sequential_bitwise() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let a = Matrix::<f64>::from_fn(97, 33, |_, _| rng.random_range(-1.0..1.0)).unwrap();
        let x: Vec<f64> = (0..33).map(|_| rng.random_range(-1.0..1.0)).collect();

        let expected = multiply_sequential(&a, &x).unwrap();
        for threads in [0, 1, 3, 8] {
            let y = multiply_slice_with(Kernel::Threaded { threads }, &a, &x).unwrap();
            let same = y
                .iter()
                .zip(&expected)
                .all(|(p, q)| p.to_bits() == q.to_bits());
            assert!(same, "threads={threads} changed a row result");
        }
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let a = Matrix::from_vec(2, 2, vec![1, 1, i32::MAX, i32::MAX]).unwrap();
        let x = [2, 2];
        assert!(matches!(
            multiply_slice(&a, &x),
            Err(Error::Overflow { row: 1 })
        ));
        for threads in [0, 2] {
            assert!(matches!(
                multiply_slice_threaded(&a, &x, threads),
                Err(Error::Overflow { row: 1 })
            ));
        }

        // Sums that only overflow on the final add are caught as well
        let a = Matrix::from_vec(1, 2, vec![i64::MAX, 1]).unwrap();
        assert!(matches!(
            multiply_sequential(&a, &[1, 1]),
            Err(Error::Overflow { row: 0 })
        ));
    }
}
