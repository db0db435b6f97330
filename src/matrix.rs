//! Shape-tagged, row-major dense buffers.

use crate::datatype::Scalar;
use crate::error::{Error, Result};

/// Allocate `len` zeroed elements, reporting failure instead of aborting.
pub(crate) fn try_zeroed<T: Scalar>(len: usize, what: &'static str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::Allocation {
        what,
        elements: len,
    })?;
    buf.resize(len, T::default());
    Ok(buf)
}

fn element_count(rows: usize, cols: usize, what: &'static str) -> Result<usize> {
    rows.checked_mul(cols).ok_or(Error::Allocation {
        what,
        elements: usize::MAX,
    })
}

/// Dense M×N matrix stored row-major in a single owned allocation.
///
/// The full matrix lives on the coordinator; each worker's slice of it is
/// also a `Matrix` with fewer rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Scalar> Matrix<T> {
    /// A `rows × cols` matrix of zeros.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the buffer cannot be reserved.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        let len = element_count(rows, cols, "matrix")?;
        Ok(Matrix {
            rows,
            cols,
            data: try_zeroed(len, "matrix")?,
        })
    }

    /// Wrap an existing row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        let expected = element_count(rows, cols, "matrix")?;
        if data.len() != expected {
            return Err(Error::ShapeMismatch {
                what: "matrix elements",
                expected,
                actual: data.len(),
            });
        }
        Ok(Matrix { rows, cols, data })
    }

    /// Build a matrix from `f(row, col)`.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Result<Self> {
        let mut matrix = Self::zeros(rows, cols)?;
        for r in 0..rows {
            for (c, value) in matrix.row_mut(r).iter_mut().enumerate() {
                *value = f(r, c);
            }
        }
        Ok(matrix)
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Row `r` as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `r >= self.rows()`.
    pub fn row(&self, r: usize) -> &[T] {
        assert!(r < self.rows, "row {r} out of bounds ({} rows)", self.rows);
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Row `r` as a mutable slice.
    ///
    /// # Panics
    ///
    /// Panics if `r >= self.rows()`.
    pub fn row_mut(&mut self, r: usize) -> &mut [T] {
        assert!(r < self.rows, "row {r} out of bounds ({} rows)", self.rows);
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Iterate rows in order. Works for zero-width matrices.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.rows).map(move |r| self.row(r))
    }

    /// Copy rows `start..end` into a new matrix.
    pub fn rows_range(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.rows {
            return Err(Error::ShapeMismatch {
                what: "row range end",
                expected: self.rows,
                actual: end,
            });
        }
        let data = self.data[start * self.cols..end * self.cols].to_vec();
        Ok(Matrix {
            rows: end - start,
            cols: self.cols,
            data,
        })
    }

    /// Row-major elements.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable row-major elements.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fn_is_row_major() {
        let m = Matrix::from_fn(2, 3, |r, c| (r * 10 + c) as i32).unwrap();
        assert_eq!(m.as_slice(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(m.row(1), &[10, 11, 12]);
        assert_eq!(m.shape(), (2, 3));
    }

    #[test]
    fn from_vec_checks_length() {
        let err = Matrix::from_vec(2, 2, vec![1.0f64; 3]).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn zero_width_rows_iterate() {
        let m = Matrix::<f64>::zeros(3, 0).unwrap();
        assert_eq!(m.iter_rows().count(), 3);
        assert!(m.iter_rows().all(<[f64]>::is_empty));
    }

    #[test]
    fn rows_range_copies_block() {
        let m = Matrix::from_fn(4, 2, |r, _| r as i64).unwrap();
        let block = m.rows_range(1, 3).unwrap();
        assert_eq!(block.as_slice(), &[1, 1, 2, 2]);
        assert!(m.rows_range(3, 5).is_err());
    }

    #[test]
    fn overflowing_shape_is_an_allocation_error() {
        let err = Matrix::<f32>::zeros(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, Error::Allocation { .. }));
    }
}
