//! The coordinator's operands and their generator.

use crate::datatype::Scalar;
use crate::error::{Error, Result};
use crate::matrix::Matrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Offset between the matrix seed and the vector seed.
const VECTOR_SEED_OFFSET: u64 = 999;

/// Matrix A and vector x, held only by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs<T> {
    /// The full M×N matrix
    pub matrix: Matrix<T>,
    /// The length-N vector
    pub vector: Vec<T>,
}

impl<T: Scalar> Inputs<T> {
    /// Pair a matrix with a vector.
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] if `vector.len() != matrix.cols()`.
    pub fn new(matrix: Matrix<T>, vector: Vec<T>) -> Result<Self> {
        if vector.len() != matrix.cols() {
            return Err(Error::ShapeMismatch {
                what: "vector length",
                expected: matrix.cols(),
                actual: vector.len(),
            });
        }
        Ok(Inputs { matrix, vector })
    }

    /// Build inputs from element functions: `a(row, col)` and `x(col)`.
    pub fn from_fn(
        rows: usize,
        cols: usize,
        a: impl FnMut(usize, usize) -> T,
        x: impl FnMut(usize) -> T,
    ) -> Result<Self> {
        let matrix = Matrix::from_fn(rows, cols, a)?;
        let vector = (0..cols).map(x).collect();
        Self::new(matrix, vector)
    }

    /// `(rows, cols)` of the matrix.
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }
}

impl Inputs<f64> {
    /// Uniform random inputs in `[0, 1)`.
    ///
    /// The matrix is drawn from `seed` and the vector from `seed + 999`, so
    /// one seed reproduces both operands on any machine.
    pub fn random(rows: usize, cols: usize, seed: u64) -> Result<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let matrix = Matrix::from_fn(rows, cols, |_, _| rng.random_range(0.0..1.0))?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(VECTOR_SEED_OFFSET));
        let vector = (0..cols).map(|_| rng.random_range(0.0..1.0)).collect();
        Self::new(matrix, vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_inputs_are_reproducible() {
        let a = Inputs::random(5, 3, 42).unwrap();
        let b = Inputs::random(5, 3, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.shape(), (5, 3));
        assert!(a
            .matrix
            .as_slice()
            .iter()
            .chain(&a.vector)
            .all(|v| (0.0..1.0).contains(v)));

        let c = Inputs::random(5, 3, 43).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn vector_must_match_columns() {
        let matrix = Matrix::<i32>::zeros(2, 3).unwrap();
        let err = Inputs::new(matrix, vec![1, 2]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn from_fn_builds_both_operands() {
        let inputs = Inputs::from_fn(3, 2, |r, _| (r + 1) as i64, |c| c as i64).unwrap();
        assert_eq!(inputs.matrix.as_slice(), &[1, 1, 2, 2, 3, 3]);
        assert_eq!(inputs.vector, vec![0, 1]);
    }
}
