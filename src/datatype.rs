//! Element types that can be multiplied and moved between workers.
//!
//! [`Scalar`] is a sealed trait mapping the supported Rust primitives to the
//! datatype tags understood by the MPI shim, and carrying the arithmetic the
//! compute kernel needs.
//!
//! | Rust Type | MPI Equivalent  | Tag Value |
//! |-----------|-----------------|-----------|
//! | `f32`     | `MPI_FLOAT`     | 0         |
//! | `f64`     | `MPI_DOUBLE`    | 1         |
//! | `i32`     | `MPI_INT32_T`   | 2         |
//! | `i64`     | `MPI_INT64_T`   | 3         |

use std::fmt::Debug;
use std::ops::{Add, Mul};

mod sealed {
    pub trait Sealed {}
}

/// Tag values matching the C-side `FERROMATVEC_*` defines.
///
/// These discriminants must stay in sync with `csrc/ferromatvec.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DatatypeTag {
    /// 32-bit floating point (`MPI_FLOAT`)
    F32 = 0,
    /// 64-bit floating point (`MPI_DOUBLE`)
    F64 = 1,
    /// 32-bit signed integer (`MPI_INT32_T`)
    I32 = 2,
    /// 64-bit signed integer (`MPI_INT64_T`)
    I64 = 3,
}

/// Numeric element of a matrix or vector.
///
/// This is a **sealed trait**: supported types are [`f32`], [`f64`], [`i32`]
/// and [`i64`]. `Default::default()` is the additive identity for all of them.
pub trait Scalar:
    sealed::Sealed
    + Copy
    + Default
    + PartialEq
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Mul<Output = Self>
{
    /// The datatype tag used for FFI dispatch to the C layer.
    const TAG: DatatypeTag;

    /// `self + a * b`, or `None` if an integer step overflows.
    ///
    /// Floats never fail (they saturate to infinity) and are computed as a
    /// plain multiply then add, not a fused multiply-add.
    fn checked_mul_add(self, a: Self, b: Self) -> Option<Self>;
}

macro_rules! impl_scalar {
    (float $ty:ty, $tag:expr) => {
        impl sealed::Sealed for $ty {}
        impl Scalar for $ty {
            const TAG: DatatypeTag = $tag;

            #[inline]
            fn checked_mul_add(self, a: Self, b: Self) -> Option<Self> {
                Some(self + a * b)
            }
        }
    };
    (int $ty:ty, $tag:expr) => {
        impl sealed::Sealed for $ty {}
        impl Scalar for $ty {
            const TAG: DatatypeTag = $tag;

            #[inline]
            fn checked_mul_add(self, a: Self, b: Self) -> Option<Self> {
                a.checked_mul(b).and_then(|p| self.checked_add(p))
            }
        }
    };
}

impl_scalar!(float f32, DatatypeTag::F32);
impl_scalar!(float f64, DatatypeTag::F64);
impl_scalar!(int i32, DatatypeTag::I32);
impl_scalar!(int i64, DatatypeTag::I64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_c_defines() {
        assert_eq!(f32::TAG as i32, 0); // FERROMATVEC_F32
        assert_eq!(f64::TAG as i32, 1); // FERROMATVEC_F64
        assert_eq!(i32::TAG as i32, 2); // FERROMATVEC_I32
        assert_eq!(i64::TAG as i32, 3); // FERROMATVEC_I64
    }

    #[test]
    fn default_is_additive_identity() {
        fn check<T: Scalar>(one: T) {
            assert_eq!(T::default() + one, one);
            assert_eq!(T::default() * one, T::default());
        }
        check(1.0f32);
        check(1.0f64);
        check(1i32);
        check(1i64);
    }

    #[test]
    fn integer_mul_add_reports_overflow() {
        assert_eq!(3i32.checked_mul_add(4, 5), Some(23));
        assert_eq!(0i32.checked_mul_add(i32::MAX, 2), None);
        assert_eq!(i64::MAX.checked_mul_add(1, 1), None);
        assert_eq!(1.0f64.checked_mul_add(f64::MAX, 2.0), Some(f64::INFINITY));
    }
}
