//! # ferromatvec
//!
//! Distributed dense matrix-vector multiplication, `y = A·x`, over a group
//! of cooperating workers that share no memory and talk only through
//! collectives.
//!
//! The crate provides:
//! - A partition planner that splits M rows over P workers with at most one
//!   row of imbalance, as a pure function every worker evaluates locally
//! - Broadcast / scatter / gather of the vector, matrix rows and partial
//!   results, driven by a single [`DistributionTable`]
//! - A deterministic local kernel, sequential or rayon-threaded
//! - Two transports behind the [`Collective`] trait: an in-process thread
//!   group ([`LocalGroup`]) and MPI (with the `mpi` feature)
//!
//! ## Supported Types
//!
//! All operations are generic over [`Scalar`]: `f32`, `f64`, `i32`, `i64`.
//!
//! ## Quick Start
//!
//! ```
//! use ferromatvec::{run, Collective, Inputs, LocalGroup, RunConfig};
//!
//! fn main() -> Result<(), ferromatvec::Error> {
//!     let config = RunConfig::new(8, 4);
//!
//!     let reports = LocalGroup::run(3, |comm| {
//!         // Only the coordinator holds the operands
//!         let inputs = if comm.rank() == config.root {
//!             Some(Inputs::from_fn(8, 4, |r, _| (r + 1) as f64, |_| 1.0)?)
//!         } else {
//!             None
//!         };
//!         run(comm, &config, inputs)
//!     })?;
//!
//!     let report = reports[0].as_ref().expect("root report");
//!     assert_eq!(report.y, vec![4.0, 8.0, 12.0, 16.0, 20.0, 24.0, 28.0, 32.0]);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `mpi`   | MPI transport through the C shim in `csrc/` | system MPICH or OpenMPI |
//!
//! Under MPI, launch one process per rank:
//!
//! ```text
//! mpiexec -n 4 ./target/release/ferromatvec 1000 500 --backend mpi
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

mod comm;
mod config;
mod coordinator;
mod datatype;
mod error;
mod inputs;
pub mod kernel;
mod local;
mod matrix;
mod partition;
pub mod transport;

#[cfg(feature = "mpi")]
mod ffi;
#[cfg(feature = "mpi")]
mod mpi;

pub use comm::Collective;
pub use config::{RunConfig, DEFAULT_COLS, DEFAULT_ROWS};
pub use coordinator::{run, RunReport};
pub use datatype::{DatatypeTag, Scalar};
pub use error::{Error, ErrorCategory, Result};
pub use inputs::Inputs;
pub use kernel::{multiply_sequential, multiply_slice, Kernel};
pub use local::{LocalComm, LocalGroup};
pub use matrix::Matrix;
pub use partition::{rows_for, DistributionTable, Layout, Share};
pub use transport::{broadcast_vector, gather_partials, scatter_rows};

#[cfg(feature = "mpi")]
pub use mpi::{Communicator, Mpi, ThreadLevel};
