//! Error types for ferromatvec

use thiserror::Error;

/// Result type for ferromatvec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for planning, transport and compute.
///
/// Every variant is fatal to the run it occurs in. Variants fall into the
/// categories reported by [`Error::category`].
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid run parameters (worker count, row count, config file, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Root rank outside `[0, size)`
    #[error("Invalid rank: {rank} (group size {size})")]
    InvalidRank {
        /// The offending rank
        rank: i32,
        /// Number of workers in the group
        size: i32,
    },

    /// A worker could not obtain memory for one of its buffers
    #[error("Allocation error: cannot reserve {elements} elements for {what}")]
    Allocation {
        /// Which buffer was being allocated
        what: &'static str,
        /// Requested element count
        elements: usize,
    },

    /// Buffer dimensions disagree with the declared shape
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which buffer or dimension was checked
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// The distribution table was planned for a different group size
    #[error("Group size mismatch: table has {table} entries, group has {group} workers")]
    GroupSizeMismatch {
        /// Entries in the distribution table
        table: usize,
        /// Workers in the communicator
        group: i32,
    },

    /// An integer dot product left the range of its element type
    #[error("Arithmetic overflow in row {row}")]
    Overflow {
        /// Row whose dot product overflowed
        row: usize,
    },

    /// A collective failed mid-flight (peer unreachable, bad payload, ...)
    #[error("Communication error: {0}")]
    Communication(String),

    /// The group was aborted by one of its members
    #[error("Group aborted by rank {origin} (code {code})")]
    Aborted {
        /// Rank that called abort
        origin: i32,
        /// Abort code supplied by that rank
        code: i32,
    },

    /// MPI error with code and the runtime's error string
    #[error("MPI error (code {code}): {message}")]
    Mpi {
        /// Raw MPI return code
        code: i32,
        /// Message from `MPI_Error_string`
        message: String,
    },

    /// MPI has already been initialized
    #[error("MPI has already been initialized")]
    AlreadyInitialized,
}

/// Broad error classes, one per failure domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Detected before any communication
    Configuration,
    /// Out of memory on some worker
    Allocation,
    /// Collective failure; the group cannot continue
    Communication,
    /// Buffer shape disagreement
    Shape,
    /// Integer result out of range
    Arithmetic,
}

impl Error {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Configuration(_) | Error::InvalidRank { .. } | Error::AlreadyInitialized => {
                ErrorCategory::Configuration
            }
            Error::Allocation { .. } => ErrorCategory::Allocation,
            Error::ShapeMismatch { .. } => ErrorCategory::Shape,
            Error::Overflow { .. } => ErrorCategory::Arithmetic,
            Error::GroupSizeMismatch { .. }
            | Error::Communication(_)
            | Error::Aborted { .. }
            | Error::Mpi { .. } => ErrorCategory::Communication,
        }
    }

    /// Non-zero code used for process exit status and group abort.
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Allocation => 3,
            ErrorCategory::Communication => 4,
            ErrorCategory::Shape => 5,
            ErrorCategory::Arithmetic => 6,
        }
    }

    /// Create an error from a non-zero MPI return code.
    #[cfg(feature = "mpi")]
    pub fn from_code(code: i32) -> Self {
        let mut buf = [0u8; 512];
        let mut len: i32 = 0;
        let ret = unsafe {
            crate::ffi::ferromatvec_error_string(code, buf.as_mut_ptr().cast(), &mut len)
        };
        let message = if ret == 0 {
            let len = (len.max(0) as usize).min(buf.len());
            String::from_utf8_lossy(&buf[..len]).into_owned()
        } else {
            "unknown MPI error".to_string()
        };
        Error::Mpi { code, message }
    }

    /// Check an MPI return code, returning Ok(()) for success.
    #[cfg(feature = "mpi")]
    pub fn check(code: i32) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(Error::from_code(code))
        }
    }
}
