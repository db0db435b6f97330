//! The collective operations every transport backend provides.

use crate::datatype::Scalar;
use crate::error::{Error, Result};

/// A process group that can run blocking collectives.
///
/// All members must call the same collectives in the same order; a member
/// that skips one leaves its peers blocked until the group is aborted.
/// Ranks and counts are `i32`, matching the MPI conventions.
///
/// Implemented by [`LocalComm`](crate::LocalComm) (threads in one process)
/// and, with the `mpi` feature, by `Communicator` (MPI processes).
pub trait Collective {
    /// Rank of the calling worker.
    fn rank(&self) -> i32;

    /// Number of workers in the group.
    fn size(&self) -> i32;

    /// Whether the calling worker is `root`.
    fn is_root(&self, root: i32) -> bool {
        self.rank() == root
    }

    /// Block until every worker has entered the barrier.
    fn barrier(&self) -> Result<()>;

    /// Broadcast `data` from `root` to all workers.
    ///
    /// # Arguments
    ///
    /// * `data` - Buffer to broadcast (input at root, output at others)
    /// * `root` - Rank of the root process
    fn broadcast<T: Scalar>(&self, data: &mut [T], root: i32) -> Result<()>;

    /// Scatter variable-sized blocks of `send` from `root`.
    ///
    /// Rank `i` receives `counts[i]` elements starting at `send[displs[i]]`
    /// into `recv`, which must hold exactly `counts[i]` elements. `send`,
    /// `counts` and `displs` are only read at the root.
    fn scatterv<T: Scalar>(
        &self,
        send: &[T],
        counts: &[i32],
        displs: &[i32],
        recv: &mut [T],
        root: i32,
    ) -> Result<()>;

    /// Gather variable-sized blocks into `recv` at `root`.
    ///
    /// Rank `i` contributes `send`, placed at `recv[displs[i]..]`;
    /// `send.len()` must equal `counts[i]`. `recv`, `counts` and `displs`
    /// are only written/read at the root.
    fn gatherv<T: Scalar>(
        &self,
        send: &[T],
        recv: &mut [T],
        counts: &[i32],
        displs: &[i32],
        root: i32,
    ) -> Result<()>;

    /// Terminate the whole group with `code`.
    ///
    /// Peers blocked in a collective return [`Error::Aborted`] (local
    /// backend) or are killed by the runtime (MPI).
    fn abort(&self, code: i32);
}

/// Reject a root outside the group.
pub(crate) fn check_root(root: i32, size: i32) -> Result<()> {
    if root < 0 || root >= size {
        return Err(Error::InvalidRank { rank: root, size });
    }
    Ok(())
}

/// Validate a v-collective layout against the group size and the full
/// buffer it indexes.
pub(crate) fn check_layout(
    counts: &[i32],
    displs: &[i32],
    size: i32,
    buffer_len: usize,
) -> Result<()> {
    if counts.len() != size as usize || displs.len() != size as usize {
        return Err(Error::GroupSizeMismatch {
            table: counts.len().max(displs.len()),
            group: size,
        });
    }
    for (rank, (&count, &displ)) in counts.iter().zip(displs).enumerate() {
        if count < 0 || displ < 0 {
            return Err(Error::Communication(format!(
                "negative count or displacement for rank {rank}"
            )));
        }
        let end = displ as usize + count as usize;
        if end > buffer_len {
            return Err(Error::ShapeMismatch {
                what: "collective buffer",
                expected: end,
                actual: buffer_len,
            });
        }
    }
    Ok(())
}

/// Ensure a per-rank buffer holds exactly the expected element count.
pub(crate) fn check_count(what: &'static str, expected: i32, actual: usize) -> Result<()> {
    if expected < 0 || expected as usize != actual {
        return Err(Error::ShapeMismatch {
            what,
            expected: expected.max(0) as usize,
            actual,
        });
    }
    Ok(())
}
