//! MPI transport: one process per rank, collectives through the C shim.

use crate::comm::{check_count, check_layout, check_root, Collective};
use crate::datatype::Scalar;
use crate::error::{Error, Result};
use crate::ffi;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::error;

/// Global flag tracking whether MPI has been initialized
static MPI_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// MPI thread support levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum ThreadLevel {
    /// Only single-threaded execution
    Single = 0,
    /// Multi-threaded, but MPI calls only from main thread
    Funneled = 1,
    /// Multi-threaded, but MPI calls serialized by user
    Serialized = 2,
    /// Full multi-threaded support
    Multiple = 3,
}

impl ThreadLevel {
    fn from_provided(provided: i32) -> Self {
        match provided {
            0 => ThreadLevel::Single,
            1 => ThreadLevel::Funneled,
            2 => ThreadLevel::Serialized,
            _ => ThreadLevel::Multiple,
        }
    }
}

/// MPI environment handle.
///
/// At most one exists per process; dropping it finalizes MPI.
///
/// ```no_run
/// use ferromatvec::{Collective, Mpi, ThreadLevel};
///
/// let mpi = Mpi::init_thread(ThreadLevel::Funneled).expect("MPI init");
/// let world = mpi.world().expect("world communicator");
/// println!("rank {} of {}", world.rank(), world.size());
/// ```
pub struct Mpi {
    thread_level: ThreadLevel,
    /// Keeps Mpi !Send and !Sync: finalize must run on the initializing thread
    _marker: PhantomData<*const ()>,
}

impl Mpi {
    /// Initialize MPI requesting `required` thread support.
    ///
    /// The level actually granted is available from
    /// [`thread_level()`](Self::thread_level). A threaded kernel only needs
    /// [`ThreadLevel::Funneled`]: rayon workers never call MPI.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyInitialized`] on a second call, [`Error::Mpi`] if the
    /// library fails to start.
    pub fn init_thread(required: ThreadLevel) -> Result<Self> {
        if MPI_INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyInitialized);
        }

        let mut provided: i32 = 0;
        let ret = unsafe { ffi::ferromatvec_init_thread(required as i32, &mut provided) };
        if let Err(err) = Error::check(ret) {
            MPI_INITIALIZED.store(false, Ordering::SeqCst);
            return Err(err);
        }

        Ok(Mpi {
            thread_level: ThreadLevel::from_provided(provided),
            _marker: PhantomData,
        })
    }

    /// The thread support level MPI granted.
    pub fn thread_level(&self) -> ThreadLevel {
        self.thread_level
    }

    /// A communicator over every launched process.
    pub fn world(&self) -> Result<Communicator> {
        Communicator::from_handle(unsafe { ffi::ferromatvec_comm_world() })
    }

    /// High-resolution wall-clock time in seconds.
    pub fn wtime() -> f64 {
        unsafe { ffi::ferromatvec_wtime() }
    }

    /// The MPI library version string.
    pub fn version() -> Result<String> {
        let mut buf = [0u8; 256];
        let mut len: i32 = 0;
        Error::check(unsafe {
            ffi::ferromatvec_get_version(buf.as_mut_ptr().cast(), &mut len)
        })?;
        let len = (len.max(0) as usize).min(buf.len());
        Ok(String::from_utf8_lossy(&buf[..len]).trim_end().to_string())
    }

    /// Check if MPI has been finalized.
    pub fn is_finalized() -> bool {
        let mut flag: i32 = 0;
        unsafe { ffi::ferromatvec_finalized(&mut flag) };
        flag != 0
    }
}

impl Drop for Mpi {
    fn drop(&mut self) {
        if MPI_INITIALIZED.load(Ordering::SeqCst) {
            unsafe {
                ffi::ferromatvec_finalize();
            }
            MPI_INITIALIZED.store(false, Ordering::SeqCst);
        }
    }
}

/// An MPI communicator.
///
/// Rank and size are read once at construction; MPI never changes them.
pub struct Communicator {
    handle: i32,
    rank: i32,
    size: i32,
    _marker: PhantomData<*const ()>,
}

impl Communicator {
    fn from_handle(handle: i32) -> Result<Self> {
        let mut rank = 0;
        let mut size = 0;
        Error::check(unsafe { ffi::ferromatvec_comm_rank(handle, &mut rank) })?;
        Error::check(unsafe { ffi::ferromatvec_comm_size(handle, &mut size) })?;
        Ok(Communicator {
            handle,
            rank,
            size,
            _marker: PhantomData,
        })
    }

    /// A communicator with the same group but a separate message space, so
    /// library traffic cannot match the caller's own collectives.
    pub fn duplicate(&self) -> Result<Communicator> {
        let mut handle = 0;
        Error::check(unsafe { ffi::ferromatvec_comm_dup(self.handle, &mut handle) })?;
        Communicator::from_handle(handle)
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        // Handle 0 is COMM_WORLD and must not be freed
        if self.handle != 0 && !Mpi::is_finalized() {
            unsafe { ffi::ferromatvec_comm_free(self.handle) };
        }
    }
}

impl Collective for Communicator {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn barrier(&self) -> Result<()> {
        Error::check(unsafe { ffi::ferromatvec_barrier(self.handle) })
    }

    fn broadcast<T: Scalar>(&self, data: &mut [T], root: i32) -> Result<()> {
        check_root(root, self.size)?;
        Error::check(unsafe {
            ffi::ferromatvec_bcast(
                data.as_mut_ptr().cast(),
                data.len() as i64,
                T::TAG as i32,
                root,
                self.handle,
            )
        })
    }

    fn scatterv<T: Scalar>(
        &self,
        send: &[T],
        counts: &[i32],
        displs: &[i32],
        recv: &mut [T],
        root: i32,
    ) -> Result<()> {
        check_root(root, self.size)?;
        if self.rank == root {
            check_layout(counts, displs, self.size, send.len())?;
            check_count("scatter receive buffer", counts[root as usize], recv.len())?;
        }
        Error::check(unsafe {
            ffi::ferromatvec_scatterv(
                send.as_ptr().cast(),
                counts.as_ptr(),
                displs.as_ptr(),
                recv.as_mut_ptr().cast(),
                recv.len() as i64,
                T::TAG as i32,
                root,
                self.handle,
            )
        })
    }

    fn gatherv<T: Scalar>(
        &self,
        send: &[T],
        recv: &mut [T],
        counts: &[i32],
        displs: &[i32],
        root: i32,
    ) -> Result<()> {
        check_root(root, self.size)?;
        if self.rank == root {
            check_layout(counts, displs, self.size, recv.len())?;
            check_count("gather send buffer", counts[root as usize], send.len())?;
        }
        Error::check(unsafe {
            ffi::ferromatvec_gatherv(
                send.as_ptr().cast(),
                send.len() as i64,
                recv.as_mut_ptr().cast(),
                counts.as_ptr(),
                displs.as_ptr(),
                T::TAG as i32,
                root,
                self.handle,
            )
        })
    }

    fn abort(&self, code: i32) {
        error!(rank = self.rank, code, "aborting MPI job");
        unsafe {
            ffi::ferromatvec_abort(self.handle, code);
        }
    }
}
