//! In-process process group: one OS thread per rank.
//!
//! Workers share nothing but channels. Each rank owns an inbox; every rank
//! holds a sender to every inbox, so messages between a given pair of ranks
//! arrive in the order they were sent. Collectives are built from those
//! point-to-point messages with the root at the hub, the same shape an MPI
//! implementation uses for small groups.
//!
//! A worker that fails or panics aborts the group. Peers blocked waiting for
//! a message notice the abort on their next poll and return
//! [`Error::Aborted`] instead of waiting forever.
//!
//! # Example
//!
//! ```
//! use ferromatvec::{Collective, LocalGroup};
//!
//! let sums = LocalGroup::run(4, |comm| {
//!     let mut data = vec![0i64; 3];
//!     if comm.rank() == 0 {
//!         data = vec![1, 2, 3];
//!     }
//!     comm.broadcast(&mut data, 0)?;
//!     Ok(data.iter().sum::<i64>())
//! })
//! .unwrap();
//! assert_eq!(sums, vec![6, 6, 6, 6]);
//! ```

use crate::comm::{check_count, check_layout, check_root, Collective};
use crate::datatype::Scalar;
use crate::error::{Error, Result};
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

/// How long a blocked receive waits before re-checking for an abort.
const ABORT_POLL: Duration = Duration::from_millis(5);

struct Envelope {
    source: i32,
    payload: Box<dyn Any + Send>,
}

/// State shared by every member of one group.
#[derive(Default)]
struct GroupState {
    /// `(origin, code)` of the first abort
    aborted: OnceLock<(i32, i32)>,
}

impl GroupState {
    /// Record an abort; returns false if the group was already aborted.
    fn abort(&self, origin: i32, code: i32) -> bool {
        self.aborted.set((origin, code)).is_ok()
    }

    fn check(&self) -> Result<()> {
        match self.aborted.get() {
            Some(&(origin, code)) => Err(Error::Aborted { origin, code }),
            None => Ok(()),
        }
    }
}

/// One member of a [`LocalGroup`].
///
/// `LocalComm` is `Send` so it can be moved into its worker thread, but not
/// `Sync`: a rank is driven by exactly one thread.
pub struct LocalComm {
    rank: i32,
    size: i32,
    outboxes: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    /// Messages that arrived from a rank other than the one being waited on
    pending: RefCell<VecDeque<Envelope>>,
    state: Arc<GroupState>,
}

impl LocalComm {
    fn post<T: Scalar>(&self, dest: i32, data: Vec<T>) -> Result<()> {
        self.state.check()?;
        let envelope = Envelope {
            source: self.rank,
            payload: Box::new(data),
        };
        self.outboxes[dest as usize]
            .send(envelope)
            .map_err(|_| match self.state.check() {
                Err(aborted) => aborted,
                Ok(()) => Error::Communication(format!("rank {dest} is unreachable")),
            })
    }

    fn take<T: Scalar>(&self, source: i32) -> Result<Vec<T>> {
        let envelope = self.next_from(source)?;
        envelope
            .payload
            .downcast::<Vec<T>>()
            .map(|data| *data)
            .map_err(|_| {
                Error::Communication(format!(
                    "datatype mismatch: rank {source} did not send {:?} elements",
                    T::TAG
                ))
            })
    }

    fn next_from(&self, source: i32) -> Result<Envelope> {
        {
            let mut pending = self.pending.borrow_mut();
            if let Some(pos) = pending.iter().position(|e| e.source == source) {
                if let Some(envelope) = pending.remove(pos) {
                    return Ok(envelope);
                }
            }
        }
        loop {
            match self.inbox.recv_timeout(ABORT_POLL) {
                Ok(envelope) if envelope.source == source => return Ok(envelope),
                Ok(envelope) => self.pending.borrow_mut().push_back(envelope),
                Err(RecvTimeoutError::Timeout) => self.state.check()?,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Communication(format!(
                        "rank {} lost its inbox while waiting for rank {source}",
                        self.rank
                    )))
                }
            }
        }
    }
}

impl Collective for LocalComm {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.size
    }

    fn barrier(&self) -> Result<()> {
        self.state.check()?;
        if self.rank == 0 {
            for source in 1..self.size {
                self.take::<i32>(source)?;
            }
            for dest in 1..self.size {
                self.post::<i32>(dest, Vec::new())?;
            }
        } else {
            self.post::<i32>(0, Vec::new())?;
            self.take::<i32>(0)?;
        }
        Ok(())
    }

    fn broadcast<T: Scalar>(&self, data: &mut [T], root: i32) -> Result<()> {
        check_root(root, self.size)?;
        self.state.check()?;
        if self.rank == root {
            for dest in (0..self.size).filter(|&d| d != root) {
                self.post(dest, data.to_vec())?;
            }
        } else {
            let received = self.take::<T>(root)?;
            if received.len() != data.len() {
                return Err(Error::ShapeMismatch {
                    what: "broadcast buffer",
                    expected: received.len(),
                    actual: data.len(),
                });
            }
            data.copy_from_slice(&received);
        }
        Ok(())
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
        self.state.check()?;
        if self.rank == root {
            check_layout(counts, displs, self.size, send.len())?;
            check_count("scatter receive buffer", counts[root as usize], recv.len())?;
            for dest in 0..self.size {
                let start = displs[dest as usize] as usize;
                let block = &send[start..start + counts[dest as usize] as usize];
                if dest == root {
                    recv.copy_from_slice(block);
                } else {
                    self.post(dest, block.to_vec())?;
                }
            }
        } else {
            let received = self.take::<T>(root)?;
            if received.len() != recv.len() {
                return Err(Error::ShapeMismatch {
                    what: "scatter receive buffer",
                    expected: received.len(),
                    actual: recv.len(),
                });
            }
            recv.copy_from_slice(&received);
        }
        Ok(())
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
        self.state.check()?;
        if self.rank != root {
            return self.post(root, send.to_vec());
        }
        check_layout(counts, displs, self.size, recv.len())?;
        check_count("gather send buffer", counts[root as usize], send.len())?;
        for source in 0..self.size {
            let start = displs[source as usize] as usize;
            let count = counts[source as usize];
            if source == root {
                recv[start..start + send.len()].copy_from_slice(send);
            } else {
                let block = self.take::<T>(source)?;
                check_count("gathered block", count, block.len())?;
                recv[start..start + block.len()].copy_from_slice(&block);
            }
        }
        Ok(())
    }

    fn abort(&self, code: i32) {
        if self.state.abort(self.rank, code) {
            error!(rank = self.rank, code, "aborting local group");
        }
    }
}

/// Builder for in-process groups.
pub struct LocalGroup;

impl LocalGroup {
    /// Create the `size` members of a new group, ordered by rank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `size <= 0`.
    pub fn create(size: i32) -> Result<Vec<LocalComm>> {
        if size <= 0 {
            return Err(Error::Configuration(format!(
                "group size must be at least 1, got {size}"
            )));
        }
        let state = Arc::new(GroupState::default());
        let (outboxes, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();
        Ok(inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalComm {
                rank: rank as i32,
                size,
                outboxes: outboxes.clone(),
                inbox,
                pending: RefCell::default(),
                state: Arc::clone(&state),
            })
            .collect())
    }

    /// Run `worker` on `size` threads and return every rank's outcome.
    ///
    /// A rank whose worker returns an error or panics aborts the group.
    pub fn spawn<R, F>(size: i32, worker: F) -> Result<Vec<Result<R>>>
    where
        R: Send,
        F: Fn(&LocalComm) -> Result<R> + Sync,
    {
        let comms = Self::create(size)?;
        let state = Arc::clone(&comms[0].state);
        debug!(size, "spawning local group");

        let outcomes: Vec<Result<R>> = thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let rank = comm.rank;
                    let worker = &worker;
                    thread::Builder::new()
                        .name(format!("rank-{rank}"))
                        .spawn_scoped(scope, move || run_rank(&comm, worker))
                        .map_err(|e| {
                            let err = Error::Communication(format!("cannot start rank {rank}: {e}"));
                            state.abort(rank, err.exit_code());
                            err
                        })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle.and_then(|h| {
                        h.join().unwrap_or_else(|_| {
                            Err(Error::Communication(format!("rank {rank} panicked")))
                        })
                    })
                })
                .collect()
        });
        Ok(outcomes)
    }

    /// Run `worker` on `size` threads and collect the per-rank results.
    ///
    /// # Errors
    ///
    /// If any rank failed, returns the error that caused the failure rather
    /// than the [`Error::Aborted`] seen by its peers.
    pub fn run<R, F>(size: i32, worker: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&LocalComm) -> Result<R> + Sync,
    {
        let outcomes = Self::spawn(size, worker)?;
        let mut values = Vec::with_capacity(outcomes.len());
        let mut first_abort = None;
        for outcome in outcomes {
            match outcome {
                Ok(value) => values.push(value),
                Err(err @ Error::Aborted { .. }) => {
                    first_abort.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        match first_abort {
            Some(err) => Err(err),
            None => Ok(values),
        }
    }
}

fn run_rank<R>(comm: &LocalComm, worker: &(impl Fn(&LocalComm) -> Result<R> + Sync)) -> Result<R> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker(comm)))
        .unwrap_or_else(|_| Err(Error::Communication(format!("rank {} panicked", comm.rank))));
    if let Err(err) = &outcome {
        if !matches!(err, Error::Aborted { .. }) {
            comm.abort(err.exit_code());
        }
    }
    outcome
}
