//! Raw FFI bindings to the C shim in `csrc/ferromatvec.c`.
//!
//! These are low-level unsafe functions. Use the safe wrappers in
//! [`crate::mpi`].

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_double, c_int, c_void};

pub type int32_t = i32;
pub type int64_t = i64;

extern "C" {
    // ============================================================
    // Initialization and Finalization
    // ============================================================

    pub fn ferromatvec_init_thread(required: c_int, provided: *mut c_int) -> c_int;
    pub fn ferromatvec_finalize() -> c_int;
    pub fn ferromatvec_finalized(flag: *mut c_int) -> c_int;

    // ============================================================
    // Communicator Operations
    // ============================================================

    pub fn ferromatvec_comm_world() -> int32_t;
    pub fn ferromatvec_comm_rank(comm: int32_t, rank: *mut int32_t) -> c_int;
    pub fn ferromatvec_comm_size(comm: int32_t, size: *mut int32_t) -> c_int;
    pub fn ferromatvec_comm_dup(comm: int32_t, newcomm: *mut int32_t) -> c_int;
    pub fn ferromatvec_comm_free(comm: int32_t) -> c_int;

    // ============================================================
    // Collectives
    // ============================================================

    pub fn ferromatvec_barrier(comm: int32_t) -> c_int;

    pub fn ferromatvec_bcast(
        buf: *mut c_void,
        count: int64_t,
        datatype_tag: int32_t,
        root: int32_t,
        comm: int32_t,
    ) -> c_int;

    pub fn ferromatvec_scatterv(
        sendbuf: *const c_void,
        sendcounts: *const int32_t,
        displs: *const int32_t,
        recvbuf: *mut c_void,
        recvcount: int64_t,
        datatype_tag: int32_t,
        root: int32_t,
        comm: int32_t,
    ) -> c_int;

    pub fn ferromatvec_gatherv(
        sendbuf: *const c_void,
        sendcount: int64_t,
        recvbuf: *mut c_void,
        recvcounts: *const int32_t,
        displs: *const int32_t,
        datatype_tag: int32_t,
        root: int32_t,
        comm: int32_t,
    ) -> c_int;

    // ============================================================
    // Utility Functions
    // ============================================================

    pub fn ferromatvec_error_string(code: c_int, message: *mut c_char, len: *mut int32_t) -> c_int;
    pub fn ferromatvec_get_version(version: *mut c_char, len: *mut int32_t) -> c_int;
    pub fn ferromatvec_wtime() -> c_double;
    pub fn ferromatvec_abort(comm: int32_t, errorcode: int32_t) -> c_int;
}
