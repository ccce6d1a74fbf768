#![no_std]
//! Types shared by the snoopy eBPF producer and the user space engine.
//!
//! Every record leaving the kernel is a [`RecordHeader`] followed by an
//! optional string payload. All integers are little-endian.

/// Producer settings, `HashMap<u32, u32>` keyed by `CONFIG_MAX_*`.
pub const MAP_CONFIG: &str = "CONFIG_MAP";
/// Perf event array carrying execve fragments.
pub const MAP_EXECVE_OUT: &str = "EXECVE_OUT";
/// Perf event array carrying execveat fragments.
pub const MAP_EXECVEAT_OUT: &str = "EXECVEAT_OUT";

pub const CONFIG_MAX_ARG: u32 = 0;
pub const CONFIG_MAX_ENV: u32 = 1;
/// Upper bound for both `CONFIG_MAX_ARG` and `CONFIG_MAX_ENV`.
pub const CONFIG_LIMIT: u32 = 128;

pub const RECORD_ARG: u32 = 0;
pub const RECORD_ENV: u32 = 1;
pub const RECORD_RET: u32 = 2;

pub const COMM_LEN: usize = 16;
pub const HEADER_LEN: usize = 48;
/// Largest string payload the producer attaches to a single fragment.
pub const PAYLOAD_LEN: usize = 256;

/// Fixed part of every record.
///
/// ```text
/// offset  field   size
/// 0       ts      8
/// 8       kind    4
/// 12      pid     4
/// 16      tid     4
/// 20      uid     4
/// 24      ret     8
/// 32      comm    16
/// ```
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RecordHeader {
    pub ts: u64,
    pub kind: u32,
    pub pid: u32,
    pub tid: u32,
    pub uid: u32,
    pub ret: i64,
    pub comm: [u8; COMM_LEN],
}

const _: () = assert!(core::mem::size_of::<RecordHeader>() == HEADER_LEN);

/// Scratch layout the producer fills before emitting `HEADER_LEN + n` bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Record {
    pub header: RecordHeader,
    pub payload: [u8; PAYLOAD_LEN],
}
