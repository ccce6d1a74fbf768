use bytes::Bytes;

/// A completed execution: every fragment seen for one `tid` between its
/// first Arg and its Ret.
///
/// Argument and environment strings are the producer's bytes as sent. Only
/// formatters decide how to render bytes that are not UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub ts: u64,
    pub pid: u32,
    pub tid: u32,
    pub uid: u32,
    pub ret: i64,
    pub comm: String,
    pub args: Vec<Bytes>,
    pub envs: Vec<Bytes>,
}
