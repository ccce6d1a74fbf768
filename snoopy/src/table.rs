//! Per-source correlation of fragments into events.
//!
//! A [`CorrelationTable`] is owned by exactly one source worker, so it needs
//! no locking. Entries are keyed by `tid` and removed as soon as their Ret
//! fragment arrives, which makes `tid` reuse after completion harmless.

use std::collections::HashMap;

use bytes::Bytes;

use crate::decode::{RawRecord, RecordKind, comm_str};
use crate::event::Event;

/// Accumulated state for an exec whose Ret has not been seen yet.
#[derive(Debug, Clone)]
pub struct PartialEvent {
    pub ts: u64,
    pub pid: u32,
    pub tid: u32,
    pub uid: u32,
    pub comm: String,
    pub args: Vec<Bytes>,
    pub envs: Vec<Bytes>,
}

impl PartialEvent {
    fn open(record: &RawRecord) -> Self {
        Self {
            ts: record.timestamp,
            pid: record.pid,
            tid: record.tid,
            uid: record.uid,
            comm: comm_str(&record.comm),
            args: vec![record.payload.clone()],
            envs: Vec::new(),
        }
    }

    fn complete(self, ret: i64) -> Event {
        Event {
            ts: self.ts,
            pid: self.pid,
            tid: self.tid,
            uid: self.uid,
            ret,
            comm: self.comm,
            args: self.args,
            envs: self.envs,
        }
    }
}

/// What applying one record did to the table.
#[derive(Debug, PartialEq, Eq)]
pub enum Applied {
    /// First Arg for a `tid`, a new entry was created.
    Opened,
    /// Arg or Env appended to an open entry.
    Appended,
    /// Ret closed the entry.
    Completed(Event),
    /// Env or Ret for a `tid` with no open entry, discarded.
    Orphaned,
}

#[derive(Debug, Default)]
pub struct CorrelationTable {
    partials: HashMap<u32, PartialEvent>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, record: RawRecord) -> Applied {
        match record.kind {
            RecordKind::Arg => self.on_arg(&record),
            RecordKind::Env => self.on_env(&record),
            RecordKind::Ret => match self.on_ret(&record) {
                Some(event) => Applied::Completed(event),
                None => Applied::Orphaned,
            },
        }
    }

    pub fn on_arg(&mut self, record: &RawRecord) -> Applied {
        match self.partials.get_mut(&record.tid) {
            Some(partial) => {
                partial.args.push(record.payload.clone());
                Applied::Appended
            }
            None => {
                self.partials.insert(record.tid, PartialEvent::open(record));
                Applied::Opened
            }
        }
    }

    pub fn on_env(&mut self, record: &RawRecord) -> Applied {
        match self.partials.get_mut(&record.tid) {
            Some(partial) => {
                partial.envs.push(record.payload.clone());
                Applied::Appended
            }
            None => Applied::Orphaned,
        }
    }

    pub fn on_ret(&mut self, record: &RawRecord) -> Option<Event> {
        self.partials
            .remove(&record.tid)
            .map(|partial| partial.complete(record.ret))
    }

    pub fn get(&self, tid: u32) -> Option<&PartialEvent> {
        self.partials.get(&tid)
    }

    /// Number of execs still waiting for their Ret.
    pub fn len(&self) -> usize {
        self.partials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }
}
