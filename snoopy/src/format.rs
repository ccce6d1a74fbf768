//! Rendering completed events as text.
//!
//! Formatters are plain functions of `(event, print_env)` so the consumer can
//! hold one by value and call it without any shared state.

use std::borrow::Cow;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;

use crate::event::Event;

pub type FormatFn = fn(&Event, bool) -> String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `HH:MM:SS:micros [uid:.. tid:.., comm:..]: args`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl OutputFormat {
    pub fn formatter(self) -> FormatFn {
        match self {
            Self::Text => text,
            Self::Json => json,
        }
    }
}

/// `HH:MM:SS:micros` in UTC.
pub fn timestamp(ts_ns: u64) -> String {
    DateTime::<Utc>::from_timestamp_nanos(ts_ns as i64)
        .format("%H:%M:%S:%6f")
        .to_string()
}

/// Space-joined, with bytes that are not UTF-8 shown as U+FFFD.
pub fn join_lossy(parts: &[Bytes]) -> String {
    lossy(parts).join(" ")
}

fn lossy(parts: &[Bytes]) -> Vec<Cow<'_, str>> {
    parts.iter().map(|part| String::from_utf8_lossy(part)).collect()
}

pub fn text(event: &Event, print_env: bool) -> String {
    let line = format!(
        "{:<16} [uid:{} tid:{}, comm:{}]: {}",
        timestamp(event.ts),
        event.uid,
        event.tid,
        event.comm,
        join_lossy(&event.args)
    );
    if print_env {
        format!("{line}\n{{{}}}", join_lossy(&event.envs))
    } else {
        line
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    time: String,
    #[serde(flatten)]
    event: JsonEvent<'a>,
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    ts: u64,
    pid: u32,
    tid: u32,
    uid: u32,
    ret: i64,
    comm: &'a str,
    args: Vec<Cow<'a, str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    envs: Option<Vec<Cow<'a, str>>>,
}

pub fn json(event: &Event, print_env: bool) -> String {
    let line = JsonLine {
        time: timestamp(event.ts),
        event: JsonEvent {
            ts: event.ts,
            pid: event.pid,
            tid: event.tid,
            uid: event.uid,
            ret: event.ret,
            comm: &event.comm,
            args: lossy(&event.args),
            envs: print_env.then(|| lossy(&event.envs)),
        },
    };
    serde_json::to_string(&line).unwrap_or_else(|err| json_error(&err))
}

fn json_error(err: &serde_json::Error) -> String {
    serde_json::json!({ "error": err.to_string() }).to_string()
}
