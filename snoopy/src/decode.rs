//! Raw record decoding.
//!
//! A record is a fixed 48-byte little-endian header followed by a payload.
//! The payload is kept verbatim, NUL bytes included.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use snoopy_common::{COMM_LEN, HEADER_LEN, RECORD_ARG, RECORD_ENV, RECORD_RET};

use crate::error::DecodeError;

/// Fragment type carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Arg,
    Env,
    Ret,
}

impl RecordKind {
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            RECORD_ARG => Some(Self::Arg),
            RECORD_ENV => Some(Self::Env),
            RECORD_RET => Some(Self::Ret),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Arg => RECORD_ARG,
            Self::Env => RECORD_ENV,
            Self::Ret => RECORD_RET,
        }
    }
}

/// One decoded fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub timestamp: u64,
    pub kind: RecordKind,
    pub pid: u32,
    pub tid: u32,
    pub uid: u32,
    pub ret: i64,
    pub comm: [u8; COMM_LEN],
    pub payload: Bytes,
}

impl RawRecord {
    /// Lays the record out in wire format.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u64_le(self.timestamp);
        buf.put_u32_le(self.kind.as_u32());
        buf.put_u32_le(self.pid);
        buf.put_u32_le(self.tid);
        buf.put_u32_le(self.uid);
        buf.put_i64_le(self.ret);
        buf.put_slice(&self.comm);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Decode a raw record. The payload shares `data`'s allocation.
pub fn decode(mut data: Bytes) -> Result<RawRecord, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::Truncated { size: data.len() });
    }

    let timestamp = data.get_u64_le();
    let raw_kind = data.get_u32_le();
    let kind = RecordKind::from_u32(raw_kind).ok_or(DecodeError::UnknownKind { raw: raw_kind })?;
    let pid = data.get_u32_le();
    let tid = data.get_u32_le();
    let uid = data.get_u32_le();
    let ret = data.get_i64_le();
    let mut comm = [0u8; COMM_LEN];
    data.copy_to_slice(&mut comm);

    Ok(RawRecord {
        timestamp,
        kind,
        pid,
        tid,
        uid,
        ret,
        comm,
        payload: data,
    })
}

/// Renders a NUL-padded kernel `comm` as a string.
pub fn comm_str(comm: &[u8; COMM_LEN]) -> String {
    let end = comm.iter().position(|&b| b == 0).unwrap_or(COMM_LEN);
    String::from_utf8_lossy(&comm[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: RecordKind, payload: &'static [u8]) -> RawRecord {
        let mut comm = [0u8; COMM_LEN];
        comm[..4].copy_from_slice(b"bash");
        RawRecord {
            timestamp: 1_700_000_000_123_456_789,
            kind,
            pid: 4242,
            tid: 4243,
            uid: 1000,
            ret: -2,
            comm,
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn decodes_header_fields_little_endian() {
        let mut raw = BytesMut::new();
        raw.put_u64_le(0x0102_0304_0506_0708);
        raw.put_u32_le(RECORD_ENV);
        raw.put_u32_le(10);
        raw.put_u32_le(11);
        raw.put_u32_le(12);
        raw.put_i64_le(-1);
        raw.put_slice(b"ls\0\0\0\0\0\0\0\0\0\0\0\0\0\0");
        raw.put_slice(b"PATH=/bin");

        let record = decode(raw.freeze()).unwrap();
        assert_eq!(record.timestamp, 0x0102_0304_0506_0708);
        assert_eq!(record.kind, RecordKind::Env);
        assert_eq!((record.pid, record.tid, record.uid), (10, 11, 12));
        assert_eq!(record.ret, -1);
        assert_eq!(comm_str(&record.comm), "ls");
        assert_eq!(&record.payload[..], b"PATH=/bin");
    }

    #[test]
    fn encode_matches_decode() {
        let record = sample(RecordKind::Arg, b"/usr/bin/env");
        let bytes = record.encode();
        assert_eq!(bytes.len(), HEADER_LEN + 12);
        assert_eq!(decode(bytes).unwrap(), record);
    }

    #[test]
    fn keeps_trailing_nul_in_payload() {
        let record = sample(RecordKind::Arg, b"-la\0");
        let decoded = decode(record.encode()).unwrap();
        assert_eq!(&decoded.payload[..], b"-la\0");
    }

    #[test]
    fn ret_record_has_empty_payload() {
        let decoded = decode(sample(RecordKind::Ret, b"").encode()).unwrap();
        assert_eq!(decoded.kind, RecordKind::Ret);
        assert_eq!(decoded.ret, -2);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn short_buffers_are_truncated_errors() {
        for len in [0, 1, 8, HEADER_LEN - 1] {
            let err = decode(Bytes::from(vec![0u8; len])).unwrap_err();
            assert_eq!(err, DecodeError::Truncated { size: len });
        }
    }

    #[test]
    fn exact_header_length_decodes() {
        assert!(decode(Bytes::from(vec![0u8; HEADER_LEN])).is_ok());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut bytes = BytesMut::from(&sample(RecordKind::Arg, b"x").encode()[..]);
        bytes[8..12].copy_from_slice(&7u32.to_le_bytes());
        assert_eq!(
            decode(bytes.freeze()).unwrap_err(),
            DecodeError::UnknownKind { raw: 7 }
        );
    }

    #[test]
    fn comm_without_nul_uses_all_bytes() {
        let comm = *b"sixteen-bytes-xx";
        assert_eq!(comm_str(&comm), "sixteen-bytes-xx");
    }
}
