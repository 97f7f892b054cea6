//! Canonical CBOR encoding for audit entries.
//!
//! This module implements RFC 8949 Core Deterministic Encoding for the small
//! subset of CBOR the audit trail needs:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! The same audit entry must produce identical bytes (and thus an identical
//! hash) on every platform and every storage backend.

use ciborium::value::Value;

use crate::audit::{AuditHash, AuditRecord};
use crate::error::CoreError;

/// Field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const SEQ: u64 = 0;
    pub const ACTOR: u64 = 1;
    pub const SUBJECT: u64 = 2;
    pub const CATEGORY: u64 = 3;
    pub const ACTION: u64 = 4;
    pub const TIMESTAMP: u64 = 5;
    pub const OUTCOME: u64 = 6;
    pub const REASON: u64 = 7;
    pub const PREV_HASH: u64 = 8;
}

/// Encode the hashed portion of an audit entry to canonical CBOR bytes.
pub fn canonical_entry_bytes(
    seq: u64,
    record: &AuditRecord,
    prev_hash: &AuditHash,
) -> Result<Vec<u8>, CoreError> {
    let value = entry_to_cbor_value(seq, record, prev_hash);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value)?;
    Ok(buf)
}

fn entry_to_cbor_value(seq: u64, record: &AuditRecord, prev_hash: &AuditHash) -> Value {
    let optional_text = |text: Option<&str>| match text {
        Some(t) => Value::Text(t.to_string()),
        None => Value::Null,
    };

    Value::Map(vec![
        (int(keys::SEQ), int(seq)),
        (int(keys::ACTOR), Value::Text(record.actor.as_str().to_string())),
        (
            int(keys::SUBJECT),
            optional_text(record.subject.as_ref().map(|s| s.as_str())),
        ),
        (
            int(keys::CATEGORY),
            optional_text(record.category.map(|c| c.as_str())),
        ),
        (int(keys::ACTION), Value::Text(record.action.as_str().to_string())),
        (int(keys::TIMESTAMP), int(record.timestamp)),
        (int(keys::OUTCOME), Value::Text(record.outcome.as_str().to_string())),
        (int(keys::REASON), Value::Text(record.reason.clone())),
        (int(keys::PREV_HASH), Value::Bytes(prev_hash.0.to_vec())),
    ])
}

fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Null => buf.push(0xf6),
        _ => {
            return Err(CoreError::EncodingError(
                "unsupported CBOR value in canonical encoding".into(),
            ))
        }
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a map canonically (major type 5): keys sorted by encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
