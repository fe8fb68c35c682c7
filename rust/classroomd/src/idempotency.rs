//! Replay protection for non-idempotent writes.
//!
//! A caller that may retry sends `idempotencyKey`. The first successful
//! response for a `(key, method)` pair is stored in the same transaction as
//! the write it describes; a retry with the same payload gets that response
//! back and writes nothing. Reusing a key with a different payload is a
//! conflict.

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::db;
use crate::error::{CoreError, CoreResult};

pub const MAX_KEY_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Miss,
    Replay(Value),
}

pub fn validate_key(raw: &str) -> CoreResult<String> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(CoreError::validation("idempotencyKey must not be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CoreError::validation(format!(
            "idempotencyKey must be at most {} bytes",
            MAX_KEY_LEN
        )));
    }
    Ok(key.to_string())
}

/// SHA-256 of the request params with the key itself removed. Object keys
/// serialize in sorted order, so equal payloads hash equally.
pub fn payload_hash(params: &Value) -> String {
    let mut canonical = params.clone();
    if let Some(obj) = canonical.as_object_mut() {
        obj.remove("idempotencyKey");
    }
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn lookup(conn: &Connection, key: &str, method: &str, hash: &str) -> CoreResult<Lookup> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT payload_hash, response FROM idempotency_keys
             WHERE idem_key = ? AND method = ?",
            (key, method),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((stored_hash, response)) = row else {
        return Ok(Lookup::Miss);
    };
    if stored_hash != hash {
        return Err(CoreError::Conflict {
            message: "idempotencyKey was already used with a different payload".to_string(),
            details: Some(serde_json::json!({ "idempotencyKey": key })),
        });
    }
    let value = serde_json::from_str(&response).map_err(|e| {
        CoreError::Storage(rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(e),
        ))
    })?;
    Ok(Lookup::Replay(value))
}

pub fn store(
    conn: &Connection,
    key: &str,
    method: &str,
    hash: &str,
    response: &Value,
) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO idempotency_keys(idem_key, method, payload_hash, response, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (key, method, hash, response.to_string(), db::now_timestamp()),
    )?;
    Ok(())
}
