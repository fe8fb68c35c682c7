use serde_json::json;
use tracing::warn;

use crate::error::{CoreError, CoreResult};

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn core_err(id: &str, method: &str, e: &CoreError) -> serde_json::Value {
    warn!(method, code = e.code(), error = %e, "request rejected");
    err(id, e.code(), e.to_string(), e.details())
}

pub fn respond(id: &str, method: &str, result: CoreResult<serde_json::Value>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => core_err(id, method, &e),
    }
}
