use rusqlite::Connection;
use serde_json::Value;

use super::error::{err, respond};
use super::types::{AppState, Request};
use crate::actor::{self, Actor};
use crate::error::{CoreError, CoreResult};

pub fn get_required_str(params: &Value, key: &str) -> CoreResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| CoreError::bad_params(format!("missing {}", key)))
}

/// Absent and `null` both read as `None`; any other non-string is an error.
pub fn get_opt_str(params: &Value, key: &str) -> CoreResult<Option<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CoreError::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_required_i64(params: &Value, key: &str) -> CoreResult<i64> {
    get_opt_i64(params, key)?.ok_or_else(|| CoreError::bad_params(format!("missing {}", key)))
}

/// Accepts integers and integer-valued strings, as form posts send both.
pub fn get_opt_i64(params: &Value, key: &str) -> CoreResult<Option<i64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| CoreError::bad_params(format!("{} must be an integer", key))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| CoreError::bad_params(format!("{} must be an integer", key))),
        Some(_) => Err(CoreError::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn get_opt_f64(params: &Value, key: &str) -> CoreResult<Option<f64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| CoreError::bad_params(format!("{} must be a number", key))),
    }
}

/// Runs a handler body against the open workspace with the caller's actor,
/// and turns the outcome into a response envelope.
pub fn with_actor(
    state: &AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &Actor, &Value) -> CoreResult<Value>,
) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let result = actor::from_params(&req.params).and_then(|a| f(conn, &a, &req.params));
    respond(&req.id, &req.method, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_params_accept_numeric_strings() {
        let p = json!({ "row": 2, "column": "3", "bad": "x", "frac": 1.5 });
        assert_eq!(get_required_i64(&p, "row").expect("row"), 2);
        assert_eq!(get_required_i64(&p, "column").expect("column"), 3);
        assert_eq!(get_required_i64(&p, "bad").unwrap_err().code(), "bad_params");
        assert_eq!(get_required_i64(&p, "frac").unwrap_err().code(), "bad_params");
        assert_eq!(get_required_i64(&p, "missing").unwrap_err().code(), "bad_params");
        assert_eq!(get_opt_i64(&p, "missing").expect("none"), None);
    }

    #[test]
    fn optional_strings() {
        let p = json!({ "a": "x", "b": null, "c": 3 });
        assert_eq!(get_opt_str(&p, "a").expect("a").as_deref(), Some("x"));
        assert_eq!(get_opt_str(&p, "b").expect("b"), None);
        assert!(get_opt_str(&p, "c").is_err());
    }
}
