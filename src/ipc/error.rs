use serde_json::json;

use crate::store::StoreError;

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

/// Maps engine errors onto the wire envelope. A stale-scope response is
/// discarded, not surfaced: the caller gets an ok carrying only a
/// `superseded` marker.
pub fn store_err(id: &str, e: StoreError) -> serde_json::Value {
    match e {
        StoreError::StaleScope => ok(id, json!({ "superseded": true })),
        StoreError::Fetch(remote) => {
            let details = remote.status.map(|s| json!({ "status": s }));
            err(id, "fetch_failed", remote.message, details)
        }
        StoreError::Commit(remote) => {
            let details = remote.status.map(|s| json!({ "status": s }));
            err(id, "commit_failed", remote.message, details)
        }
        StoreError::Validation(message) => err(id, "bad_value", message, None),
        StoreError::UnknownKey => err(id, "not_found", e.to_string(), None),
        StoreError::NoScope => err(id, "no_scope", e.to_string(), None),
    }
}
