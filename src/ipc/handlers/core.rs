use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::param_str;
use crate::ipc::types::{AppState, Request};
use crate::prefs::FilePrefs;

fn handle_ping(req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "pong": true }))
}

fn handle_remote_configure(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(base_url) = param_str(req, "baseUrl") else {
        return err(&req.id, "bad_params", "missing baseUrl", None);
    };
    if base_url.trim().is_empty() {
        return err(&req.id, "bad_params", "baseUrl must not be empty", None);
    }
    state.remote_base = Some(base_url.trim().to_string());
    // Boards are bound to a remote at creation; drop them so the next open
    // rebuilds against the new endpoint.
    state.attendance = None;
    state.grades = None;
    ok(&req.id, json!({ "configured": true }))
}

fn handle_prefs_get(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(key) = param_str(req, "key") else {
        return err(&req.id, "bad_params", "missing key", None);
    };
    ok(&req.id, json!({ "value": state.prefs.get(key) }))
}

fn handle_prefs_set(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(key) = param_str(req, "key") else {
        return err(&req.id, "bad_params", "missing key", None);
    };
    let Some(value) = param_str(req, "value") else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    match state.prefs.set(key, value) {
        Ok(()) => ok(&req.id, json!({ "saved": true })),
        Err(e) => err(&req.id, "prefs_failed", e.to_string(), None),
    }
}

fn handle_prefs_attach(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = param_str(req, "path") else {
        return err(&req.id, "bad_params", "missing path", None);
    };
    match FilePrefs::open(Path::new(path)) {
        Ok(prefs) => {
            state.prefs = Arc::new(prefs);
            ok(&req.id, json!({ "attached": true }))
        }
        Err(e) => err(&req.id, "prefs_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ping" => Some(handle_ping(req)),
        "remote.configure" => Some(handle_remote_configure(state, req)),
        "prefs.get" => Some(handle_prefs_get(state, req)),
        "prefs.set" => Some(handle_prefs_set(state, req)),
        "prefs.attach" => Some(handle_prefs_attach(state, req)),
        _ => None,
    }
}
