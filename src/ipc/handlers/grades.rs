use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::grades::{CellKey, GradeBook};
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::param_i64;
use crate::ipc::types::{AppState, Request};
use crate::remote::HttpRemote;
use crate::store::{CommitOutcome, RecordView};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentParam {
    assignment_id: i64,
    max_points: f64,
}

fn cell_json(view: &RecordView<CellKey, Option<f64>>) -> serde_json::Value {
    json!({
        "studentId": view.key.student_id,
        "assignmentId": view.key.assignment_id,
        "points": view.local_value,
        "confirmedPoints": view.value,
        "dirty": view.dirty,
        "persistedId": view.persisted_id,
    })
}

fn book_payload(book: &GradeBook) -> serde_json::Value {
    let cells: Vec<serde_json::Value> = book.cells().iter().map(cell_json).collect();
    json!({ "cells": cells })
}

fn require_book(state: &AppState, req: &Request) -> Result<GradeBook, serde_json::Value> {
    state
        .grades
        .clone()
        .ok_or_else(|| err(&req.id, "no_scope", "call grades.open first", None))
}

fn cell_key(req: &Request) -> Result<CellKey, serde_json::Value> {
    let Some(student_id) = param_i64(req, "studentId") else {
        return Err(err(&req.id, "bad_params", "missing studentId", None));
    };
    let Some(assignment_id) = param_i64(req, "assignmentId") else {
        return Err(err(&req.id, "bad_params", "missing assignmentId", None));
    };
    Ok(CellKey {
        student_id,
        assignment_id,
    })
}

async fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(base_url) = state.remote_base.clone() else {
        return err(&req.id, "no_remote", "call remote.configure first", None);
    };
    let Some(class_id) = param_i64(req, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let Some(raw) = req.params.get("assignments") else {
        return err(&req.id, "bad_params", "missing assignments", None);
    };
    let Ok(assignments) = serde_json::from_value::<Vec<AssignmentParam>>(raw.clone()) else {
        return err(
            &req.id,
            "bad_params",
            "assignments must be [{assignmentId, maxPoints}]",
            None,
        );
    };
    let pairs: Vec<(i64, f64)> = assignments
        .iter()
        .map(|a| (a.assignment_id, a.max_points))
        .collect();

    let book = if let Some(book) = &state.grades {
        book.clone()
    } else {
        let remote = match HttpRemote::new(&base_url, "grades") {
            Ok(r) => r,
            Err(e) => return err(&req.id, "fetch_failed", e.to_string(), None),
        };
        let book = GradeBook::new(Arc::new(remote));
        state.grades = Some(book.clone());
        book
    };

    match book.open(class_id, &pairs).await {
        Ok(()) => ok(&req.id, book_payload(&book)),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_edit(state: &AppState, req: &Request) -> serde_json::Value {
    let book = match require_book(state, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let key = match cell_key(req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    // The UI sends the raw field text; a bare number is accepted too.
    let raw = match req.params.get("raw") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(_) => return err(&req.id, "bad_params", "raw must be a string", None),
    };
    match book.edit_local(key, &raw) {
        Ok(()) => {
            let cell = book
                .cells()
                .into_iter()
                .find(|c| c.key == key)
                .map(|c| cell_json(&c));
            ok(&req.id, json!({ "cell": cell }))
        }
        Err(e) => store_err(&req.id, e),
    }
}

async fn handle_commit(state: &AppState, req: &Request) -> serde_json::Value {
    let book = match require_book(state, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let key = match cell_key(req) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    match book.commit_cell(key).await {
        Ok(CommitOutcome::Clean(view)) => ok(
            &req.id,
            json!({ "written": false, "cell": cell_json(&view) }),
        ),
        Ok(CommitOutcome::Committed(view)) => ok(
            &req.id,
            json!({ "written": true, "cell": cell_json(&view) }),
        ),
        Ok(CommitOutcome::Deferred) => ok(&req.id, json!({ "written": false, "deferred": true })),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_state(state: &AppState, req: &Request) -> serde_json::Value {
    let book = match require_book(state, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    ok(&req.id, book_payload(&book))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.open" => Some(handle_open(state, req).await),
        "grades.edit" => Some(handle_edit(state, req)),
        "grades.commit" => Some(handle_commit(state, req).await),
        "grades.state" => Some(handle_state(state, req)),
        _ => None,
    }
}
