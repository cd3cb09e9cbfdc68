use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;

use crate::attendance::{AttendanceBoard, AttendanceStatus};
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{param_i64, param_str};
use crate::ipc::types::{AppState, Request};
use crate::remote::HttpRemote;

fn board_payload(board: &AttendanceBoard) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = board
        .rows()
        .iter()
        .map(|r| {
            json!({
                "studentId": r.key,
                "status": r.local_value,
                "confirmedStatus": r.value,
                "dirty": r.dirty,
                "persistedId": r.persisted_id,
            })
        })
        .collect();
    json!({
        "verificationState": board.verification_state(),
        "rows": rows,
    })
}

fn require_board(state: &AppState, req: &Request) -> Result<AttendanceBoard, serde_json::Value> {
    state
        .attendance
        .clone()
        .ok_or_else(|| err(&req.id, "no_scope", "call attendance.open first", None))
}

async fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(base_url) = state.remote_base.clone() else {
        return err(&req.id, "no_remote", "call remote.configure first", None);
    };
    let Some(class_id) = param_i64(req, "classId") else {
        return err(&req.id, "bad_params", "missing classId", None);
    };
    let Some(date_raw) = param_str(req, "date") else {
        return err(&req.id, "bad_params", "missing date", None);
    };
    let Ok(date) = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d") else {
        return err(&req.id, "bad_params", "date must be YYYY-MM-DD", None);
    };

    let board = if let Some(board) = &state.attendance {
        board.clone()
    } else {
        let remote = match HttpRemote::new(&base_url, "attendance") {
            Ok(r) => r,
            Err(e) => return err(&req.id, "fetch_failed", e.to_string(), None),
        };
        let board = AttendanceBoard::new(Arc::new(remote));
        state.attendance = Some(board.clone());
        board
    };

    match board.open(class_id, date).await {
        Ok(()) => ok(&req.id, board_payload(&board)),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_cycle(state: &AppState, req: &Request) -> serde_json::Value {
    let board = match require_board(state, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let Some(student_id) = param_i64(req, "studentId") else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    match board.cycle(student_id) {
        Ok(status) => ok(
            &req.id,
            json!({
                "studentId": student_id,
                "status": status,
                "dirty": board.is_dirty(student_id),
            }),
        ),
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_set_all(state: &AppState, req: &Request) -> serde_json::Value {
    let board = match require_board(state, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("status") else {
        return err(&req.id, "bad_params", "missing status", None);
    };
    let Ok(status) = serde_json::from_value::<AttendanceStatus>(raw.clone()) else {
        return err(
            &req.id,
            "bad_params",
            "status must be one of: present, absent, tardy, excused, unset",
            None,
        );
    };
    board.apply_bulk(status);
    ok(&req.id, board_payload(&board))
}

async fn handle_verify(state: &AppState, req: &Request) -> serde_json::Value {
    let board = match require_board(state, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match board.verify().await {
        Ok(summary) => {
            let failed: Vec<serde_json::Value> = summary
                .failed
                .iter()
                .map(|(student_id, message)| {
                    json!({ "studentId": student_id, "message": message })
                })
                .collect();
            ok(
                &req.id,
                json!({
                    "verificationState": board.verification_state(),
                    "committed": summary.committed,
                    "failed": failed,
                }),
            )
        }
        Err(e) => store_err(&req.id, e),
    }
}

fn handle_state(state: &AppState, req: &Request) -> serde_json::Value {
    let board = match require_board(state, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    ok(&req.id, board_payload(&board))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.open" => Some(handle_open(state, req).await),
        "attendance.cycle" => Some(handle_cycle(state, req)),
        "attendance.setAll" => Some(handle_set_all(state, req)),
        "attendance.verify" => Some(handle_verify(state, req).await),
        "attendance.state" => Some(handle_state(state, req)),
        _ => None,
    }
}
