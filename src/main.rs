use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use classboardd::ipc;
use classboardd::prefs::MemoryPrefs;

#[tokio::main]
async fn main() {
    // Prefs start in memory; the UI attaches a file via prefs.attach.
    let mut state = ipc::AppState::new(Arc::new(MemoryPrefs::default()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(v)) => v,
            Ok(None) | Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply with an id the client never gave us.
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = stdout.write_all(format!("{}\n", resp).as_bytes()).await;
                let _ = stdout.flush().await;
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req).await;
        let payload =
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
        let _ = stdout.write_all(format!("{}\n", payload).as_bytes()).await;
        let _ = stdout.flush().await;
    }
}
