// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry point: `loopsy-hook <taskId> <port> <apiKey>`.
//!
//! Exit code is always 0; any failure prints a deny decision so the
//! agent never hangs on a broken hook.

use std::io::Read;

use loopsy_hook::{decision_json, resolve_permission};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let decision = match args.as_slice() {
        [_, task_id, port, api_key] => {
            let mut stdin = String::new();
            if std::io::stdin().read_to_string(&mut stdin).is_err() {
                decision_json(false, "could not read tool payload from stdin")
            } else {
                match serde_json::from_str(&stdin) {
                    Ok(payload) => {
                        let base_url = format!("http://127.0.0.1:{port}");
                        resolve_permission(&base_url, api_key, task_id, &payload).await
                    }
                    Err(e) => decision_json(false, &format!("malformed tool payload: {e}")),
                }
            }
        }
        _ => decision_json(false, "usage: loopsy-hook <taskId> <port> <apiKey>"),
    };

    println!("{decision}");
}
