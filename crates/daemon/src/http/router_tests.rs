// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_support::{client, serve, test_state, url, TEST_KEY};
use loopsy_agents::{FakeLauncher, ScriptedProcess};
use serde_json::json;
use std::time::Duration;

async fn wait_for_status(
    addr: std::net::SocketAddr,
    task_id: &str,
    wanted: &str,
) -> serde_json::Value {
    for _ in 0..300 {
        let response = client()
            .get(url(addr, &format!("/ai-tasks/{task_id}")))
            .bearer_auth(TEST_KEY)
            .send()
            .await
            .unwrap();
        if response.status() == 200 {
            let body: serde_json::Value = response.json().await.unwrap();
            if body["status"] == wanted {
                return body;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never reached status {wanted}");
}

#[tokio::test]
async fn test_execute_echo_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    let response = client()
        .post(url(addr, "/execute"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"command": "echo", "args": ["hello"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["exitCode"], 0);
    assert_eq!(body["stdout"], "hello\n");
    assert_eq!(body["stderr"], "");
    assert_eq!(body["killed"], false);
    assert!(body["jobId"].as_str().unwrap().len() == 36);

    // Job table drains back to empty
    let jobs: serde_json::Value = client()
        .get(url(addr, "/execute/jobs"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs["jobs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_execute_denied_command() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    let response = client()
        .post(url(addr, "/execute"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"command": "/bin/rm", "args": ["-rf", "/"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], 3001);
}

#[tokio::test]
async fn test_execute_rejects_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    let response = client()
        .post(url(addr, "/execute"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"command": "echo", "bogus": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], 9003);
}

#[tokio::test]
async fn test_context_ttl_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    let response = client()
        .put(url(addr, "/context/temp"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"value": "v", "ttl": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let entry: serde_json::Value = response.json().await.unwrap();
    assert_eq!(entry["key"], "temp");
    assert_eq!(entry["ttl"], 1);

    // Readable now
    let response = client()
        .get(url(addr, "/context/temp"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let response = client()
        .get(url(addr, "/context/temp"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], 5001);
}

#[tokio::test]
async fn test_context_snapshot_written_after_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), FakeLauncher::new());
    let snapshot_path = state.data_dir.context_file();
    let addr = serve(state).await;

    client()
        .put(url(addr, "/context/app/setting"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"value": "persisted"}))
        .send()
        .await
        .unwrap();

    let raw = std::fs::read_to_string(&snapshot_path).unwrap();
    assert!(raw.contains("persisted"));

    // Prefix listing
    let body: serde_json::Value = client()
        .get(url(addr, "/context?prefix=app/"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_context_value_too_large() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    let huge = "x".repeat(1024 * 1024 + 1);
    let response = client()
        .put(url(addr, "/context/big"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"value": huge}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], 5002);
}

#[tokio::test]
async fn test_peers_add_list_remove() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    let peer: serde_json::Value = client()
        .post(url(addr, "/peers"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"address": "10.1.2.3", "port": 19532, "hostname": "lab"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(peer["nodeId"], "manual-10.1.2.3:19532");
    assert_eq!(peer["manuallyAdded"], true);

    let listed: serde_json::Value = client()
        .get(url(addr, "/peers"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["peers"].as_array().unwrap().len(), 1);

    let response = client()
        .delete(url(addr, "/peers/manual-10.1.2.3:19532"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client()
        .delete(url(addr, "/peers/manual-10.1.2.3:19532"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], 2001);
}

#[tokio::test]
async fn test_handshake_exchanges_identities() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), FakeLauncher::new());
    let our_node_id = state.identity.node_id.to_string();
    let addr = serve(state).await;

    let response = client()
        .post(url(addr, "/peers/handshake"))
        .bearer_auth(TEST_KEY)
        .json(&json!({
            "nodeId": "remote-1",
            "hostname": "remote-box",
            "platform": "darwin",
            "version": "1.0.0",
            "port": 19533,
            "capabilities": ["execute"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let identity: serde_json::Value = response.json().await.unwrap();
    assert_eq!(identity["nodeId"], our_node_id.as_str());

    // The caller landed in the registry as online
    let peers: serde_json::Value = client()
        .get(url(addr, "/peers"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let peer = &peers["peers"][0];
    assert_eq!(peer["nodeId"], "remote-1");
    assert_eq!(peer["status"], "online");
    assert_eq!(peer["address"], "127.0.0.1");
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    let response = client()
        .post(url(addr, "/peers/handshake"))
        .bearer_auth(TEST_KEY)
        .json(&json!({
            "nodeId": "remote-1",
            "hostname": "remote-box",
            "platform": "darwin",
            "version": "2.0.0",
            "port": 19533,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], 2005);
}

#[tokio::test]
async fn test_ai_task_dispatch_and_approve_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess {
        hang: true,
        ..Default::default()
    });
    let addr = serve(test_state(dir.path(), launcher.clone())).await;

    // Dispatch
    let response = client()
        .post(url(addr, "/ai-tasks"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"prompt": "noop", "agent": "claude"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let task: serde_json::Value = response.json().await.unwrap();
    let task_id = task["taskId"].as_str().unwrap().to_string();
    assert_eq!(task["status"], "running");
    assert_eq!(task["agent"], "claude");

    // Hook registers a permission request
    let response = client()
        .post(url(addr, &format!("/ai-tasks/{task_id}/permission-request")))
        .bearer_auth(TEST_KEY)
        .json(&json!({
            "requestId": "r1",
            "toolName": "Write",
            "toolInput": {"path": "/x"},
            "description": "write /x",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "waiting_approval");
    assert_eq!(body["pendingApproval"]["requestId"], "r1");

    // Hook poll: unresolved
    let body: serde_json::Value = client()
        .get(url(
            addr,
            &format!("/ai-tasks/{task_id}/permission-response?requestId=r1"),
        ))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["resolved"], false);

    // Human approves
    let response = client()
        .post(url(addr, &format!("/ai-tasks/{task_id}/approve")))
        .bearer_auth(TEST_KEY)
        .json(&json!({"requestId": "r1", "approved": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "running");

    // Hook poll: resolved approval
    let body: serde_json::Value = client()
        .get(url(
            addr,
            &format!("/ai-tasks/{task_id}/permission-response?requestId=r1"),
        ))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["resolved"], true);
    assert_eq!(body["approved"], true);

    // The event buffer recorded the prompt
    let events: serde_json::Value = client()
        .get(url(addr, &format!("/ai-tasks/{task_id}/events")))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let kinds: Vec<&str> = events["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["type"].as_str())
        .collect();
    assert!(kinds.contains(&"permission_request"));

    // Let the fake agent finish; status converges to completed
    launcher.finish(loopsy_agents::ExitOutcome {
        exit_code: Some(0),
        signaled: false,
        stderr_tail: String::new(),
    });
    wait_for_status(addr, &task_id, "completed").await;
}

#[tokio::test]
async fn test_ai_task_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    let response = client()
        .get(url(addr, "/ai-tasks/ghost"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], 6001);
}

#[tokio::test]
async fn test_pair_happy_path_updates_allowed_keys() {
    use p256::ecdh::EphemeralSecret;
    use p256::elliptic_curve::rand_core::OsRng;
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), FakeLauncher::new());
    let addr = serve(state.clone()).await;

    // A starts a session
    let start: serde_json::Value = client()
        .post(url(addr, "/pair/start"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let invite = start["inviteCode"].as_str().unwrap().to_string();
    assert_eq!(invite.len(), 6);

    // Second start conflicts (single-flight)
    let conflict = client().post(url(addr, "/pair/start")).send().await.unwrap();
    assert_eq!(conflict.status(), 409);

    // B initiates with its ephemeral key
    let b_secret = EphemeralSecret::random(&mut OsRng);
    let b_public = hex::encode(b_secret.public_key().to_encoded_point(false).as_bytes());
    let response = client()
        .post(url(addr, "/pair/initiate"))
        .json(&json!({
            "publicKey": b_public,
            "inviteCode": invite,
            "hostname": "b",
            "apiKey": "KB",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["hostname"], "test-node");
    assert_eq!(body["apiKey"], TEST_KEY);
    let sas = body["sas"].as_str().unwrap();
    assert_eq!(sas.len(), 6);

    // B computes the same SAS from its own secret
    let a_public =
        p256::PublicKey::from_sec1_bytes(&hex::decode(body["publicKey"].as_str().unwrap()).unwrap())
            .unwrap();
    let shared = b_secret.diffie_hellman(&a_public);
    assert_eq!(
        sas,
        loopsy_mesh::pairing::derive_sas(shared.raw_secret_bytes().as_slice())
    );

    // A confirms; B's key lands in allowedKeys and on disk
    let response = client()
        .post(url(addr, "/pair/confirm"))
        .json(&json!({"confirmed": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    assert_eq!(
        state.config.lock().auth.allowed_keys.get("b").map(String::as_str),
        Some("KB")
    );
    let on_disk = std::fs::read_to_string(state.data_dir.config_file()).unwrap();
    assert!(on_disk.contains("KB"));

    // Paired key now authenticates
    let response = client()
        .get(url(addr, "/status"))
        .bearer_auth("KB")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_status_counters() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    client()
        .put(url(addr, "/context/one"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"value": "1"}))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = client()
        .get(url(addr, "/status"))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["contextEntries"], 1);
    assert_eq!(body["activeJobs"], 0);
    assert_eq!(body["activeTasks"], 0);
    assert_eq!(body["peers"]["total"], 0);
}

#[tokio::test]
async fn test_execute_stream_sse() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(test_state(dir.path(), FakeLauncher::new())).await;

    let response = client()
        .post(url(addr, "/execute/stream"))
        .bearer_auth(TEST_KEY)
        .json(&json!({"command": "echo", "args": ["streamed"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = response.text().await.unwrap();
    assert!(body.contains("\"type\":\"stdout\""));
    assert!(body.contains("streamed"));
    assert!(body.contains("\"type\":\"exit\""));
}
