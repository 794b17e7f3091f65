// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    auth_missing = { ErrorCode::AuthMissing, 1001, 401 },
    auth_invalid = { ErrorCode::AuthInvalid, 1002, 403 },
    peer_not_found = { ErrorCode::PeerNotFound, 2001, 404 },
    exec_denied = { ErrorCode::ExecCommandDenied, 3001, 400 },
    exec_max = { ErrorCode::ExecMaxConcurrent, 3003, 429 },
    transfer_denied = { ErrorCode::TransferPathDenied, 4001, 400 },
    context_missing = { ErrorCode::ContextKeyNotFound, 5001, 404 },
    task_max = { ErrorCode::AiTaskMaxConcurrent, 6002, 429 },
    agent_not_found = { ErrorCode::AiTaskAgentNotFound, 6007, 400 },
    internal = { ErrorCode::Internal, 9001, 500 },
)]
fn test_code_table(code: ErrorCode, wire: u16, status: u16) {
    assert_eq!(code.as_u16(), wire);
    assert_eq!(code.http_status(), status);
}

#[test]
fn test_round_trip_all_codes() {
    for wire in [
        1001, 1002, 1003, 2001, 2002, 2003, 2004, 2005, 3001, 3002, 3003, 3004, 3005, 3006, 4001,
        4002, 4003, 4004, 4005, 5001, 5002, 5003, 6001, 6002, 6003, 6004, 6005, 6006, 6007, 9001,
        9002, 9003,
    ] {
        let code = ErrorCode::try_from(wire).unwrap();
        assert_eq!(code.as_u16(), wire);
    }
    assert!(ErrorCode::try_from(1234).is_err());
}

#[test]
fn test_envelope_serialization() {
    let env = ErrorEnvelope::new(ErrorCode::ContextValueTooLarge, "value exceeds 1 MiB");
    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["error"]["code"], 5002);
    assert_eq!(json["error"]["message"], "value exceeds 1 MiB");
    assert!(json["error"].get("details").is_none());

    let with = env.with_details(serde_json::json!({"limit": 1048576}));
    let json = serde_json::to_value(&with).unwrap();
    assert_eq!(json["error"]["details"]["limit"], 1048576);
}
