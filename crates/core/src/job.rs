// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution job model.

use crate::id::{JobId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameters for `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecuteParams {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Wall-clock timeout in milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Result of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub job_id: JobId,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration: u64,
    /// True when the child died to a terminating signal (cancel/timeout).
    pub killed: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Summary of a live job, as listed by `GET /execute/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: JobId,
    pub command: String,
    pub args: Vec<String>,
    pub started_at: u64,
    pub from_node_id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// One frame of the `POST /execute/stream` SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobStreamEvent {
    Stdout {
        #[serde(rename = "jobId")]
        job_id: JobId,
        data: String,
        timestamp: u64,
    },
    Stderr {
        #[serde(rename = "jobId")]
        job_id: JobId,
        data: String,
        timestamp: u64,
    },
    Exit {
        #[serde(rename = "jobId")]
        job_id: JobId,
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
        killed: bool,
        timestamp: u64,
    },
    Error {
        #[serde(rename = "jobId")]
        job_id: JobId,
        data: String,
        timestamp: u64,
    },
}
