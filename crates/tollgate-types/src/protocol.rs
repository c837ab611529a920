//! Host message protocol.
//!
//! The host drives a worker with newline-delimited JSON requests of the form
//! `{type, rid, ...params}`; the worker answers each with exactly one
//! completion (`*_OK` or `ERROR`) carrying the same `rid`, and may interleave
//! advisory `PROGRESS` messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::progress::{Phase, Progress};
use crate::wire::WireOpenEntry;

/// A request line as received from the host. Parameters stay untyped here;
/// each command handler normalizes the fields it understands.
#[derive(Clone, Debug, Deserialize)]
pub struct Request {
    /// Command name, e.g. `"INIT"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Correlation id, echoed verbatim.
    #[serde(default)]
    pub rid: Value,
    /// Every other field of the request object.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Commands understood by a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Init,
    Commit,
    Open,
    Cancel,
    Dispose,
}

impl Command {
    /// Parse the `type` field of a request.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "INIT" => Some(Self::Init),
            "COMMIT" => Some(Self::Commit),
            "OPEN" => Some(Self::Open),
            "CANCEL" => Some(Self::Cancel),
            "DISPOSE" => Some(Self::Dispose),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Commit => "COMMIT",
            Self::Open => "OPEN",
            Self::Cancel => "CANCEL",
            Self::Dispose => "DISPOSE",
        }
    }
}

/// Every message a worker sends back to the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reply {
    InitOk {
        #[ts(type = "unknown")]
        rid: Value,
    },
    CommitOk {
        #[ts(type = "unknown")]
        rid: Value,
        #[serde(rename = "rootB64")]
        root_b64: String,
        nonce: String,
    },
    OpenOk {
        #[ts(type = "unknown")]
        rid: Value,
        opens: Vec<WireOpenEntry>,
    },
    CancelOk {
        #[ts(type = "unknown")]
        rid: Value,
    },
    DisposeOk {
        #[ts(type = "unknown")]
        rid: Value,
    },
    Error {
        #[ts(type = "unknown")]
        rid: Value,
        /// Stable snake_case reason code.
        reason: String,
        message: String,
    },
    Progress {
        #[ts(type = "unknown")]
        rid: Value,
        phase: Phase,
        done: u32,
        total: u32,
        attempt: u32,
    },
}

impl Reply {
    /// Wrap a progress event for the command identified by `rid`.
    pub fn progress(rid: Value, progress: Progress) -> Self {
        Self::Progress {
            rid,
            phase: progress.phase,
            done: progress.done,
            total: progress.total,
            attempt: progress.attempt,
        }
    }

    /// Build an `ERROR` reply.
    pub fn error(rid: Value, reason: &str, message: impl Into<String>) -> Self {
        Self::Error {
            rid,
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    /// The correlation id this message answers.
    pub fn rid(&self) -> &Value {
        match self {
            Self::InitOk { rid }
            | Self::CommitOk { rid, .. }
            | Self::OpenOk { rid, .. }
            | Self::CancelOk { rid }
            | Self::DisposeOk { rid }
            | Self::Error { rid, .. }
            | Self::Progress { rid, .. } => rid,
        }
    }

    /// Whether this message completes its command (everything but `PROGRESS`).
    pub fn is_completion(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}
