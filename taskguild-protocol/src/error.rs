//! Protocol-edge error type.
//!
//! Maps the core's [`TaskError`] taxonomy onto stable JSON-RPC error codes.
//! The mapping is 1:1 with [`TaskError::status_code`] rather than inventing a
//! parallel scheme, so a caller can always recover the HTTP-style status by
//! halving the gap to -32000.

use serde_json::{json, Value};
use task_core::TaskError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("{0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("not allowed: {0}")]
    NotAllowed(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// JSON-RPC 2.0 reserves -32700..-32600 for parse/request errors; the
    /// application range below -32000 is ours to assign.
    pub fn to_error_code(&self) -> i32 {
        match self {
            ProtocolError::NotFound(_) => -32001,
            ProtocolError::Validation(_) => -32002,
            ProtocolError::Conflict(_) => -32003,
            ProtocolError::NotAllowed(_) => -32004,
            ProtocolError::Timeout(_) => -32005,
            ProtocolError::Cancelled(_) => -32006,
            ProtocolError::Malformed(_) => -32007,
            ProtocolError::Internal(_) => -32008,
        }
    }

    pub fn to_json_rpc_error(&self, id: Option<Value>) -> Value {
        json!({
            "jsonrpc": "2.0",
            "error": {
                "code": self.to_error_code(),
                "message": self.to_string(),
            },
            "id": id,
        })
    }
}

impl From<TaskError> for ProtocolError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound(msg) => ProtocolError::NotFound(msg),
            TaskError::Validation(msg) => ProtocolError::Validation(msg),
            TaskError::NotReady { task_id, process_name } => ProtocolError::Conflict(format!(
                "process '{process_name}' on task '{task_id}' is not ready"
            )),
            TaskError::AlreadyAssigned { task_id, process_name, holder } => ProtocolError::Conflict(format!(
                "process '{process_name}' on task '{task_id}' already assigned to '{holder}'"
            )),
            TaskError::NotAssignedToCaller { task_id, process_name, caller } => ProtocolError::Conflict(format!(
                "process '{process_name}' on task '{task_id}' is not assigned to '{caller}'"
            )),
            TaskError::AlreadyTerminal(id) => ProtocolError::Conflict(format!("interaction '{id}' is already terminal")),
            TaskError::NotAllowed(msg) => ProtocolError::NotAllowed(msg),
            TaskError::Timeout(msg) => ProtocolError::Timeout(msg),
            TaskError::Cancelled(msg) => ProtocolError::Cancelled(msg),
            TaskError::Internal(msg) => ProtocolError::Internal(msg),
        }
    }
}
