//! Wire types for the dispatcher protocol.
//!
//! Every payload on every socket is a flat JSON mapping; there is no generic
//! envelope (no version/timestamp/correlation metadata wrapper) beyond the
//! fields each message kind actually carries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DispatchError;

/// Render a fresh correlation token: the 32-character lowercase hex digest of
/// a v4 UUID, no hyphens. Matches the reference implementation's rendering
/// exactly, which S1 depends on.
pub fn new_correlation_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Serialize any wire type to its JSON byte representation.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, DispatchError> {
    Ok(serde_json::to_vec(value)?)
}

/// Detail block of a service result: the command's outcome plus the node
/// and platform it ran on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultDetail {
    pub node: String,
    pub service: String,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    /// Name of the agent's operating system family (e.g. `Linux`, `FreeBSD`).
    pub system: String,
    /// Release/version string of the agent's operating system.
    pub version: String,
}

/// A service-control result, pushed by an agent to the broker's sink and
/// republished to the originating client.
///
/// `success` is present (`-1`) only on the degenerate error paths (missing
/// request fields, or the service utility being unlocatable); it is absent
/// on a successfully executed request. This asymmetry is inherited from the
/// reference implementation's own result shape and preserved rather than
/// normalized away, since wire payloads are untyped JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResult {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<i32>,
    /// Top-level node name, present only on the service-utility-unlocatable
    /// error path, which predates there being a `result` block to nest it in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl ServiceResult {
    /// Build the "missing cmd/service field" error result.
    pub fn missing_fields(uuid: Option<String>) -> Self {
        Self {
            msg: "Missing message properties".to_string(),
            result: None,
            uuid,
            success: Some(-1),
            node: None,
        }
    }

    /// Build the "service(8) utility could not be located" error result.
    pub fn utility_unlocatable(node: impl Into<String>, uuid: Option<String>) -> Self {
        Self {
            msg: "Unable to determine location to service(8)".to_string(),
            result: None,
            uuid,
            success: Some(-1),
            node: Some(node.into()),
        }
    }

    /// Build a successful result carrying the command's outcome.
    pub fn executed(cmd: &str, detail: ResultDetail, uuid: Option<String>) -> Self {
        Self {
            msg: format!("Executed service {cmd} request"),
            result: Some(detail),
            uuid,
            success: None,
            node: None,
        }
    }
}

/// Reply sent by the broker to a client on the intake endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl IntakeReply {
    /// Successful intake: correlation token plus the result-publisher port.
    pub fn accepted(uuid: String, port: u16) -> Self {
        Self {
            uuid: Some(uuid),
            port: Some(port),
            success: None,
            msg: None,
        }
    }

    /// Rejected intake: the payload was not a JSON mapping.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self {
            uuid: None,
            port: None,
            success: Some(-1),
            msg: Some(msg.into()),
        }
    }
}

/// Reply to a management command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementReply {
    pub success: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ManagementReply {
    pub fn ok(msg: impl Into<String>, result: Option<Value>) -> Self {
        Self {
            success: 0,
            msg: msg.into(),
            result,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: -1,
            msg: msg.into(),
            result: None,
        }
    }
}
