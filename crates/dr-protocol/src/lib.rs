// dr-protocol: Relay wire types and serialization.
//
// All websocket frames use a top-level `kind` field for discriminated
// deserialization.  Frames are always transmitted as JSON text; a payload
// that fails to decode is logged and ignored, never fatal to the session.

use serde::{Deserialize, Serialize};

/// Enterprise-setting type under which controller records are stored.
pub const ENTERPRISE_SETTING_TYPE: &str = "RDControllerConfig";

// ---------------------------------------------------------------------------
// Frame payloads
// ---------------------------------------------------------------------------

/// Authoritative snapshot of the live controller set known to the backend.
///
/// Sent by the relay whenever the set of connected controllers changes.
/// The snapshot is complete, not a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtlState {
    pub controllers: Vec<String>,
}

/// A controller command relayed from the backend.
///
/// Execution of the command is delegated to a local command executor;
/// this layer only carries and records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtlCmd {
    pub command: String,
}

/// Operator-issued command wrapper.
///
/// `data` is the operator's argument tokens re-encoded as a JSON array
/// string, opaque to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub data: String,
}

// ---------------------------------------------------------------------------
// Top-level discriminated union
// ---------------------------------------------------------------------------

/// All websocket frame kinds exchanged over a relay session.
///
/// Serializes/deserializes using the `kind` field as a tag.
///
/// ```json
/// { "kind": "ctl_state", "controllers": ["a", "b"] }
/// ```
///
/// `Init` is the operator's first frame after the connection opens; the
/// gateway role sends nothing on open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")]
pub enum RelayFrame {
    Init,
    CtlState(CtlState),
    CtlCmd(CtlCmd),
    Command(CommandFrame),
}

// ---------------------------------------------------------------------------
// Enterprise-setting records
// ---------------------------------------------------------------------------

/// One controller identity record, as stored server-side under the
/// `RDControllerConfig` enterprise setting.
///
/// `created`/`modified` are backend-assigned timestamps; absent on records
/// the backend has not stamped yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerRecord {
    /// Opaque unique identifier generated at creation time, immutable.
    pub controller_uid: String,
    /// Human-assigned label, unique per enterprise (advisory only).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    /// Identifies the controller to the transport layer.  Either the hash
    /// of its one-time token or the id embedded in its client configuration.
    pub client_id: String,
}

/// A fully materialized credential bundle derived from a one-time token.
///
/// Once a token is converted into a `ClientConfig` the raw token is spent;
/// the configuration is the credential of record for all later connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// base64url-encoded client identity bytes.
    pub client_id: String,
    /// Transport endpoint the client should connect to.
    pub hostname: String,
    /// base64url-encoded private key material.  Held by the gateway for a
    /// higher-level authentication exchange; never transmitted.
    pub private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
}
