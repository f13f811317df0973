//! Credential issuer.
//!
//! Mints the single-use bootstrap credential for a new controller and
//! registers the controller's identity server-side.  The credential is
//! either the raw one-time token (cheap path) or a fully materialized
//! client configuration when `config_init` is requested.
//!
//! There is no rollback: the token is issued before the identity upsert, so
//! a failing upsert leaves the token spent or dangling.  That partial state
//! is surfaced to the caller as the upsert's error, never swallowed.

use std::path::PathBuf;

use base64::prelude::{BASE64_STANDARD, BASE64_URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use dr_protocol::{ClientConfig, ControllerRecord, ENTERPRISE_SETTING_TYPE};

use crate::backend::{AddClientRequest, BackendClient};
use crate::error::RelayError;

/// Minutes before an unredeemed one-time token expires.
const TOKEN_FIRST_ACCESS_EXPIRE_MIN: u32 = 5;

/// Output shape for a materialized client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigInit {
    /// Inline JSON.
    Json,
    /// Base64 of the JSON.
    Base64,
    /// JSON written to this path; the credential printed is the path.
    File(PathBuf),
}

impl ConfigInit {
    /// `json` and `b64` select inline formats; anything else is a file path.
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => ConfigInit::Json,
            "b64" | "base64" => ConfigInit::Base64,
            path => ConfigInit::File(PathBuf::from(path)),
        }
    }
}

/// The credential handed to the operator for out-of-band distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCredential {
    /// Raw one-time token.
    Token(String),
    /// Serialized client configuration (or the path it was written to).
    Config(String),
}

impl ControllerCredential {
    pub fn value(&self) -> &str {
        match self {
            ControllerCredential::Token(v) | ControllerCredential::Config(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateControllerRequest {
    pub controller_name: String,
    /// Application name or uid the controller belongs to.
    pub application_ref: String,
    pub config_init: Option<ConfigInit>,
}

/// Client id for the cheap path: the hash of the raw one-time token.
///
/// The backend treats the id as opaque; the only contract is that the same
/// token always hashes to the same id.
pub fn derive_client_id(one_time_token: &str) -> String {
    let digest = Sha256::digest(one_time_token.as_bytes());
    BASE64_URL_SAFE_NO_PAD.encode(digest)
}

/// Freshly generated opaque controller uid: 16 random bytes, base64url.
pub fn generate_uid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Create a controller identity and return its bootstrap credential.
///
/// Steps: resolve the application, issue one single-use token (locked to the
/// first redeeming IP, 5-minute redemption window, unlimited access after
/// that), derive the client id, then upsert the controller record keyed by a
/// fresh uid.  Exactly one server-side record is created per successful call.
pub async fn create_controller(
    backend: &BackendClient,
    request: &CreateControllerRequest,
) -> Result<(ControllerCredential, ControllerRecord), RelayError> {
    if request.controller_name.trim().is_empty() {
        return Err(RelayError::EmptyControllerName);
    }

    let app_uid = backend.resolve_application(&request.application_ref).await?;
    let client_name = format!("{}-ctr", request.controller_name);

    let tokens = backend
        .add_client(&AddClientRequest {
            app_uid,
            count: 1,
            unlock_ip: true,
            first_access_expire_on: TOKEN_FIRST_ACCESS_EXPIRE_MIN,
            access_expire_in_min: None,
            client_name,
        })
        .await?;
    let one_time_token = tokens
        .into_iter()
        .next()
        .ok_or_else(|| RelayError::TokenIssuance("backend returned no tokens".to_owned()))?;

    let (credential, client_id) = match &request.config_init {
        None => (
            ControllerCredential::Token(one_time_token.clone()),
            derive_client_id(&one_time_token),
        ),
        Some(init) => {
            let config = backend.init_client_config(&one_time_token).await?;
            let client_id = config.client_id.clone();
            let rendered = render_config(&config, init)?;
            (ControllerCredential::Config(rendered), client_id)
        }
    };

    let record = ControllerRecord {
        controller_uid: generate_uid(),
        name: request.controller_name.clone(),
        created: None,
        modified: None,
        client_id,
    };
    let settings = serde_json::to_value(&record)
        .map_err(|e| RelayError::Backend(format!("encoding controller record: {e}")))?;
    backend
        .put_enterprise_setting(ENTERPRISE_SETTING_TYPE, settings)
        .await?;

    Ok((credential, record))
}

fn render_config(config: &ClientConfig, init: &ConfigInit) -> Result<String, RelayError> {
    let json = serde_json::to_string(config)
        .map_err(|e| RelayError::Backend(format!("encoding client config: {e}")))?;
    match init {
        ConfigInit::Json => Ok(json),
        ConfigInit::Base64 => Ok(BASE64_STANDARD.encode(json)),
        ConfigInit::File(path) => {
            std::fs::write(path, &json)?;
            Ok(path.display().to_string())
        }
    }
}
