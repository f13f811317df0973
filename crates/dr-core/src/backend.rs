//! Backend RPC client.
//!
//! The backend speaks a single-endpoint JSON command protocol: every request
//! is a POST of an envelope with a top-level `command` field, every response
//! carries `"result": "success" | "fail"` plus command-specific fields.
//! Transport and HTTP-status failures map to [`RelayError::Backend`];
//! application-level failures are mapped per command so that lookup and
//! issuance errors keep their own variants.

use serde_json::{Value, json};

use dr_protocol::{ClientConfig, ControllerRecord, ENTERPRISE_SETTING_TYPE};

use crate::error::RelayError;

/// Parameters for a one-time-token issuance request.
#[derive(Debug, Clone)]
pub struct AddClientRequest {
    pub app_uid: String,
    pub count: u32,
    /// Lock the token to the first IP that redeems it.
    pub unlock_ip: bool,
    /// Minutes until an unredeemed token expires.
    pub first_access_expire_on: u32,
    /// `None` = the client's access never expires.
    pub access_expire_in_min: Option<u32>,
    pub client_name: String,
}

pub struct BackendClient {
    base_url: String,
    session_token: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session_token: session_token.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Upsert one enterprise setting record.
    pub async fn put_enterprise_setting(
        &self,
        setting_type: &str,
        settings: Value,
    ) -> Result<(), RelayError> {
        let rq = json!({
            "command": "put_enterprise_setting",
            "type": setting_type,
            "settings": settings,
        });
        self.communicate(&rq).await.map(|_| ())
    }

    /// Fetch enterprise settings for the given types.
    pub async fn get_enterprise_setting(&self, include: &[&str]) -> Result<Value, RelayError> {
        let rq = json!({
            "command": "get_enterprise_setting",
            "include": include,
        });
        self.communicate(&rq).await
    }

    /// Fetch all controller records, unordered.
    pub async fn controller_settings(&self) -> Result<Vec<ControllerRecord>, RelayError> {
        let body = self.get_enterprise_setting(&[ENTERPRISE_SETTING_TYPE]).await?;
        match body.get(ENTERPRISE_SETTING_TYPE) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(list) => serde_json::from_value(list.clone()).map_err(|e| {
                RelayError::Backend(format!(
                    "malformed {ENTERPRISE_SETTING_TYPE} records: {e}"
                ))
            }),
        }
    }

    /// Resolve an application name or uid to its uid.
    pub async fn resolve_application(&self, app_ref: &str) -> Result<String, RelayError> {
        let rq = json!({
            "command": "get_application",
            "application": app_ref,
        });
        let body = self.communicate_raw(&rq).await?;
        if is_fail(&body) {
            if result_code(&body) == Some("app_not_found") {
                return Err(RelayError::ApplicationNotFound(app_ref.to_owned()));
            }
            return Err(RelayError::Backend(fail_message(&body)));
        }
        body.get("appUid")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| RelayError::Backend("get_application response missing appUid".to_owned()))
    }

    /// Request one or more one-time tokens for an application.
    pub async fn add_client(&self, rq: &AddClientRequest) -> Result<Vec<String>, RelayError> {
        let envelope = json!({
            "command": "add_client",
            "appUid": rq.app_uid,
            "count": rq.count,
            "unlockIp": rq.unlock_ip,
            "firstAccessExpireOn": rq.first_access_expire_on,
            "accessExpireInMin": rq.access_expire_in_min,
            "clientName": rq.client_name,
        });
        let body = self.communicate_raw(&envelope).await?;
        if is_fail(&body) {
            return Err(RelayError::TokenIssuance(fail_message(&body)));
        }
        let tokens: Vec<String> = body
            .get("tokens")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        if tokens.is_empty() {
            return Err(RelayError::TokenIssuance(
                "backend returned no tokens".to_owned(),
            ));
        }
        Ok(tokens)
    }

    /// Redeem a one-time token for a full client configuration.
    ///
    /// The token is spent by this call; the returned configuration is the
    /// credential of record from here on.
    pub async fn init_client_config(&self, one_time_token: &str) -> Result<ClientConfig, RelayError> {
        let rq = json!({
            "command": "init_client_config",
            "oneTimeToken": one_time_token,
        });
        let body = self.communicate(&rq).await?;
        let config = body.get("config").cloned().ok_or_else(|| {
            RelayError::Backend("init_client_config response missing config".to_owned())
        })?;
        serde_json::from_value(config)
            .map_err(|e| RelayError::Backend(format!("malformed client config: {e}")))
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// POST one envelope; application-level failures map to `Backend`.
    async fn communicate(&self, rq: &Value) -> Result<Value, RelayError> {
        let body = self.communicate_raw(rq).await?;
        if is_fail(&body) {
            return Err(RelayError::Backend(fail_message(&body)));
        }
        Ok(body)
    }

    /// POST one envelope and return the parsed body, `"result": "fail"`
    /// included, for callers that map failures per command.
    async fn communicate_raw(&self, rq: &Value) -> Result<Value, RelayError> {
        let response = self
            .http
            .post(&self.base_url)
            .header("ClientVersion", crate::CLIENT_VERSION)
            .header("Auth", format!("User {}", self.session_token))
            .json(rq)
            .send()
            .await
            .map_err(|e| RelayError::Backend(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Backend(format!("HTTP {status}")));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| RelayError::Backend(format!("malformed response: {e}")))
    }
}

fn is_fail(body: &Value) -> bool {
    body.get("result").and_then(Value::as_str) == Some("fail")
}

fn result_code(body: &Value) -> Option<&str> {
    body.get("resultCode").and_then(Value::as_str)
}

fn fail_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .or_else(|| result_code(body))
        .map(str::to_owned)
        .unwrap_or_else(|| "backend rejected request".to_owned())
}
