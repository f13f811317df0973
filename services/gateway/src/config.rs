//! Gateway configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/dr-gateway/gateway.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `relay.url`
//! - Either `auth.config_file` (path to a JSON client configuration) or
//!   `auth.client_id` (base64url). When both are present the config file
//!   wins, since its embedded identity is the credential of record.

use std::path::{Path, PathBuf};

use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;

use dr_protocol::ClientConfig;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level gateway configuration, validated and decoded.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub schema_version: u32,
    pub relay_url: String,
    /// Raw client id bytes; re-encoded as base64url at handshake time.
    pub client_id: Vec<u8>,
    /// Present only when the identity came from a client configuration file.
    pub private_key: Option<Vec<u8>>,
    pub log_folder: PathBuf,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    relay: Option<RawRelayConfig>,
    auth: Option<RawAuthConfig>,
    log: Option<RawLogConfig>,
}

#[derive(Debug, Deserialize)]
struct RawRelayConfig {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAuthConfig {
    config_file: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLogConfig {
    folder: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load gateway config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load gateway config from the default path `/etc/dr-gateway/gateway.toml`.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/dr-gateway/gateway.toml"))
}

/// Load gateway config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let raw_relay = raw
        .relay
        .ok_or_else(|| ConfigError::MissingField("relay".to_owned()))?;
    let relay_url = raw_relay
        .url
        .ok_or_else(|| ConfigError::MissingField("relay.url".to_owned()))?;

    let raw_auth = raw
        .auth
        .ok_or_else(|| ConfigError::MissingField("auth".to_owned()))?;
    let (client_id, private_key) = match (raw_auth.config_file, raw_auth.client_id) {
        (Some(config_file), _) => {
            let config = read_client_config(&config_file)?;
            let client_id = decode_b64url("config file clientId", &config.client_id)?;
            let private_key = decode_b64url("config file privateKey", &config.private_key)?;
            (client_id, Some(private_key))
        }
        (None, Some(encoded)) => (decode_b64url("auth.client_id", &encoded)?, None),
        (None, None) => {
            return Err(ConfigError::MissingField(
                "auth.config_file or auth.client_id".to_owned(),
            ));
        }
    };
    if client_id.is_empty() {
        return Err(ConfigError::InvalidValue("client id is empty".to_owned()));
    }

    let log_folder = raw
        .log
        .and_then(|l| l.folder)
        .unwrap_or_else(|| "dr-logs".to_owned());

    Ok(GatewayConfig {
        schema_version,
        relay_url,
        client_id,
        private_key,
        log_folder: PathBuf::from(log_folder),
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_client_config(path: &str) -> Result<ClientConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading client config '{path}': {e}")))?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::Parse(format!("client config '{path}': {e}")))
}

/// Decode base64url, tolerating padded input.
fn decode_b64url(what: &str, encoded: &str) -> Result<Vec<u8>, ConfigError> {
    BASE64_URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| ConfigError::InvalidValue(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_toml(auth: &str) -> String {
        format!(
            r#"
schema_version = 1

[relay]
url = "wss://relay.example.com/ws"

[auth]
{auth}
"#
        )
    }

    #[test]
    fn inline_client_id_decodes_and_defaults_log_folder() {
        let config =
            load_config_from_str(&minimal_toml(r#"client_id = "AQL-_w==""#)).expect("load");
        assert_eq!(config.client_id, vec![0x01, 0x02, 0xfe, 0xff]);
        assert!(config.private_key.is_none());
        assert_eq!(config.log_folder, PathBuf::from("dr-logs"));
        assert_eq!(config.relay_url, "wss://relay.example.com/ws");
    }

    #[test]
    fn config_file_identity_wins_over_inline_client_id() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"clientId":"AQL-_w","hostname":"relay.example.com","privateKey":"BAU"}}"#
        )
        .expect("write");
        let auth = format!(
            "config_file = \"{}\"\nclient_id = \"zzzz\"",
            file.path().display()
        );
        let config = load_config_from_str(&minimal_toml(&auth)).expect("load");
        assert_eq!(config.client_id, vec![0x01, 0x02, 0xfe, 0xff]);
        assert_eq!(config.private_key, Some(vec![0x04, 0x05]));
    }

    #[test]
    fn missing_auth_is_rejected() {
        let toml_str = r#"
schema_version = 1

[relay]
url = "wss://relay.example.com/ws"
"#;
        let err = load_config_from_str(toml_str).expect_err("must fail");
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let toml_str = minimal_toml(r#"client_id = "AQL-_w""#)
            .replace("schema_version = 1", "schema_version = 2");
        let err = load_config_from_str(&toml_str).expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn missing_relay_url_is_rejected() {
        let toml_str = r#"
schema_version = 1

[relay]

[auth]
client_id = "AQL-_w"
"#;
        let err = load_config_from_str(toml_str).expect_err("must fail");
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn log_folder_override_is_honored() {
        let toml_str = format!(
            "{}\n[log]\nfolder = \"/var/log/dr\"\n",
            minimal_toml(r#"client_id = "AQL-_w""#)
        );
        let config = load_config_from_str(&toml_str).expect("load");
        assert_eq!(config.log_folder, PathBuf::from("/var/log/dr"));
    }

    #[test]
    fn garbage_base64_is_an_invalid_value() {
        let err = load_config_from_str(&minimal_toml(r#"client_id = "!!not-base64!!""#))
            .expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }
}
