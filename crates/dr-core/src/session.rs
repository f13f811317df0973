//! Process-wide session state.
//!
//! Holds zero or one live [`SessionTransport`] for the operator process.
//! An explicit state object, passed by reference into every command that
//! needs it, rather than an implicit global.  Redundant connect/disconnect
//! calls are advisory warnings, not errors.

use std::path::Path;

use tracing::warn;

use dr_session_log::SessionLog;

use crate::error::RelayError;
use crate::events;
use crate::transport::SessionTransport;

#[derive(Default)]
pub struct DrSession {
    transport: Option<SessionTransport>,
}

impl DrSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn transport(&self) -> Option<&SessionTransport> {
        self.transport.as_ref()
    }

    /// Create and connect the operator transport, bound to this process
    /// session's short-lived token.  A no-op with a warning when a
    /// connection already exists; the existing connection is preserved.
    pub fn connect(
        &mut self,
        relay_url: &str,
        session_token: &str,
        log_folder: &Path,
    ) -> Result<(), RelayError> {
        if self.transport.is_some() {
            warn!("Connection exists");
            return Ok(());
        }
        let log = SessionLog::create(log_folder)?;
        let transport = SessionTransport::operator(relay_url, session_token, log);
        transport.connect()?;
        self.transport = Some(transport);
        Ok(())
    }

    /// Tear down and clear the transport.  A no-op with a warning when no
    /// connection exists.
    pub async fn disconnect(&mut self) {
        match self.transport.take() {
            None => warn!("Connection doesn't exist"),
            Some(transport) => transport.disconnect().await,
        }
    }

    /// Wrap operator argument tokens into a `command` frame and send it.
    pub fn send_command(&self, args: &[String]) -> Result<(), RelayError> {
        match &self.transport {
            None => {
                warn!("Connection doesn't exist");
                Ok(())
            }
            Some(transport) => {
                transport.send(&events::command_frame(args))?;
                Ok(())
            }
        }
    }
}
