//! Inbound frame dispatch and the outbound command wrapper.
//!
//! Dispatch is pure routing into the audit log: no blocking I/O, no
//! execution.  Running a relayed controller command against a local process
//! belongs to a command executor outside this crate.

use dr_protocol::{CommandFrame, RelayFrame};
use dr_session_log::SessionLog;

/// Route one decoded frame to the audit log.
pub fn dispatch(frame: &RelayFrame, log: &SessionLog) {
    match frame {
        RelayFrame::CtlState(state) => {
            log.append(format!("New controllers: {:?}", state.controllers));
        }
        RelayFrame::CtlCmd(cmd) => {
            log.append(format!("Command: {}", cmd.command));
        }
        other => match serde_json::to_string(other) {
            Ok(json) => log.append(format!("Event: {json}")),
            Err(_) => log.append("Event: <unserializable frame>"),
        },
    }
}

/// Wrap operator argument tokens into a `command` frame.
pub fn command_frame(args: &[String]) -> RelayFrame {
    RelayFrame::Command(CommandFrame {
        data: serde_json::to_string(args).unwrap_or_default(),
    })
}
