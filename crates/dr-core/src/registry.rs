//! Controller registry.
//!
//! Read-only listing of registered controllers, fetched fresh from
//! enterprise settings on every query; nothing is cached locally.

use dr_protocol::ControllerRecord;

use crate::backend::BackendClient;
use crate::error::RelayError;

/// Sort ascending by `modified`, treating a missing timestamp as the empty
/// string so unstamped records sort before all stamped ones.
pub fn sort_by_modified(records: &mut [ControllerRecord]) {
    records.sort_by(|a, b| {
        a.modified
            .as_deref()
            .unwrap_or("")
            .cmp(b.modified.as_deref().unwrap_or(""))
    });
}

/// Fetch all controller records in display order.
///
/// No pagination; the full set is assumed to fit in one response.
pub async fn list_controllers(backend: &BackendClient) -> Result<Vec<ControllerRecord>, RelayError> {
    let mut records = backend.controller_settings().await?;
    sort_by_modified(&mut records);
    Ok(records)
}

/// Look up a single controller by uid or name.
pub async fn find_controller(
    backend: &BackendClient,
    controller_ref: &str,
) -> Result<ControllerRecord, RelayError> {
    let records = backend.controller_settings().await?;
    records
        .into_iter()
        .find(|r| r.controller_uid == controller_ref || r.name == controller_ref)
        .ok_or_else(|| RelayError::ControllerNotFound(controller_ref.to_owned()))
}
