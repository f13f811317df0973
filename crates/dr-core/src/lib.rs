// dr-core: Discovery-and-rotation relay core.
//
// Credential issuance for new controllers, the controller registry, the
// websocket session transport (operator and gateway roles), inbound event
// processing, and the process-wide session state.

pub mod backend;
pub mod error;
pub mod events;
pub mod issuer;
pub mod registry;
pub mod session;
pub mod transport;

/// Client version advertised to the backend and the relay.
pub const CLIENT_VERSION: &str = "dr16.2.4";
