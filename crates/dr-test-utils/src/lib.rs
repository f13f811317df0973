// dr-test-utils: Shared helpers for relay integration tests.

pub mod mock_relay_server;

pub use mock_relay_server::MockRelayServer;
