//! HTTP surface: session creation, a live CBOR data feed over WebSocket,
//! and (when `webrtc-streaming` is enabled) the signaling upgrade.

pub mod http_server;
pub mod state;

pub use http_server::run_http_server;
pub use state::AppState;
