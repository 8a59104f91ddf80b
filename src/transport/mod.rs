//! WebSocket transport glue shared by the HTTP server's signaling route.

#[cfg(feature = "webrtc-streaming")]
pub mod signaling_server;

#[cfg(feature = "webrtc-streaming")]
pub use signaling_server::handle_signaling_connection;
