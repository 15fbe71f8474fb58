//! Push channel protocol
//!
//! Defines the frames exchanged with the Baseline Monitor push endpoint.
//! The protocol is JSON text over WebSocket: server events carry an
//! `event` tag plus `data`, heartbeat control frames carry a `type`.

mod messages;

pub use messages::*;
