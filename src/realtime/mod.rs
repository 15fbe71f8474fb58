//! Realtime push channel client
//!
//! Keeps a live WebSocket connection to the Baseline Monitor push endpoint:
//! - Connection establishment with fixed-delay (or opt-in exponential) reconnect
//! - Heartbeat pings while the link is open
//! - Typed dispatch of server events to subscribers
//! - Explicit start / stop / restart control

mod client;
mod state;
mod subscriptions;
mod transport;

pub use client::*;
pub use state::*;
pub use subscriptions::*;
pub use transport::*;
