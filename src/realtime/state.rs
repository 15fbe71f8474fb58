//! Observable connection state and counters

use std::fmt;

/// Lifecycle of the push channel link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// Not started, or stopped
    #[default]
    Idle,
    /// Handshake in flight
    Connecting,
    /// Link is up; the only state in which the client counts as connected
    Open,
    /// Local close in progress
    Closing,
    /// Link lost, waiting for the reconnect timer
    Backoff,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Connecting => "connecting",
            LinkState::Open => "open",
            LinkState::Closing => "closing",
            LinkState::Backoff => "backoff",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running counters for one client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Connection attempts started (initial and reconnects)
    pub connect_attempts: u64,

    /// Attempts that reached the open state
    pub connections_opened: u64,

    /// Reconnect timers armed after a close
    pub reconnects_scheduled: u64,

    /// Text or binary frames received
    pub frames_received: u64,

    /// Frames dropped because they could not be parsed
    pub frames_dropped: u64,

    /// Events handed to a subscriber
    pub events_dispatched: u64,

    /// Heartbeat pings written to the link
    pub pings_sent: u64,

    /// Subscriber invocations that panicked
    pub handler_faults: u64,
}
