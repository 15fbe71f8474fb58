//! Baseline Monitor realtime client
//!
//! Maintains a self-healing WebSocket connection to the Baseline Monitor push
//! endpoint and dispatches typed compliance events to subscribers.
//!
//! ```ignore
//! use baseline_realtime::{Handlers, RealtimeClient, RealtimeSettings};
//!
//! let handlers = Handlers::new()
//!     .on_violation_created(|v| println!("violation: {:?}", v));
//! let client = RealtimeClient::spawn(RealtimeSettings::default(), handlers)?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod realtime;
pub mod version;

pub use config::{LoggingSettings, MonitorConfig, RealtimeSettings, ReconnectStrategy};
pub use error::{Error, ErrorCode, Result};
pub use protocol::{EventTag, ServerEvent};
pub use realtime::{
    ConnectionStats, Connector, Handlers, LinkState, RealtimeClient, SubscriptionToken,
};
