//! Event Stream Adapter
//!
//! WebSocket connection management and event decoding.
//!
//! # Components
//!
//! - [`ConnectionManager`]: connect, liveness probing, reconnect with backoff
//! - [`HeartbeatManager`]: probe timer and staleness detection
//! - [`ReconnectPolicy`]: exponential backoff with jitter and stable reset
//! - [`EventDecoder`]: JSON wire format to [`ServerEvent`](crate::domain::reconciliation::ServerEvent)

mod codec;
mod connection;
mod heartbeat;
mod reconnect;

pub use codec::{DecodeError, EventDecoder};
pub use connection::{
    ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager, DEFAULT_EVENT_CAPACITY,
    spawn,
};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
