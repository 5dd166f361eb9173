//! Application Services
//!
//! The command client talks to the server; the session ties it to the
//! reconciliation store, the event stream and subscribers.

mod command_client;
mod session;

pub use command_client::{CommandClient, SnapshotScope, map_transport_error};
pub use session::{SessionConfig, SharedSession, TradingSession};
