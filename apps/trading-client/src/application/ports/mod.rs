//! Application Ports
//!
//! Driven ports the session depends on. Infrastructure adapters implement
//! them; tests substitute mocks or in-memory fakes.

mod command_transport_port;

#[cfg(test)]
pub use command_transport_port::MockCommandTransport;
pub use command_transport_port::{CommandTransport, TransportError};
