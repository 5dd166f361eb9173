//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the command client and the trading session, plus
//! the port the HTTP adapter implements.

/// Port interfaces for external systems.
pub mod ports;

/// Command client and session orchestration.
pub mod services;
