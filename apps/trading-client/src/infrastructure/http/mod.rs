//! HTTP Command Transport
//!
//! `reqwest` implementation of the command transport port against the
//! trading server's REST API.

mod api_types;
mod client;

pub use api_types::ErrorBody;
pub use client::{HttpCommandTransport, HttpConfig};
