//! Configuration Module
//!
//! Configuration loading for the trading client.

mod settings;

pub use settings::{
    ClientConfig, ConfigError, Credentials, EndpointSettings, StreamSettings,
};
