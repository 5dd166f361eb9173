//! Wire types specific to the HTTP adapter.

use serde::Deserialize;

/// Error body returned with non-success statuses.
///
/// `detail` is usually a string. Validation failures carry a list of
/// field errors instead, which is kept as raw JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// The reason as display text.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Extract the reason from an error response body, falling back to the raw text.
#[must_use]
pub fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body).map_or_else(|_| body.trim().to_string(), |err| err.message())
}
