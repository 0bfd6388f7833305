use std::fmt;

use serde::{Deserialize, Serialize};

/// Payload of an inbound `{ "error": ... }` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
}

impl ServerError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_code: None,
        }
    }

    pub fn with_code(mut self, error_code: u16) -> Self {
        self.error_code = Some(error_code);
        self
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)
    }
}

/// A frame that could not be mapped onto any known server message.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FrameDecodeError(#[from] serde_json::Error);
