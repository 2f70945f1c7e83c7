use serde::{Deserialize, Serialize};

use crate::constants::ENVELOPE_TYPE_TEXT;
use crate::error::EnvelopeError;

/// Typed payload wrapped around every message before encryption:
/// `{"type":"text","payload":{"body":"..."}}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: EnvelopePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvelopePayload {
    pub body: String,
}

impl MessageEnvelope {
    /// Wrap a plain text message
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: ENVELOPE_TYPE_TEXT.to_string(),
            payload: EnvelopePayload { body: body.into() },
        }
    }

    /// Serialize to compact JSON
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from decrypted bytes
    pub fn from_json(data: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Extract the text body, rejecting envelope types this client does not
    /// understand.
    pub fn into_text(self) -> Result<String, EnvelopeError> {
        if self.kind != ENVELOPE_TYPE_TEXT {
            return Err(EnvelopeError::UnsupportedType(self.kind));
        }
        Ok(self.payload.body)
    }
}
