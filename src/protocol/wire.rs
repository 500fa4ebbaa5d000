//! Wire format serialization abstraction
//!
//! Two wire formats are supported for framed payloads:
//!
//! - **Postcard** (default): compact binary, enum discriminants encoded
//!   as variant indices, the production format.
//! - **JSON**: human-readable, for debugging against a server started in
//!   JSON mode or for dumping captured traffic.
//!
//! Both sides of a connection must agree on the format; there is no
//! in-band negotiation beyond the HELLO version check.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Binary format using postcard - fast and compact
    #[default]
    Postcard,
    /// JSON format - human-readable for debugging
    Json,
}

/// Serializer that can handle both formats
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    /// Create a new serializer for the given format
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Serialize a record to payload bytes
    pub fn serialize<M: Serialize>(&self, msg: &M) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Postcard => {
                postcard::to_allocvec(msg).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(msg).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Deserialize payload bytes to a record
    pub fn deserialize<M: DeserializeOwned>(&self, bytes: &[u8]) -> Result<M> {
        match self.format {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new(WireFormat::default())
    }
}
