//! Wire protocol: message records and serialization

pub mod messages;
pub mod wire;

pub use messages::*;
pub use wire::{Serializer, WireFormat};

/// Protocol version exchanged in the HELLO handshake.
///
/// Bumped whenever a wire record changes shape; the server refuses
/// mismatched clients before any scene data is sent.
pub const PROTOCOL_VERSION: u32 = 2;
