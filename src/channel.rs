//! Framed message channel
//!
//! # Wire framing
//!
//! All protocol messages travel as length-prefixed frames:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Little-endian u32│ Postcard or JSON record  │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! Two transfers are *not* framed this way: the raw vertex/index arrays
//! that follow a mesh metadata message, and the encoded image bytes that
//! follow a `Frame` render result. Their sizes are announced inside the
//! preceding message and they are moved with [`MessageChannel::send_raw`]
//! and [`MessageChannel::receive_raw`].
//!
//! The channel completes partial reads and writes itself (a single
//! `read`/`write` on the transport may move fewer bytes than requested)
//! but performs no buffering or retries beyond the current logical
//! transfer. A transport read returning 0 bytes before the expected count
//! is a peer close and surfaces as [`Error::ConnectionReset`]; the stream
//! is in an unknown state afterwards and the session must be torn down.

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Upper bound on a single framed payload.
///
/// Generous enough for any settings record; a prefix above this is
/// treated as stream corruption rather than a legitimate message.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Length-prefixed framing over a [`Transport`]
///
/// Callers must keep a single-writer discipline per channel; the channel
/// itself does no locking.
pub struct MessageChannel<T: Transport> {
    transport: T,
}

impl<T: Transport> MessageChannel<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Send one framed message: 4-byte little-endian length prefix
    /// followed by the payload.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let prefix = (payload.len() as u32).to_le_bytes();
        self.write_all(&prefix)?;
        self.write_all(payload)?;
        self.transport.flush()
    }

    /// Receive one framed message and return its payload.
    pub fn receive(&mut self) -> Result<Vec<u8>> {
        let mut prefix = [0u8; 4];
        self.read_exact(&mut prefix)?;

        let len = u32::from_le_bytes(prefix) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge(len));
        }

        let mut payload = vec![0u8; len];
        self.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Send raw bytes with no framing (size was announced out-of-band).
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)?;
        self.transport.flush()
    }

    /// Receive exactly `n` raw bytes whose count was announced inside a
    /// preceding message rather than by a length prefix.
    pub fn receive_raw(&mut self, n: usize) -> Result<Vec<u8>> {
        if n > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge(n));
        }
        let mut buffer = vec![0u8; n];
        self.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Non-blocking check for available data
    pub fn readable(&mut self) -> Result<bool> {
        self.transport.readable()
    }

    /// Access the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buffer.len() {
            let n = self.transport.read(&mut buffer[filled..])?;
            if n == 0 {
                return Err(Error::ConnectionReset);
            }
            filled += n;
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = self.transport.write(&data[written..])?;
            if n == 0 {
                return Err(Error::ConnectionReset);
            }
            written += n;
        }
        Ok(())
    }
}
