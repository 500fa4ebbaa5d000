//! TCP transport over a blocking socket

use super::Transport;
use crate::error::Result;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

/// Blocking TCP transport
///
/// The socket stays in blocking mode for all reads and writes; readiness
/// polling briefly flips it to non-blocking for a one-byte peek and
/// restores blocking mode before returning.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to the render server
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Wrap an already-connected stream
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.stream.peer_addr().ok()
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buffer)?)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.stream.write(data)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.stream.flush()?)
    }

    fn readable(&mut self) -> Result<bool> {
        self.stream.set_nonblocking(true)?;
        let mut probe = [0u8; 1];
        let res = self.stream.peek(&mut probe);
        self.stream.set_nonblocking(false)?;

        match res {
            // Ok(0) is EOF; report readable so the caller's next read
            // observes the close instead of spinning here forever
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
