//! Mock transport for testing

use super::Transport;
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock transport for unit testing
///
/// Reads come from an injected buffer, writes are captured for later
/// inspection. `set_max_read_chunk` limits how many bytes a single read
/// may return, which simulates a network delivering data in small
/// fragments. An exhausted read buffer behaves like a closed peer
/// (reads return 0).
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    max_read_chunk: usize,
    read_closed: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                max_read_chunk: usize::MAX,
                read_closed: false,
            })),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_buffer.extend(data);
    }

    /// Limit how many bytes a single read call may return
    pub fn set_max_read_chunk(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_read_chunk = n.max(1);
    }

    /// Get all written data
    pub fn written(&self) -> Vec<u8> {
        let inner = self.inner.lock().unwrap();
        inner.write_buffer.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.write_buffer.clear();
    }

    /// Number of unread injected bytes
    pub fn pending_read(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.read_buffer.len()
    }

    /// Simulate the peer closing its write side: once the injected bytes
    /// are drained, readiness polls report data (the pending EOF) and
    /// reads return 0.
    pub fn close_read(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.read_closed = true;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let available = inner
            .read_buffer
            .len()
            .min(buffer.len())
            .min(inner.max_read_chunk);

        for item in buffer.iter_mut().take(available) {
            *item = inner.read_buffer.pop_front().unwrap();
        }

        // 0 when drained: the peer has "closed"
        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn readable(&mut self) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(!inner.read_buffer.is_empty() || inner.read_closed)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
