//! Connection lifecycle state machine
//!
//! A [`Session`] owns the socket for exactly one connection to the render
//! server: it performs the version handshake, tracks which named data
//! blocks have already been uploaded (the de-duplication cache), and
//! tears everything down on close. All per-connection state lives here —
//! the exporter and the render loop borrow the session, nothing is
//! process-global.

use crate::channel::MessageChannel;
use crate::error::{Error, Result};
use crate::protocol::{
    ClientMessage, HelloResult, QueryBoundResult, Serializer, ServerStateResult, WireFormat,
    PROTOCOL_VERSION,
};
use crate::transport::{TcpTransport, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;

/// Session lifecycle states
///
/// `Closed` is reachable from every state, on error or explicit close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
    Exporting,
    Rendering,
    Closed,
}

/// One client connection to the render server
pub struct Session<T: Transport> {
    channel: MessageChannel<T>,
    serializer: Serializer,
    state: SessionState,
    /// Names of data blocks already uploaded this session
    exported: HashSet<String>,
    framebuffer_size: (u32, u32),
    sample_budget: u32,
    /// Lowest interactive reduction factor used so far; the preview only
    /// ever refines, it never goes coarser mid-session
    interactive_reduction_cap: u32,
}

impl Session<TcpTransport> {
    /// Connect to the server and perform the protocol handshake.
    ///
    /// No automatic reconnect: a failed connect or a rejected handshake
    /// leaves nothing behind to retry against.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        log::info!("Connecting to render server at {}:{}", host, port);
        let transport = TcpTransport::connect(host, port)?;
        Self::establish(transport, WireFormat::default())
    }
}

impl<T: Transport> Session<T> {
    /// Build a session over an already-connected transport and perform
    /// the handshake (default wire format).
    pub fn over(transport: T) -> Result<Self> {
        Self::establish(transport, WireFormat::default())
    }

    /// As [`Session::over`] with an explicit wire format.
    pub fn with_format(transport: T, format: WireFormat) -> Result<Self> {
        Self::establish(transport, format)
    }

    fn establish(transport: T, format: WireFormat) -> Result<Self> {
        let mut session = Self {
            channel: MessageChannel::new(transport),
            serializer: Serializer::new(format),
            state: SessionState::Handshaking,
            exported: HashSet::new(),
            framebuffer_size: (0, 0),
            sample_budget: 0,
            interactive_reduction_cap: u32::MAX,
        };

        match session.handshake() {
            Ok(()) => {
                session.state = SessionState::Ready;
                Ok(session)
            }
            Err(e) => {
                session.channel.transport_mut().shutdown();
                session.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    /// Send HELLO, receive the verdict. A version mismatch or an
    /// unwilling server aborts before any scene data is sent.
    fn handshake(&mut self) -> Result<()> {
        self.send_message(&ClientMessage::Hello {
            version: PROTOCOL_VERSION,
        })?;

        let result: HelloResult = self.receive_record()?;
        if !result.success {
            log::error!("Server rejected handshake: {}", result.message);
            return Err(Error::HandshakeRejected(result.message));
        }

        log::debug!("Handshake complete (protocol version {})", PROTOCOL_VERSION);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Framebuffer dimensions announced during the last export
    pub fn framebuffer_size(&self) -> (u32, u32) {
        self.framebuffer_size
    }

    pub(crate) fn set_framebuffer_size(&mut self, width: u32, height: u32) {
        self.framebuffer_size = (width, height);
    }

    /// Sample budget of the current render
    pub fn sample_budget(&self) -> u32 {
        self.sample_budget
    }

    pub(crate) fn set_sample_budget(&mut self, samples: u32) {
        self.sample_budget = samples;
    }

    /// Clamp an interactive reduction factor so successive restarts only
    /// ever refine (coarser -> finer, never back).
    pub(crate) fn clamp_reduction_factor(&mut self, requested: u32) -> u32 {
        let factor = requested.max(1).min(self.interactive_reduction_cap);
        self.interactive_reduction_cap = factor;
        factor
    }

    // De-duplication cache -------------------------------------------------

    /// Whether a data block with this name was already uploaded
    pub fn was_exported(&self, name: &str) -> bool {
        self.exported.contains(name)
    }

    pub(crate) fn mark_exported(&mut self, name: &str) {
        self.exported.insert(name.to_string());
    }

    /// Drop one name from the cache so the next export re-sends its data
    /// block (host edited the underlying data).
    pub fn invalidate(&mut self, name: &str) {
        self.exported.remove(name);
    }

    // Message plumbing -----------------------------------------------------

    pub(crate) fn send_message(&mut self, msg: &ClientMessage) -> Result<()> {
        let payload = self.serializer.serialize(msg)?;
        self.channel.send(&payload)
    }

    pub(crate) fn send_record<M: Serialize>(&mut self, record: &M) -> Result<()> {
        let payload = self.serializer.serialize(record)?;
        self.channel.send(&payload)
    }

    pub(crate) fn receive_record<M: DeserializeOwned>(&mut self) -> Result<M> {
        let payload = self.channel.receive()?;
        self.serializer.deserialize(&payload)
    }

    pub(crate) fn channel_mut(&mut self) -> &mut MessageChannel<T> {
        &mut self.channel
    }

    // State transitions ----------------------------------------------------

    pub(crate) fn begin_export(&mut self) -> Result<()> {
        match self.state {
            SessionState::Ready => {
                self.state = SessionState::Exporting;
                Ok(())
            }
            _ => Err(Error::InvalidState("export requires a ready session")),
        }
    }

    pub(crate) fn finish_export(&mut self) {
        if self.state == SessionState::Exporting {
            self.state = SessionState::Ready;
        }
    }

    pub(crate) fn begin_render(&mut self) -> Result<()> {
        match self.state {
            SessionState::Ready => {
                self.state = SessionState::Rendering;
                Ok(())
            }
            _ => Err(Error::InvalidState("rendering requires a ready session")),
        }
    }

    pub(crate) fn finish_render(&mut self) {
        if self.state == SessionState::Rendering {
            self.state = SessionState::Ready;
        }
    }

    /// Mark the session dead after an unrecoverable channel fault.
    pub(crate) fn abort(&mut self) {
        self.channel.transport_mut().shutdown();
        self.state = SessionState::Closed;
    }

    // Queries --------------------------------------------------------------

    /// Fetch the server state dump (a JSON document)
    pub fn server_state(&mut self) -> Result<String> {
        self.require_ready()?;
        self.send_message(&ClientMessage::GetServerState)?;
        let result: ServerStateResult = self.receive_record()?;
        Ok(result.state)
    }

    /// Query the bound of a named data block
    pub fn query_bound(&mut self, name: &str) -> Result<QueryBoundResult> {
        self.require_ready()?;
        self.send_message(&ClientMessage::QueryBound {
            name: name.to_string(),
        })?;
        self.receive_record()
    }

    fn require_ready(&self) -> Result<()> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(Error::InvalidState("session is not ready"))
        }
    }

    /// Say goodbye and close the connection.
    ///
    /// The BYE is best-effort: if the peer is already gone the socket is
    /// closed regardless. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Err(e) = self.send_message(&ClientMessage::Bye) {
            log::debug!("BYE not delivered: {}", e);
        }

        self.channel.transport_mut().shutdown();
        self.exported.clear();
        self.state = SessionState::Closed;
        log::info!("Session closed");
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::MockTransport;

    /// Frame a record the way the server would send it
    pub(crate) fn server_frame<M: Serialize>(record: &M) -> Vec<u8> {
        let payload = Serializer::default().serialize(record).unwrap();
        let mut out = (payload.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&payload);
        out
    }

    /// Decode every framed client message written to the mock transport
    pub(crate) fn decode_client_frames(written: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset + 4 <= written.len() {
            let len = u32::from_le_bytes([
                written[offset],
                written[offset + 1],
                written[offset + 2],
                written[offset + 3],
            ]) as usize;
            frames.push(written[offset + 4..offset + 4 + len].to_vec());
            offset += 4 + len;
        }
        frames
    }

    pub(crate) fn accepting_mock() -> MockTransport {
        let mock = MockTransport::new();
        mock.inject_read(&server_frame(&HelloResult {
            success: true,
            message: String::new(),
        }));
        mock
    }

    #[test]
    fn test_handshake_success() {
        let mock = accepting_mock();
        let session = Session::over(mock.clone()).unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        // First client frame must be HELLO with our protocol version
        let frames = decode_client_frames(&mock.written());
        let hello: ClientMessage = Serializer::default().deserialize(&frames[0]).unwrap();
        assert_eq!(
            hello,
            ClientMessage::Hello {
                version: PROTOCOL_VERSION
            }
        );
    }

    #[test]
    fn test_handshake_rejected() {
        let mock = MockTransport::new();
        mock.inject_read(&server_frame(&HelloResult {
            success: false,
            message: "client protocol version 2 does not match our version 3".to_string(),
        }));

        match Session::over(mock) {
            Err(Error::HandshakeRejected(msg)) => {
                assert!(msg.contains("does not match"));
            }
            _ => panic!("expected HandshakeRejected"),
        }
    }

    #[test]
    fn test_handshake_peer_gone() {
        // Server closes without answering HELLO
        let mock = MockTransport::new();
        match Session::over(mock) {
            Err(Error::ConnectionReset) => {}
            _ => panic!("expected ConnectionReset"),
        }
    }

    #[test]
    fn test_close_sends_bye_and_is_idempotent() {
        let mock = accepting_mock();
        let mut session = Session::over(mock.clone()).unwrap();
        mock.clear_written();

        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);

        let frames = decode_client_frames(&mock.written());
        assert_eq!(frames.len(), 1);
        let bye: ClientMessage = Serializer::default().deserialize(&frames[0]).unwrap();
        assert_eq!(bye, ClientMessage::Bye);
    }

    #[test]
    fn test_dedup_cache() {
        let mock = accepting_mock();
        let mut session = Session::over(mock).unwrap();

        assert!(!session.was_exported("mesh.001"));
        session.mark_exported("mesh.001");
        assert!(session.was_exported("mesh.001"));

        session.invalidate("mesh.001");
        assert!(!session.was_exported("mesh.001"));
    }

    #[test]
    fn test_server_state_query() {
        let mock = accepting_mock();
        mock.inject_read(&server_frame(&ServerStateResult {
            state: "{\"renderer\": \"scivis\"}".to_string(),
        }));

        let mut session = Session::over(mock).unwrap();
        let state = session.server_state().unwrap();
        assert!(state.contains("scivis"));
    }

    #[test]
    fn test_query_bound() {
        let mock = accepting_mock();
        mock.inject_read(&server_frame(&QueryBoundResult {
            success: true,
            message: String::new(),
            bound: Some([-1.0, -1.0, -1.0, 1.0, 1.0, 1.0]),
        }));

        let mut session = Session::over(mock).unwrap();
        let result = session.query_bound("volume.cloud").unwrap();
        assert!(result.success);
        assert_eq!(result.bound.unwrap()[3], 1.0);
    }

    #[test]
    fn test_render_requires_ready_state() {
        let mock = accepting_mock();
        let mut session = Session::over(mock).unwrap();
        session.begin_render().unwrap();

        // A second render (or an export) cannot start while rendering
        assert!(session.begin_render().is_err());
        assert!(session.begin_export().is_err());

        session.finish_render();
        assert_eq!(session.state(), SessionState::Ready);
    }
}
