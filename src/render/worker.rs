//! Background render worker
//!
//! Variant of the render loop for hosts that must never block their own
//! thread: the session moves into a dedicated worker thread that owns the
//! socket exclusively and publishes results into a single-producer
//! single-consumer channel. The controlling thread only ever reads events
//! and flips the shared cancel flag; it never touches the socket while
//! the worker lives.

use crate::error::{Error, Result};
use crate::render::sink::{FrameSink, FrameUpdate};
use crate::render::stream::{RenderDriver, RenderOptions};
use crate::session::Session;
use crate::transport::Transport;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Event published by the worker thread
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// A new accumulated frame is ready for display
    Frame(FrameUpdate),
    /// Progress update for status UI
    Progress { progress: f32, status: String },
    /// Render completed its sample budget
    Done,
    /// Server acknowledged cancellation
    Canceled,
    /// The render loop died on a channel fault
    Failed(String),
}

/// Sink that forwards everything into the event channel
struct ChannelSink {
    events: Sender<RenderEvent>,
}

impl FrameSink for ChannelSink {
    fn on_frame(&mut self, frame: FrameUpdate) {
        let _ = self.events.send(RenderEvent::Frame(frame));
    }

    fn on_done(&mut self) {
        let _ = self.events.send(RenderEvent::Done);
    }

    fn on_canceled(&mut self) {
        let _ = self.events.send(RenderEvent::Canceled);
    }

    fn on_status(&mut self, progress: f32, status: &str) {
        let _ = self.events.send(RenderEvent::Progress {
            progress,
            status: status.to_string(),
        });
    }
}

/// Handle to a render running on a background thread
pub struct RenderWorker<T: Transport + 'static> {
    handle: Option<JoinHandle<Result<Session<T>>>>,
    events: Receiver<RenderEvent>,
    cancel: Arc<AtomicBool>,
}

impl<T: Transport + 'static> RenderWorker<T> {
    /// Move the session into a worker thread and start rendering.
    ///
    /// The worker owns the session (and with it the socket) until
    /// [`RenderWorker::join`] hands it back.
    pub fn spawn(mut session: Session<T>, options: RenderOptions) -> Result<Self> {
        let (tx, rx) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name("render-worker".to_string())
            .spawn(move || {
                let mut sink = ChannelSink { events: tx.clone() };
                let result = RenderDriver::new(&mut session, flag).run(&options, &mut sink);

                if let Err(e) = &result {
                    let _ = tx.send(RenderEvent::Failed(e.to_string()));
                }

                result.map(|_| session)
            })?;

        Ok(Self {
            handle: Some(handle),
            events: rx,
            cancel,
        })
    }

    /// Event stream for the controlling thread
    pub fn events(&self) -> &Receiver<RenderEvent> {
        &self.events
    }

    /// Request cooperative cancellation; the worker sends the cancel
    /// message and keeps draining until the server acknowledges.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    /// Wait for the render to end and take the session back
    pub fn join(mut self) -> Result<Session<T>> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::Other("render worker panicked".to_string()))?,
            None => Err(Error::Other("render worker already joined".to_string())),
        }
    }
}

impl<T: Transport + 'static> Drop for RenderWorker<T> {
    fn drop(&mut self) {
        // Ask the loop to wind down and wait for it
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
