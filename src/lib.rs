//! renderlink - scene synchronization and streaming render client
//!
//! This library speaks a length-prefixed binary protocol to a remote
//! rendering server: it uploads a scene description (cameras, lights,
//! meshes, materials, plugin-generated data) with de-duplication of named
//! data blocks, starts a render, and streams back progressively refined
//! framebuffer results with cooperative cancellation.
//!
//! ## Layering
//!
//! - [`transport`]: raw byte streams (TCP, plus a mock for tests)
//! - [`channel`]: length-prefixed message framing
//! - [`protocol`]: typed wire records and their serialization
//! - [`session`]: connection lifecycle, handshake, de-duplication cache
//! - [`scene`]: the read-only host scene interface the exporter consumes
//! - [`export`]: the scene graph encoder
//! - [`render`]: the progressive render-result streaming loop

pub mod channel;
pub mod config;
pub mod error;
pub mod export;
pub mod protocol;
pub mod render;
pub mod scene;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use export::{ExportStats, SceneExporter};
pub use render::{
    FrameSink, FrameUpdate, RenderDriver, RenderEvent, RenderOptions, RenderOutcome, RenderWorker,
};
pub use session::{Session, SessionState};
