//! Progressive render-result streaming

mod sink;
mod stream;
mod worker;

pub use sink::{CollectingSink, FrameSink, FrameUpdate};
pub use stream::{RenderDriver, RenderOptions, RenderOutcome};
pub use worker::{RenderEvent, RenderWorker};
