//! Cooperative polling render loop
//!
//! After the scene is uploaded the client asks the server to render and
//! then consumes a stream of [`RenderResult`]s. The loop never blocks on
//! the socket: it polls for readability and sleeps briefly when nothing
//! is pending, so a host event loop driving it stays responsive.
//!
//! Cancellation is cooperative and two-phase: when the externally
//! supplied flag is first observed, one CANCEL_RENDERING message goes out
//! (guarded so it can never be sent twice) and the loop keeps consuming
//! results until the server acknowledges with Canceled — or with Done, if
//! the render won the race. A local abort would leave framebuffer bytes
//! in flight and the stream unusable for the BYE/close sequence.

use crate::config::RenderConfig;
use crate::error::Result;
use crate::protocol::{ClientMessage, RenderMode, RenderResult};
use crate::render::sink::{FrameSink, FrameUpdate};
use crate::session::Session;
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Parameters for one render request
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub mode: RenderMode,
    pub samples: u32,
    /// Initial resolution reduction for interactive mode; only ever
    /// decreases across successive restarts
    pub reduction_factor: u32,
    /// Send every Nth framebuffer during final renders
    pub update_rate: u32,
}

impl RenderOptions {
    pub fn final_render(config: &RenderConfig) -> Self {
        Self {
            mode: RenderMode::Final,
            samples: config.samples,
            reduction_factor: 1,
            update_rate: config.update_rate,
        }
    }

    pub fn interactive(config: &RenderConfig) -> Self {
        Self {
            mode: RenderMode::Interactive,
            samples: config.samples,
            reduction_factor: config.reduction_factor.max(1),
            update_rate: 1,
        }
    }
}

/// How a render loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Server completed the sample budget
    Finished { frames: u32 },
    /// Server acknowledged our cancellation
    Canceled { frames: u32 },
}

/// Drives one render on a session
pub struct RenderDriver<'a, T: Transport> {
    session: &'a mut Session<T>,
    cancel: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl<'a, T: Transport> RenderDriver<'a, T> {
    /// `cancel` is the host's stop signal; setting it at any time
    /// requests cooperative cancellation.
    pub fn new(session: &'a mut Session<T>, cancel: Arc<AtomicBool>) -> Self {
        Self {
            session,
            cancel,
            poll_interval: Duration::from_millis(1),
        }
    }

    /// Override the sleep between polls
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start rendering and stream results into `sink` until a terminal
    /// result arrives.
    pub fn run(&mut self, options: &RenderOptions, sink: &mut dyn FrameSink) -> Result<RenderOutcome> {
        self.session.begin_render()?;
        self.session.set_sample_budget(options.samples);

        match self.run_loop(options, sink) {
            Ok(outcome) => {
                self.session.finish_render();
                Ok(outcome)
            }
            Err(e) => {
                // Channel fault mid-stream: the socket state is unknown
                log::error!("Render loop failed: {}", e);
                self.session.abort();
                Err(e)
            }
        }
    }

    fn run_loop(
        &mut self,
        options: &RenderOptions,
        sink: &mut dyn FrameSink,
    ) -> Result<RenderOutcome> {
        // Interactive previews may only refine across restarts; final
        // renders always run at full resolution.
        let reduction_factor = match options.mode {
            RenderMode::Interactive => self.session.clamp_reduction_factor(options.reduction_factor),
            RenderMode::Final => 1,
        };

        log::info!(
            "Starting render: {} samples ({:?}, reduction 1:{})",
            options.samples,
            options.mode,
            reduction_factor
        );

        self.session.send_message(&ClientMessage::StartRendering {
            mode: options.mode,
            samples: options.samples,
            reduction_factor,
            update_rate: options.update_rate,
        })?;

        let budget = options.samples.max(1);
        let mut cancel_sent = false;
        let mut frames = 0u32;

        sink.on_status(0.0, &format!("Rendering sample 1/{}", budget));

        loop {
            // The host's stop signal is checked every iteration, but the
            // cancel request goes out at most once.
            if self.cancel.load(Ordering::Relaxed) && !cancel_sent {
                log::info!("Cancel requested, notifying server");
                self.session.send_message(&ClientMessage::CancelRendering)?;
                cancel_sent = true;
            }

            if !self.session.channel_mut().readable()? {
                std::thread::sleep(self.poll_interval);
                continue;
            }

            let result: RenderResult = self.session.receive_record()?;
            match result {
                RenderResult::Frame {
                    width,
                    height,
                    sample,
                    reduction_factor,
                    file_size,
                    memory_usage,
                    variance,
                } => {
                    // The encoded image follows out-of-band; a size of 0
                    // means the server skipped this sample's framebuffer.
                    let pixels = if file_size > 0 {
                        self.session.channel_mut().receive_raw(file_size as usize)?
                    } else {
                        Vec::new()
                    };

                    log::debug!(
                        "Frame: sample {}/{} ({}x{} @1:{}, {} bytes, variance {:.4})",
                        sample,
                        budget,
                        width,
                        height,
                        reduction_factor,
                        file_size,
                        variance
                    );

                    if !pixels.is_empty() {
                        sink.on_frame(FrameUpdate {
                            width,
                            height,
                            sample,
                            pixels,
                            memory_usage,
                            variance,
                        });
                        frames += 1;
                    }

                    let progress = (sample as f32 / budget as f32).min(1.0);
                    sink.on_status(
                        progress,
                        &format!(
                            "Rendering sample {}/{} (server {:.1} MB)",
                            sample, budget, memory_usage
                        ),
                    );
                }

                RenderResult::Done {
                    memory_usage,
                    peak_memory_usage,
                    ..
                } => {
                    log::info!(
                        "Render done ({} frames, server peak {:.1} MB)",
                        frames,
                        peak_memory_usage.max(memory_usage)
                    );
                    sink.on_status(1.0, "Rendering done");
                    sink.on_done();
                    return Ok(RenderOutcome::Finished { frames });
                }

                RenderResult::Canceled => {
                    // Only reachable after our own cancel request
                    log::info!("Render canceled by request ({} frames)", frames);
                    sink.on_status(1.0, "Rendering canceled");
                    sink.on_canceled();
                    return Ok(RenderOutcome::Canceled { frames });
                }
            }
        }
    }
}
