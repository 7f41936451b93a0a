// THEORY:
// The `pipeline` module is the top-level API of the robot-side engine. It owns the
// two handles the process has, the frame source and the command engine, and
// advances them together, one scheduling tick at a time.
//
// 1.  **Single actor**: fetching a frame and serving a command alternate inside
//     `tick`; they never run concurrently, so nothing is shared and nothing is
//     locked.
// 2.  **Vision outlives the protocol**: when the serial session is disabled, ticks
//     keep polling frames. When the camera is gone, ticks keep answering the
//     controller (with zero replies).
// 3.  **Bounded stalls**: the serial read is bounded by the port timeout and frame
//     fetches return immediately, so a dead peripheral cannot livelock the loop.

use crate::config::Settings;
use crate::frame_source::FrameSource;
use crate::protocol::command::Reply;
use crate::protocol::engine::CommandEngine;
use crate::protocol::serial::SerialSession;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct RescuePipeline {
    source: Box<dyn FrameSource>,
    engine: CommandEngine,
    tick: Duration,
    last_had_frame: bool,
    frames_received: u64,
    frames_missing: u64,
    ticks: u64,
}

impl RescuePipeline {
    /// Initialises `source` with the camera settings. A source that fails to
    /// initialise is kept; the loop then runs without frames.
    pub fn new(settings: &Settings, mut source: Box<dyn FrameSource>, session: SerialSession) -> Self {
        let camera = &settings.camera;
        let camera_ready = source.init(camera);
        if camera_ready {
            info!(index = camera.index, width = camera.width, height = camera.height, fps = camera.fps, "camera ready");
        } else {
            warn!(index = camera.index, "camera failed to open, serving zero replies");
        }

        Self {
            source,
            engine: CommandEngine::new(settings, session),
            tick: Duration::from_millis(settings.tick_ms.max(1)),
            last_had_frame: camera_ready,
            frames_received: 0,
            frames_missing: 0,
            ticks: 0,
        }
    }

    pub fn engine(&self) -> &CommandEngine {
        &self.engine
    }

    /// One scheduling tick: fetch a frame, then serve at most one command.
    pub async fn tick(&mut self) -> Option<Reply> {
        self.ticks += 1;
        let frame = self.source.get_frame();
        match &frame {
            Some(_) => self.frames_received += 1,
            // Warn once per outage.
            None if self.last_had_frame || self.frames_missing == 0 => {
                warn!(tick = self.ticks, "no frame");
                self.frames_missing += 1;
            }
            None => {
                debug!(tick = self.ticks, "no frame");
                self.frames_missing += 1;
            }
        }
        self.last_had_frame = frame.is_some();
        self.engine.service(frame.as_ref()).await
    }

    /// Ticks until ctrl-c.
    pub async fn run(&mut self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;
    }

    /// Ticks until `shutdown` resolves, then releases the frame source.
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(tick_ms = self.tick.as_millis() as u64, "polling loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.source.release();
        info!(state = %self.debug_state(), "polling loop stopped");
    }

    pub fn debug_state(&self) -> DebugState {
        DebugState {
            serial_enabled: self.engine.session().is_enabled(),
            ticks: self.ticks,
            frames_received: self.frames_received,
            frames_missing: self.frames_missing,
            served: self
                .engine
                .served()
                .iter()
                .map(|(command, count)| (command.name(), *count))
                .collect(),
            last_reply: self.engine.last_reply().map(Reply::to_string),
        }
    }
}

/// A printable snapshot of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugState {
    pub serial_enabled: bool,
    pub ticks: u64,
    pub frames_received: u64,
    pub frames_missing: u64,
    pub served: Vec<(&'static str, u64)>,
    pub last_reply: Option<String>,
}

impl fmt::Display for DebugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = if self.serial_enabled { "enabled" } else { "disabled" };
        write!(
            f,
            "serial={} ticks={} frames={} missing={} served=[",
            session, self.ticks, self.frames_received, self.frames_missing
        )?;
        for (i, (name, count)) in self.served.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}:{count}")?;
        }
        write!(f, "] last_reply={}", self.last_reply.as_deref().unwrap_or("-"))
    }
}
