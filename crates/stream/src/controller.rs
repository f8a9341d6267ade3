//! Public engine: the state machine callers drive from any thread.
//!
//! `StreamEngine` owns the backend and the decode thread. Frames and
//! notifications flow out through the channels in [`EngineOutputs`].

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, unbounded, Receiver};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::{MediaBackend, MediaSession};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::ffmpeg::FfmpegBackend;
use crate::frame::{Frame, Geometry};
use crate::shared::Shared;
use crate::state::{EngineEvent, EngineState};
use crate::stats::{EngineStats, StatsCounters};
use crate::worker::{self, LoopTuning};

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Consumer ends of the engine's channels.
pub struct EngineOutputs {
    /// Display-ready frames. Bounded; frames are dropped while it is full.
    pub frames: Receiver<Frame>,
    /// State transitions and error notifications.
    pub events: Receiver<EngineEvent>,
}

// ---------------------------------------------------------------------------
// StreamEngine
// ---------------------------------------------------------------------------

/// Live-stream decode engine.
///
/// All methods take `&self`; the engine can be shared between threads
/// behind an `Arc`. `open` and `close` are serialized against each other,
/// `pause`, `resume` and `stop` never block on the decode thread.
pub struct StreamEngine<B: MediaBackend = FfmpegBackend> {
    backend: B,
    config: EngineConfig,
    shared: Arc<Shared>,
    /// Decode thread of the current session. Holding this lock serializes
    /// lifecycle operations.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamEngine<FfmpegBackend> {
    /// Engine on the FFmpeg backend with default tuning.
    pub fn with_defaults() -> Result<(Self, EngineOutputs)> {
        Self::new(FfmpegBackend::new()?, EngineConfig::default())
    }
}

impl<B: MediaBackend> StreamEngine<B> {
    pub fn new(backend: B, config: EngineConfig) -> Result<(Self, EngineOutputs)> {
        config.validate()?;
        let (frame_tx, frame_rx) = bounded(config.frame_queue_depth);
        let (event_tx, event_rx) = unbounded();

        let engine = Self {
            backend,
            config,
            shared: Arc::new(Shared::new(frame_tx, event_tx)),
            worker: Mutex::new(None),
        };
        let outputs = EngineOutputs {
            frames: frame_rx,
            events: event_rx,
        };
        Ok((engine, outputs))
    }

    /// Open `url` and start decoding.
    ///
    /// Returns once the session is built and the decode thread is running;
    /// `Playing` is announced by the thread itself. On failure the engine is
    /// left in `Error` with nothing allocated.
    pub fn open(&self, url: &str) -> Result<()> {
        // Checked before and after taking the worker slot, so a concurrent
        // open that is still connecting is rejected without waiting for it.
        self.ensure_not_open(url)?;
        let mut worker = self.worker.lock();
        self.ensure_not_open(url)?;

        Self::retire(&self.shared, &mut worker);

        {
            let mut control = self.shared.control.lock();
            self.shared.flags.set_stop(&control, false);
            self.shared.flags.set_pause(&control, false);
            control.last_error = None;
            control.geometry = Geometry::default();
            self.shared.stats.reset();
            self.shared.transition(&mut control, EngineState::Connecting);
        }

        info!(url, "opening stream");
        let session = match self.backend.open(url, &self.config) {
            Ok(session) => session,
            Err(err) => {
                error!(url, error = %err, "failed to open stream");
                let mut control = self.shared.control.lock();
                self.shared.fail(&mut control, &err);
                return Err(err);
            }
        };

        let geometry = session.geometry();
        {
            let mut control = self.shared.control.lock();
            control.geometry = geometry;
            StatsCounters::bump(&self.shared.stats.sessions_opened);
        }

        match worker::spawn(session, Arc::clone(&self.shared), LoopTuning::from(&self.config)) {
            Ok(handle) => {
                info!(url, width = geometry.width, height = geometry.height, "stream opened");
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                let err = EngineError::SpawnFailed(e.to_string());
                error!(url, error = %err, "failed to start decode loop");
                let mut control = self.shared.control.lock();
                control.geometry = Geometry::default();
                self.shared.fail(&mut control, &err);
                Err(err)
            }
        }
    }

    /// Suspend frame delivery. Ignored unless a session is live.
    pub fn pause(&self) {
        let mut control = self.shared.control.lock();
        if !control.state.is_live() || self.shared.flags.stop_requested() {
            debug!(state = %control.state, "pause ignored");
            return;
        }
        self.shared.flags.set_pause(&control, true);
        self.shared.transition(&mut control, EngineState::Paused);
        debug!("paused");
    }

    /// Continue after [`pause`](Self::pause). Ignored unless a session is live.
    pub fn resume(&self) {
        let mut control = self.shared.control.lock();
        if !control.state.is_live() || self.shared.flags.stop_requested() {
            debug!(state = %control.state, "resume ignored");
            return;
        }
        self.shared.flags.set_pause(&control, false);
        self.shared.wake.notify_all();
        if control.state == EngineState::Paused {
            self.shared.transition(&mut control, EngineState::Playing);
        }
        debug!("resumed");
    }

    /// Ask the decode thread to exit. Does not wait; the thread announces
    /// `Stopped` once the session is released.
    pub fn stop(&self) {
        let mut control = self.shared.control.lock();
        if !control.state.is_live() || self.shared.flags.stop_requested() {
            return;
        }
        self.shared.flags.set_stop(&control, true);
        self.shared.flags.set_pause(&control, false);
        self.shared.wake.notify_all();
        self.shared.transition(&mut control, EngineState::Paused);
        info!("stop requested");
    }

    /// Stop and wait for the session to be fully released. Always ends in
    /// `Stopped`; the last error message is kept.
    pub fn close(&self) {
        let mut worker = self.worker.lock();
        self.stop();
        Self::retire(&self.shared, &mut worker);

        let mut control = self.shared.control.lock();
        control.geometry = Geometry::default();
        self.shared.transition(&mut control, EngineState::Stopped);
    }

    fn ensure_not_open(&self, url: &str) -> Result<()> {
        let state = self.shared.control.lock().state;
        if matches!(state, EngineState::Connecting | EngineState::Playing) {
            warn!(url, %state, "open rejected: stream already open");
            return Err(EngineError::AlreadyOpen);
        }
        Ok(())
    }

    /// Signal and join the current decode thread, if any.
    fn retire(shared: &Shared, worker: &mut Option<JoinHandle<()>>) {
        let Some(handle) = worker.take() else {
            return;
        };
        {
            let control = shared.control.lock();
            shared.flags.set_stop(&control, true);
            shared.flags.set_pause(&control, false);
            shared.wake.notify_all();
        }
        if handle.join().is_err() {
            error!("decode thread panicked");
        }
        debug!("decode thread joined");
    }

    pub fn state(&self) -> EngineState {
        self.shared.control.lock().state
    }

    /// Message of the most recent failure, cleared by the next `open`.
    pub fn last_error(&self) -> Option<String> {
        self.shared.control.lock().last_error.clone()
    }

    pub fn width(&self) -> u32 {
        self.geometry().width
    }

    pub fn height(&self) -> u32 {
        self.geometry().height
    }

    /// Geometry of the open session; zero when nothing is open.
    pub fn geometry(&self) -> Geometry {
        self.shared.control.lock().geometry
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Block until the state equals `target`. Returns `false` on timeout.
    pub fn wait_for_state(&self, target: EngineState, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state == target)
    }

    /// Block until no session is live (`Stopped` or `Error`). Returns `false`
    /// on timeout.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| !state.is_live())
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(EngineState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut control = self.shared.control.lock();
        while !done(control.state) {
            if self.shared.settled.wait_until(&mut control, deadline).timed_out() {
                return done(control.state);
            }
        }
        true
    }
}

impl<B: MediaBackend> Drop for StreamEngine<B> {
    fn drop(&mut self) {
        self.close();
    }
}
