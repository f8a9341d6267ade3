//! Camera switching on top of a single engine.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::MediaBackend;
use crate::controller::StreamEngine;
use crate::error::{EngineError, Result};
use crate::ffmpeg::FfmpegBackend;
use crate::state::EngineState;

/// What [`CameraSwitcher::play`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The requested URL was already live; nothing changed.
    AlreadyPlaying,
    /// Nothing was live; the URL was opened.
    Opened,
    /// A different URL was live; it was stopped and the new one opened.
    Switched,
}

/// Remembers which camera is live and swaps sources on request.
pub struct CameraSwitcher<B: MediaBackend = FfmpegBackend> {
    engine: StreamEngine<B>,
    current: Option<String>,
    switch_timeout: Duration,
}

impl<B: MediaBackend> CameraSwitcher<B> {
    pub const DEFAULT_SWITCH_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(engine: StreamEngine<B>) -> Self {
        Self {
            engine,
            current: None,
            switch_timeout: Self::DEFAULT_SWITCH_TIMEOUT,
        }
    }

    /// How long `play` waits for the previous stream to stop before it
    /// falls back to joining it inside `open`.
    pub fn with_switch_timeout(mut self, timeout: Duration) -> Self {
        self.switch_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &StreamEngine<B> {
        &self.engine
    }

    /// Play `url`, replacing whatever camera is live.
    pub fn play(&mut self, url: &str) -> Result<SwitchOutcome> {
        let url = url.trim();
        if url.is_empty() {
            return Err(EngineError::open_failed(url, "URL is empty"));
        }
        self.forget_if_failed();

        let live = self.engine.state().is_live();
        if live && self.current.as_deref() == Some(url) {
            debug!(url, "camera already selected");
            return Ok(SwitchOutcome::AlreadyPlaying);
        }

        if live {
            info!(from = ?self.current, to = url, "switching camera");
            self.engine.stop();
            if !self.engine.wait_until_stopped(self.switch_timeout) {
                warn!(url, "previous stream still stopping, joining it");
            }
        }

        self.current = None;
        self.engine.open(url)?;
        self.current = Some(url.to_string());
        Ok(if live { SwitchOutcome::Switched } else { SwitchOutcome::Opened })
    }

    /// Stop the live camera and forget it.
    pub fn stop(&mut self) {
        if let Some(url) = self.current.take() {
            info!(%url, "camera stopped");
        }
        self.engine.stop();
    }

    /// URL of the camera currently selected, if it is still healthy.
    pub fn current_url(&mut self) -> Option<&str> {
        self.forget_if_failed();
        self.current.as_deref()
    }

    fn forget_if_failed(&mut self) {
        if self.engine.state() == EngineState::Error && self.current.take().is_some() {
            debug!("forgetting failed camera");
        }
    }
}
