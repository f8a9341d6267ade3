//! FFmpeg-backed media backend (libavformat, libavcodec, libswscale).

mod codec;
mod convert;
mod probe;
mod session;

use std::sync::OnceLock;

use ffmpeg_next as ffmpeg;
use tracing::debug;

use crate::backend::MediaBackend;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

pub use convert::pixel_for;
pub use probe::low_latency_options;
pub use session::StreamSession;

static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Initialize FFmpeg and its network layer once per process.
pub fn init() -> Result<()> {
    INIT.get_or_init(|| {
        ffmpeg::init().map_err(|e| e.to_string())?;
        ffmpeg::format::network::init();
        debug!("ffmpeg initialized");
        Ok(())
    })
    .clone()
    .map_err(EngineError::InitFailed)
}

/// Opens [`StreamSession`]s for the engine.
#[derive(Debug, Clone, Copy)]
pub struct FfmpegBackend {
    _initialized: (),
}

impl FfmpegBackend {
    pub fn new() -> Result<Self> {
        init()?;
        Ok(Self { _initialized: () })
    }
}

impl MediaBackend for FfmpegBackend {
    type Session = StreamSession;

    fn open(&self, url: &str, config: &EngineConfig) -> Result<StreamSession> {
        StreamSession::establish(url, config)
    }
}
