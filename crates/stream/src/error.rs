//! Engine error taxonomy

use thiserror::Error;

use crate::frame::Geometry;

/// Errors produced by the decode engine.
///
/// Everything up to `BufferAllocFailed` is fatal to the `open` that produced
/// it: the partially built session is rolled back and the engine enters
/// `Error`. `DecodeFailed` is per-packet and never changes state.
/// `GeometryChanged` and `StreamStalled` end a running session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Stream is already open")]
    AlreadyOpen,

    #[error("Failed to open stream '{url}': {reason}")]
    OpenFailed { url: String, reason: String },

    #[error("Failed to retrieve stream information: {0}")]
    StreamInfoUnavailable(String),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Failed to initialize decoder: {0}")]
    CodecInitFailed(String),

    #[error("Failed to create image conversion context: {0}")]
    ConversionContextFailed(String),

    #[error("Failed to allocate frame buffer: {0}")]
    BufferAllocFailed(String),

    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn decode thread: {0}")]
    SpawnFailed(String),

    #[error("Packet decode failed: {0}")]
    DecodeFailed(String),

    #[error("Stream stalled: no packet could be read for {ms} ms")]
    StreamStalled { ms: u64 },

    #[error("Stream geometry changed from {from} to {to}")]
    GeometryChanged { from: Geometry, to: Geometry },
}

/// Stable discriminant for [`EngineError`], handy for matching and logging
/// without caring about the attached message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyOpen,
    OpenFailed,
    StreamInfoUnavailable,
    NoVideoStream,
    UnsupportedCodec,
    CodecInitFailed,
    ConversionContextFailed,
    BufferAllocFailed,
    InitFailed,
    InvalidConfig,
    SpawnFailed,
    DecodeFailed,
    StreamStalled,
    GeometryChanged,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyOpen => ErrorKind::AlreadyOpen,
            Self::OpenFailed { .. } => ErrorKind::OpenFailed,
            Self::StreamInfoUnavailable(_) => ErrorKind::StreamInfoUnavailable,
            Self::NoVideoStream => ErrorKind::NoVideoStream,
            Self::UnsupportedCodec(_) => ErrorKind::UnsupportedCodec,
            Self::CodecInitFailed(_) => ErrorKind::CodecInitFailed,
            Self::ConversionContextFailed(_) => ErrorKind::ConversionContextFailed,
            Self::BufferAllocFailed(_) => ErrorKind::BufferAllocFailed,
            Self::InitFailed(_) => ErrorKind::InitFailed,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::SpawnFailed(_) => ErrorKind::SpawnFailed,
            Self::DecodeFailed(_) => ErrorKind::DecodeFailed,
            Self::StreamStalled { .. } => ErrorKind::StreamStalled,
            Self::GeometryChanged { .. } => ErrorKind::GeometryChanged,
        }
    }

    /// Whether this error ends the session it occurred in.
    ///
    /// Only per-packet decode failures are recoverable; the loop skips the
    /// packet and keeps going.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DecodeFailed(_))
    }

    pub(crate) fn open_failed(url: &str, reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
