//! Media backend abstraction.
//!
//! The decode loop and the controller only talk to these traits. The
//! production implementation lives in [`crate::ffmpeg`].

use crate::config::EngineConfig;
use crate::error::Result;
use crate::frame::{Frame, Geometry};

/// Outcome of pulling one packet from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketRead {
    /// A packet from the selected video stream is pending decode.
    Video,
    /// A packet from some other stream; nothing to decode.
    Skipped,
    /// The source ended cleanly.
    EndOfStream,
    /// The read failed but the source may recover.
    Retry(String),
}

/// Factory for sessions. One backend serves every `open` of an engine.
pub trait MediaBackend: Send + Sync + 'static {
    type Session: MediaSession;

    /// Build a fully open session, or release everything and fail.
    fn open(&self, url: &str, config: &EngineConfig) -> Result<Self::Session>;
}

/// A fully open source + decoder + converter chain.
///
/// Dropping a session releases every native resource it holds.
pub trait MediaSession: Send + 'static {
    /// Output geometry, fixed for the lifetime of the session.
    fn geometry(&self) -> Geometry;

    /// Read the next packet into the session's packet holder.
    fn read_packet(&mut self) -> PacketRead;

    /// Decode the pending video packet and hand every produced frame to
    /// `sink`. Draining stops early when `sink` returns `false`.
    ///
    /// Returns the number of frames decoded. Errors are per-packet and
    /// recoverable.
    fn decode_pending(&mut self, sink: &mut dyn FnMut(Frame) -> bool) -> Result<usize>;

    /// Flush frames still buffered in the decoder after end of stream.
    fn drain(&mut self, sink: &mut dyn FnMut(Frame) -> bool) -> Result<usize>;
}
