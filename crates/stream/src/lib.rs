//! Live-stream video decode engine.
//!
//! Opens a network video source (RTSP, HTTP, files), decodes it on a
//! dedicated thread and hands display-ready frames to a single consumer.
//!
//! ```no_run
//! use dv_stream::StreamEngine;
//!
//! let (engine, outputs) = StreamEngine::with_defaults()?;
//! engine.open("rtsp://192.168.1.20:8554/cam")?;
//! while let Ok(frame) = outputs.frames.recv() {
//!     println!("{}x{} #{}", frame.width(), frame.height(), frame.sequence());
//! }
//! # Ok::<(), dv_stream::EngineError>(())
//! ```

pub mod backend;
mod config;
mod controller;
mod error;
pub mod ffmpeg;
mod frame;
mod shared;
mod state;
mod stats;
mod switcher;
mod worker;

#[cfg(test)]
mod testing;

pub use backend::{MediaBackend, MediaSession, PacketRead};
pub use config::{EngineConfig, RtspTransport};
pub use controller::{EngineOutputs, StreamEngine};
pub use error::{EngineError, ErrorKind, Result};
pub use ffmpeg::{FfmpegBackend, StreamSession};
pub use frame::{Frame, Geometry, PackedFormat};
pub use state::{EngineEvent, EngineState};
pub use stats::EngineStats;
pub use switcher::{CameraSwitcher, SwitchOutcome};
