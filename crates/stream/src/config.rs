//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::frame::PackedFormat;

/// RTSP lower transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RtspTransport {
    /// Interleaved over the control connection. Survives lossy links and NAT.
    #[default]
    Tcp,
    Udp,
}

impl RtspTransport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// Tuning for one engine instance. Every field has a low-latency default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub transport: RtspTransport,
    /// Bound on the initial connect and on any single blocking read.
    pub connect_timeout_ms: u64,
    /// Demuxer reordering delay.
    pub max_delay_us: u64,
    /// How long the prober may analyze the stream before giving up.
    pub analyze_duration_us: u64,
    /// Frame-level decoder threads.
    pub decoder_threads: usize,
    pub output_format: PackedFormat,
    /// Packets read between control-flag yield points.
    pub read_batch: usize,
    /// Sleep after a transient read failure.
    pub read_retry_ms: u64,
    /// Give up (state `Error`) after failing reads for this long.
    /// `None` retries until the caller stops the engine.
    pub read_stall_limit_ms: Option<u64>,
    /// Frames buffered for the consumer before new ones are dropped.
    pub frame_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport: RtspTransport::Tcp,
            connect_timeout_ms: 3_000,
            max_delay_us: 100_000,
            analyze_duration_us: 1_000_000,
            decoder_threads: 4,
            output_format: PackedFormat::Bgra,
            read_batch: 5,
            read_retry_ms: 1,
            read_stall_limit_ms: None,
            frame_queue_depth: 4,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "connect_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.decoder_threads == 0 {
            return Err(EngineError::InvalidConfig(
                "decoder_threads must be at least 1".into(),
            ));
        }
        if self.read_batch == 0 {
            return Err(EngineError::InvalidConfig("read_batch must be at least 1".into()));
        }
        if self.frame_queue_depth == 0 {
            return Err(EngineError::InvalidConfig(
                "frame_queue_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_ms)
    }

    pub fn read_stall_limit(&self) -> Option<Duration> {
        self.read_stall_limit_ms.map(Duration::from_millis)
    }
}
