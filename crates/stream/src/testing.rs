//! Scripted media backend for exercising the engine without network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{MediaBackend, MediaSession, PacketRead};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::frame::{Frame, Geometry, PackedFormat};

/// What a scripted source does once opened.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    pub geometry: Geometry,
    /// Error returned by `open` after a session has been partly built.
    pub open_error: Option<EngineError>,
    /// Delay inside `open`, to observe `Connecting`.
    pub open_delay: Duration,
    /// Video packets before end of stream; `None` never ends.
    pub packets: Option<usize>,
    /// Delay per read, standing in for network pacing.
    pub read_delay: Duration,
    /// Every n-th read reports a transient failure (0 = never).
    pub retry_every: usize,
    /// Every n-th video packet fails to decode (0 = never).
    pub corrupt_every: usize,
    /// Every read fails transiently.
    pub always_retry: bool,
    /// Frames still inside the decoder at end of stream.
    pub buffered: usize,
    /// Video packets decoded before the source switches resolution.
    pub resize_after: Option<usize>,
}

impl Script {
    pub fn endless(geometry: Geometry) -> Self {
        Self {
            geometry,
            open_error: None,
            open_delay: Duration::ZERO,
            packets: None,
            read_delay: Duration::from_millis(2),
            retry_every: 0,
            corrupt_every: 0,
            always_retry: false,
            buffered: 0,
            resize_after: None,
        }
    }

    pub fn finite(geometry: Geometry, packets: usize) -> Self {
        Self {
            packets: Some(packets),
            read_delay: Duration::ZERO,
            ..Self::endless(geometry)
        }
    }

    pub fn failing(error: EngineError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::endless(Geometry::new(16, 16))
        }
    }

    pub fn stalled(geometry: Geometry) -> Self {
        Self {
            always_retry: true,
            ..Self::endless(geometry)
        }
    }

    pub fn retry_every(mut self, n: usize) -> Self {
        self.retry_every = n;
        self
    }

    pub fn corrupt_every(mut self, n: usize) -> Self {
        self.corrupt_every = n;
        self
    }

    pub fn buffered(mut self, n: usize) -> Self {
        self.buffered = n;
        self
    }

    pub fn resize_after(mut self, packets: usize) -> Self {
        self.resize_after = Some(packets);
        self
    }

    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }
}

#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    live: Arc<AtomicUsize>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            live: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replace the script used by subsequent opens.
    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    /// Sessions constructed and not yet dropped.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// URLs passed to `open`, in order.
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl MediaBackend for ScriptedBackend {
    type Session = ScriptedSession;

    fn open(&self, url: &str, config: &EngineConfig) -> Result<ScriptedSession> {
        let script = self.script.lock().clone();
        self.opened.lock().push(url.to_string());
        if !script.open_delay.is_zero() {
            thread::sleep(script.open_delay);
        }

        let session = ScriptedSession::new(script.clone(), config.output_format, Arc::clone(&self.live));
        if let Some(err) = script.open_error {
            // Dropping the half-built session must release it.
            drop(session);
            return Err(err);
        }
        Ok(session)
    }
}

pub(crate) struct ScriptedSession {
    script: Script,
    format: PackedFormat,
    live: Arc<AtomicUsize>,
    reads: usize,
    video_packets: usize,
    sequence: u64,
}

impl ScriptedSession {
    fn new(script: Script, format: PackedFormat, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            script,
            format,
            live,
            reads: 0,
            video_packets: 0,
            sequence: 0,
        }
    }

    fn next_frame(&mut self) -> Frame {
        let geometry = self.script.geometry;
        let pixels = vec![(self.sequence % 251) as u8; geometry.byte_len(self.format)];
        let frame = Frame::copy_from(geometry, self.format, self.sequence, Some(self.sequence as i64), &pixels);
        self.sequence += 1;
        frame
    }
}

impl MediaSession for ScriptedSession {
    fn geometry(&self) -> Geometry {
        self.script.geometry
    }

    fn read_packet(&mut self) -> PacketRead {
        if !self.script.read_delay.is_zero() {
            thread::sleep(self.script.read_delay);
        }
        self.reads += 1;
        if self.script.always_retry {
            return PacketRead::Retry("Connection timed out".into());
        }
        if self.script.retry_every > 0 && self.reads % self.script.retry_every == 0 {
            return PacketRead::Retry("Resource temporarily unavailable".into());
        }
        if let Some(total) = self.script.packets {
            if self.video_packets >= total {
                return PacketRead::EndOfStream;
            }
        }
        self.video_packets += 1;
        PacketRead::Video
    }

    fn decode_pending(&mut self, sink: &mut dyn FnMut(Frame) -> bool) -> Result<usize> {
        if let Some(limit) = self.script.resize_after {
            if self.video_packets > limit {
                let from = self.script.geometry;
                return Err(EngineError::GeometryChanged {
                    from,
                    to: Geometry::new(from.width * 2, from.height * 2),
                });
            }
        }
        let corrupt = self.script.corrupt_every;
        if corrupt > 0 && self.video_packets % corrupt == 0 {
            return Err(EngineError::DecodeFailed("Invalid data found when processing input".into()));
        }
        let frame = self.next_frame();
        sink(frame);
        Ok(1)
    }

    fn drain(&mut self, sink: &mut dyn FnMut(Frame) -> bool) -> Result<usize> {
        let mut count = 0;
        for _ in 0..self.script.buffered {
            count += 1;
            let frame = self.next_frame();
            if !sink(frame) {
                break;
            }
        }
        Ok(count)
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
