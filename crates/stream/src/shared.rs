//! State shared between the controller and the decode thread.
//!
//! Everything the controller mutates lives behind `control`. The control
//! flags are atomics so the loop can poll them without locking, but they are
//! only ever written while `control` is held, which keeps condvar waits free
//! of lost wake-ups.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel::{Sender, TrySendError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::error::EngineError;
use crate::frame::{Frame, Geometry};
use crate::state::{EngineEvent, EngineState};
use crate::stats::StatsCounters;

#[derive(Debug, Default)]
pub(crate) struct Control {
    pub state: EngineState,
    pub last_error: Option<String>,
    pub geometry: Geometry,
}

#[derive(Debug, Default)]
pub(crate) struct ControlFlags {
    stop: AtomicBool,
    pause: AtomicBool,
}

impl ControlFlags {
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::Acquire)
    }

    // Setters take the guard to prove the control lock is held.

    pub fn set_stop(&self, _guard: &MutexGuard<'_, Control>, value: bool) {
        self.stop.store(value, Ordering::Release);
    }

    pub fn set_pause(&self, _guard: &MutexGuard<'_, Control>, value: bool) {
        self.pause.store(value, Ordering::Release);
    }
}

/// Result of handing one frame to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Consumer queue full, frame dropped.
    Dropped,
    /// Paused or stopping, frame withheld.
    Discarded,
    /// Consumer hung up.
    Disconnected,
}

pub(crate) struct Shared {
    pub control: Mutex<Control>,
    /// Wakes the decode loop out of a pause.
    pub wake: Condvar,
    /// Signalled on every state transition.
    pub settled: Condvar,
    pub flags: ControlFlags,
    pub stats: StatsCounters,
    frames: Sender<Frame>,
    events: Sender<EngineEvent>,
}

impl Shared {
    pub fn new(frames: Sender<Frame>, events: Sender<EngineEvent>) -> Self {
        Self {
            control: Mutex::new(Control::default()),
            wake: Condvar::new(),
            settled: Condvar::new(),
            flags: ControlFlags::default(),
            stats: StatsCounters::default(),
            frames,
            events,
        }
    }

    /// Move to `next`, broadcasting the change. Returns `false` when the
    /// state was already `next`.
    pub fn transition(&self, control: &mut MutexGuard<'_, Control>, next: EngineState) -> bool {
        if control.state == next {
            return false;
        }
        debug!(from = %control.state, to = %next, "state transition");
        control.state = next;
        // Nobody listening is fine.
        let _ = self.events.send(EngineEvent::StateChanged(next));
        self.settled.notify_all();
        true
    }

    /// Record `err` and enter `Error`.
    pub fn fail(&self, control: &mut MutexGuard<'_, Control>, err: &EngineError) {
        let message = err.to_string();
        control.last_error = Some(message.clone());
        self.transition(control, EngineState::Error);
        let _ = self.events.send(EngineEvent::Error(message));
    }

    /// Hand a frame to the consumer unless paused or stopping.
    ///
    /// The flag check and the send happen under the control lock, so once
    /// `pause()` or `stop()` has returned no further frame goes out.
    pub fn deliver(&self, frame: Frame) -> Delivery {
        let _control = self.control.lock();
        if self.flags.pause_requested() || self.flags.stop_requested() {
            StatsCounters::bump(&self.stats.frames_discarded);
            return Delivery::Discarded;
        }
        match self.frames.try_send(frame) {
            Ok(()) => {
                StatsCounters::bump(&self.stats.frames_delivered);
                Delivery::Delivered
            }
            Err(TrySendError::Full(_)) => {
                StatsCounters::bump(&self.stats.frames_dropped);
                Delivery::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Delivery::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PackedFormat;
    use crossbeam::channel::{bounded, unbounded};

    fn frame(seq: u64) -> Frame {
        Frame::copy_from(Geometry::new(1, 1), PackedFormat::Bgra, seq, None, &[0, 0, 0, 255])
    }

    #[test]
    fn transition_broadcasts_once() {
        let (ftx, _frx) = bounded(1);
        let (etx, erx) = unbounded();
        let shared = Shared::new(ftx, etx);

        let mut control = shared.control.lock();
        assert!(shared.transition(&mut control, EngineState::Connecting));
        assert!(!shared.transition(&mut control, EngineState::Connecting));
        drop(control);

        assert_eq!(erx.try_recv(), Ok(EngineEvent::StateChanged(EngineState::Connecting)));
        assert!(erx.try_recv().is_err());
    }

    #[test]
    fn fail_records_message_and_notifies() {
        let (ftx, _frx) = bounded(1);
        let (etx, erx) = unbounded();
        let shared = Shared::new(ftx, etx);

        let mut control = shared.control.lock();
        shared.fail(&mut control, &EngineError::NoVideoStream);
        assert_eq!(control.state, EngineState::Error);
        assert_eq!(control.last_error.as_deref(), Some("No video stream found"));
        drop(control);

        let events: Vec<_> = erx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                EngineEvent::StateChanged(EngineState::Error),
                EngineEvent::Error("No video stream found".into()),
            ]
        );
    }

    #[test]
    fn deliver_respects_flags_and_queue() {
        let (ftx, frx) = bounded(1);
        let (etx, _erx) = unbounded();
        let shared = Shared::new(ftx, etx);

        assert_eq!(shared.deliver(frame(0)), Delivery::Delivered);
        assert_eq!(shared.deliver(frame(1)), Delivery::Dropped);

        {
            let control = shared.control.lock();
            shared.flags.set_pause(&control, true);
        }
        assert_eq!(shared.deliver(frame(2)), Delivery::Discarded);

        let stats = shared.stats.snapshot();
        assert_eq!(stats.frames_delivered, 1);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.frames_discarded, 1);

        assert_eq!(frx.try_recv().map(|f| f.sequence()), Ok(0));
        drop(frx);
        {
            let control = shared.control.lock();
            shared.flags.set_pause(&control, false);
        }
        assert_eq!(shared.deliver(frame(3)), Delivery::Disconnected);
    }
}
