//! Decode loop.
//!
//! Runs on its own named thread and owns the session exclusively. The loop
//! never holds the control lock while reading or decoding; it takes it only
//! to announce transitions, to wait out a pause and to hand frames over.

use std::cell::Cell;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::backend::{MediaSession, PacketRead};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::frame::{Frame, Geometry};
use crate::shared::{Delivery, Shared};
use crate::state::EngineState;
use crate::stats::StatsCounters;

pub(crate) const THREAD_NAME: &str = "stream-decode";

#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopTuning {
    pub read_batch: usize,
    pub retry_delay: Duration,
    pub stall_limit: Option<Duration>,
}

impl From<&EngineConfig> for LoopTuning {
    fn from(config: &EngineConfig) -> Self {
        Self {
            read_batch: config.read_batch.max(1),
            retry_delay: config.read_retry_delay(),
            stall_limit: config.read_stall_limit(),
        }
    }
}

/// Why the loop ended.
#[derive(Debug)]
enum Exit {
    EndOfStream,
    StopRequested,
    ConsumerGone,
    Failed(EngineError),
}

/// Start the decode loop for `session`. If the thread cannot be spawned the
/// session is dropped (and torn down) before this returns.
pub(crate) fn spawn<S: MediaSession>(
    session: S,
    shared: Arc<Shared>,
    tuning: LoopTuning,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || run(session, &shared, tuning))
}

fn run<S: MediaSession>(mut session: S, shared: &Shared, tuning: LoopTuning) {
    announce_playing(shared);
    let exit = decode_until_exit(&mut session, shared, tuning);
    // Release native resources before anyone can observe `Stopped`.
    drop(session);
    finish(shared, exit);
}

fn announce_playing(shared: &Shared) {
    let mut control = shared.control.lock();
    if control.state == EngineState::Connecting
        && !shared.flags.pause_requested()
        && !shared.flags.stop_requested()
    {
        shared.transition(&mut control, EngineState::Playing);
    }
}

/// Outcome of the pause gate at the top of each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// Not paused; carry on.
    Open,
    /// The loop was parked and has been resumed.
    Resumed,
    Stop,
}

/// Block while paused.
fn wait_while_paused(shared: &Shared) -> Gate {
    let mut parked = false;
    if shared.flags.pause_requested() && !shared.flags.stop_requested() {
        let mut control = shared.control.lock();
        debug!("decode loop paused");
        while shared.flags.pause_requested() && !shared.flags.stop_requested() {
            parked = true;
            shared.wake.wait(&mut control);
        }
        debug!("decode loop woke up");
    }
    match (shared.flags.stop_requested(), parked) {
        (true, _) => Gate::Stop,
        (false, true) => Gate::Resumed,
        (false, false) => Gate::Open,
    }
}

fn decode_until_exit<S: MediaSession>(session: &mut S, shared: &Shared, tuning: LoopTuning) -> Exit {
    let stats = &shared.stats;
    let mut stalled_since: Option<Instant> = None;
    let consumer_gone = Cell::new(false);

    let mut sink = |frame: Frame| match shared.deliver(frame) {
        Delivery::Delivered | Delivery::Discarded => true,
        Delivery::Dropped => {
            trace!("consumer lagging, frame dropped");
            true
        }
        Delivery::Disconnected => {
            consumer_gone.set(true);
            false
        }
    };

    loop {
        match wait_while_paused(shared) {
            Gate::Stop => return Exit::StopRequested,
            // Time spent parked is not time spent failing reads.
            Gate::Resumed => stalled_since = None,
            Gate::Open => {}
        }

        for _ in 0..tuning.read_batch {
            if shared.flags.stop_requested() {
                return Exit::StopRequested;
            }

            match session.read_packet() {
                PacketRead::EndOfStream => {
                    match session.drain(&mut sink) {
                        Ok(n) => StatsCounters::add(&stats.frames_decoded, n as u64),
                        Err(e) => debug!(error = %e, "decoder flush failed"),
                    }
                    return if consumer_gone.get() { Exit::ConsumerGone } else { Exit::EndOfStream };
                }
                PacketRead::Retry(reason) => {
                    StatsCounters::bump(&stats.read_retries);
                    let since = *stalled_since.get_or_insert_with(Instant::now);
                    if let Some(limit) = tuning.stall_limit {
                        if since.elapsed() >= limit {
                            return Exit::Failed(EngineError::StreamStalled {
                                ms: limit.as_millis() as u64,
                            });
                        }
                    }
                    trace!(%reason, "packet read failed, retrying");
                    thread::sleep(tuning.retry_delay);
                }
                PacketRead::Skipped => {
                    stalled_since = None;
                    StatsCounters::bump(&stats.packets_read);
                }
                PacketRead::Video => {
                    stalled_since = None;
                    StatsCounters::bump(&stats.packets_read);
                    match session.decode_pending(&mut sink) {
                        Ok(n) => StatsCounters::add(&stats.frames_decoded, n as u64),
                        Err(e) if e.is_fatal() => return Exit::Failed(e),
                        Err(e) => {
                            StatsCounters::bump(&stats.decode_errors);
                            warn!(error = %e, "skipping undecodable packet");
                        }
                    }
                    if consumer_gone.get() {
                        return Exit::ConsumerGone;
                    }
                }
            }
        }
    }
}

fn finish(shared: &Shared, exit: Exit) {
    let mut control = shared.control.lock();
    control.geometry = Geometry::default();
    match exit {
        Exit::Failed(err) => {
            error!(error = %err, "decode loop failed");
            shared.fail(&mut control, &err);
        }
        Exit::EndOfStream => {
            info!("end of stream");
            shared.transition(&mut control, EngineState::Stopped);
        }
        Exit::StopRequested => {
            info!("decode loop stopped");
            shared.transition(&mut control, EngineState::Stopped);
        }
        Exit::ConsumerGone => {
            info!("frame receiver dropped, stopping decode loop");
            shared.transition(&mut control, EngineState::Stopped);
        }
    }
}
