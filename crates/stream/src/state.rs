//! Engine state and the notifications broadcast to the consumer.

use std::fmt;

/// Current state of the decode engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// No decode loop is running.
    #[default]
    Stopped,
    /// A session is being built or the loop has not started iterating yet.
    Connecting,
    /// The decode loop is running and delivering frames.
    Playing,
    /// Frame delivery is suspended (also used while a stop is in flight).
    Paused,
    /// The last open or the running session failed; see `last_error`.
    Error,
}

impl EngineState {
    /// Returns a short label for display in the UI.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Connecting => "Connecting...",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Error => "Error",
        }
    }

    /// Whether a session may currently be alive (open or in construction).
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Playing | Self::Paused)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Notifications sent to the consumer alongside the frame channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// Sent once per actual transition.
    StateChanged(EngineState),
    /// Sent whenever the engine enters `Error`.
    Error(String),
}
