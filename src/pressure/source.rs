//! Memory Pressure Source
//!
//! The notification point through which the host platform reports memory
//! pressure to every cache subscribed to it.

use std::fmt;
use std::ops::BitOr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Number of undelivered signals retained per subscriber.
const SIGNAL_BUFFER: usize = 16;

// == Pressure Level ==
/// Severity reported with a memory pressure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    /// Pressure has returned to normal
    Normal,
    /// The system is running low on memory
    Warning,
    /// The system is critically low on memory
    Critical,
}

impl PressureLevel {
    fn bit(self) -> u8 {
        match self {
            PressureLevel::Normal => 0b001,
            PressureLevel::Warning => 0b010,
            PressureLevel::Critical => 0b100,
        }
    }
}

impl fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PressureLevel::Normal => "normal",
            PressureLevel::Warning => "warning",
            PressureLevel::Critical => "critical",
        };
        f.write_str(name)
    }
}

// == Pressure Mask ==
/// Set of pressure levels a subscriber reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PressureMask(u8);

impl PressureMask {
    pub const WARNING: PressureMask = PressureMask(0b010);
    pub const CRITICAL: PressureMask = PressureMask(0b100);

    /// Returns true if signals of `level` pass this mask.
    pub fn contains(self, level: PressureLevel) -> bool {
        self.0 & level.bit() != 0
    }
}

impl BitOr for PressureMask {
    type Output = PressureMask;

    fn bitor(self, rhs: PressureMask) -> PressureMask {
        PressureMask(self.0 | rhs.0)
    }
}

// == Memory Pressure Source ==
/// Broadcasts memory pressure signals to subscribed caches.
///
/// Cloning yields another handle to the same channel. Platforms that
/// cannot observe memory pressure simply never call [`notify`](Self::notify).
#[derive(Debug, Clone)]
pub struct MemoryPressureSource {
    sender: broadcast::Sender<PressureLevel>,
}

impl Default for MemoryPressureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPressureSource {
    // == Constructor ==
    /// Creates an independent source with no subscribers.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_BUFFER);
        Self { sender }
    }

    // == Global ==
    /// Returns the process-wide source caches subscribe to by default.
    pub fn global() -> &'static MemoryPressureSource {
        static GLOBAL: OnceLock<MemoryPressureSource> = OnceLock::new();
        GLOBAL.get_or_init(MemoryPressureSource::new)
    }

    // == Notify ==
    /// Delivers a pressure signal to every current subscriber.
    ///
    /// Returns the number of subscribers reached. Never blocks.
    pub fn notify(&self, level: PressureLevel) -> usize {
        match self.sender.send(level) {
            Ok(reached) => {
                debug!("Memory pressure signal ({}) sent to {} subscribers", level, reached);
                reached
            }
            Err(_) => {
                debug!("Memory pressure signal ({}) had no subscribers", level);
                0
            }
        }
    }

    // == Subscribe ==
    /// Opens a new subscription receiving every signal sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PressureLevel> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
