use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Kind of a recorded time block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Person was present in front of the camera
    Focus,
    /// Person was away from the camera
    Leave,
}

impl BlockKind {
    pub fn label(&self) -> &'static str {
        match self {
            BlockKind::Focus => "Focus",
            BlockKind::Leave => "Leave",
        }
    }
}

/// A closed interval of continuous presence or absence.
///
/// Blocks are immutable once closed; a session's log is append-only, ordered
/// by `start`, and consecutive blocks share a boundary timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub kind: BlockKind,
    pub start: SystemTime,
    pub end: SystemTime,
}

impl TimeBlock {
    pub fn duration(&self) -> Duration {
        self.end.duration_since(self.start).unwrap_or_default()
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration().as_secs_f64() / 60.0
    }

    /// Human-readable rendition, e.g.
    /// `14/03/2025 Focus time: 9:05 am - 10:30 am`.
    pub fn format_human(&self) -> String {
        let start: DateTime<Local> = self.start.into();
        let end: DateTime<Local> = self.end.into();

        format!(
            "{} {} time: {} - {}",
            start.format("%d/%m/%Y"),
            self.kind.label(),
            start.format("%-I:%M %P"),
            end.format("%-I:%M %P"),
        )
    }
}

/// The block currently being accumulated, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenBlock {
    pub kind: BlockKind,
    pub start: SystemTime,
}

impl OpenBlock {
    fn close(self, end: SystemTime) -> TimeBlock {
        TimeBlock {
            kind: self.kind,
            start: self.start,
            end,
        }
    }

    /// Elapsed time of the open block measured against `now`.
    pub fn elapsed(&self, now: SystemTime) -> Duration {
        now.duration_since(self.start).unwrap_or_default()
    }
}

/// Converts a stream of presence observations into closed time blocks.
///
/// The tracker stays dormant until the first `true` observation; from then
/// on every presence flip closes the open block and opens one of the
/// opposite kind at the same instant, so the emitted blocks tile the
/// timeline with no gaps or overlap. Timestamps are supplied by the caller,
/// which keeps the algorithm deterministic under test.
#[derive(Debug, Default)]
pub struct TimeTracker {
    initialized: bool,
    previous_presence: Option<bool>,
    open: Option<OpenBlock>,
}

impl TimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one presence observation taken at `at`.
    ///
    /// Returns the block closed by this observation, if the presence state
    /// flipped. Repeated identical observations never produce a block.
    pub fn observe(&mut self, present: bool, at: SystemTime) -> Option<TimeBlock> {
        if !self.initialized {
            if present {
                self.initialized = true;
                self.open = Some(OpenBlock {
                    kind: BlockKind::Focus,
                    start: at,
                });
                self.previous_presence = Some(true);
            }
            return None;
        }

        let mut closed = None;
        if self.previous_presence != Some(present) {
            if let Some(open) = self.open.take() {
                // A flip at the exact open timestamp carries no elapsed time;
                // the block is discarded rather than recorded with end == start.
                if at > open.start {
                    closed = Some(open.close(at));
                }
            }
            self.open = Some(OpenBlock {
                kind: if present {
                    BlockKind::Focus
                } else {
                    BlockKind::Leave
                },
                start: at,
            });
        }

        self.previous_presence = Some(present);
        closed
    }

    /// Close the open block at stop time so the log accounts for all elapsed
    /// time since initialization.
    pub fn finalize(&mut self, at: SystemTime) -> Option<TimeBlock> {
        let open = self.open.take()?;
        if at > open.start {
            Some(open.close(at))
        } else {
            None
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn previous_presence(&self) -> Option<bool> {
        self.previous_presence
    }

    pub fn open_block(&self) -> Option<OpenBlock> {
        self.open
    }
}
