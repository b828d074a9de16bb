//! Fixed-capacity history of visited states.
//!
//! The buffer is allocated once and reused across resets. Each slot carries a
//! position and a colour; the colour depends only on the slot index, so the
//! trail's colour bands cycle every [`COLOR_PERIOD`] slots no matter how often
//! the ring has wrapped.

use crate::error::{EngineError, Result};
use crate::State;
use serde::de::{value, IntoDeserializer};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Number of slots after which the colour law repeats.
pub const COLOR_PERIOD: usize = 256;

/// What happens once every slot has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferMode {
    /// Overwrite the oldest slot.
    #[default]
    Ring,
    /// Stop recording until the next reset.
    #[serde(alias = "halt")]
    AppendThenHalt,
}

/// Reads the same names the serde representation uses.
impl FromStr for BufferMode {
    type Err = value::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BufferMode::deserialize(IntoDeserializer::<value::Error>::into_deserializer(s))
    }
}

/// Linear RGB in `[0, 1)`.
pub type Rgb = [f32; 3];

/// Colour of a slot: red ramps up and blue ramps down over each period.
pub fn slot_color(slot: usize) -> Rgb {
    let phase = (slot % COLOR_PERIOD) as f32;
    let period = COLOR_PERIOD as f32;
    [phase / period, 0.5, (period - 1.0 - phase) / period]
}

/// Position of unwritten slots.
pub fn sentinel() -> State {
    State::zeros()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub position: State,
    pub color: Rgb,
}

/// Chronological view over the recorded points as at most two contiguous
/// slices: `head` holds the older arc, `tail` the newer one. Before the ring
/// wraps, `tail` is empty.
#[derive(Debug, Clone, Copy)]
pub struct OrderedView<'a> {
    pub head: &'a [TrajectoryPoint],
    pub tail: &'a [TrajectoryPoint],
}

impl<'a> OrderedView<'a> {
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &'a TrajectoryPoint> + 'a {
        self.head.iter().chain(self.tail.iter())
    }

    /// The arcs that actually contain points, in drawing order.
    pub fn segments(&self) -> impl Iterator<Item = &'a [TrajectoryPoint]> + 'a {
        [self.head, self.tail].into_iter().filter(|s| !s.is_empty())
    }
}

/// Owned copy of the buffer taken at a tick boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectorySnapshot {
    /// Every slot, in slot order. Slots past `len` hold the sentinel.
    pub points: Vec<TrajectoryPoint>,
    /// Next insertion slot.
    pub cursor: usize,
    pub len: usize,
    pub mode: BufferMode,
}

#[derive(Debug, Clone)]
pub struct TrajectoryBuffer {
    points: Vec<TrajectoryPoint>,
    cursor: usize,
    len: usize,
    mode: BufferMode,
}

impl TrajectoryBuffer {
    pub fn new(capacity: usize, mode: BufferMode) -> Result<Self> {
        if capacity == 0 {
            return Err(EngineError::DegenerateConfiguration {
                field: "capacity",
                requested: 0.0,
                applied: 0.0,
            });
        }
        let points = (0..capacity)
            .map(|slot| TrajectoryPoint {
                position: sentinel(),
                color: slot_color(slot),
            })
            .collect();
        Ok(Self {
            points,
            cursor: 0,
            len: 0,
            mode,
        })
    }

    pub fn capacity(&self) -> usize {
        self.points.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Records `position`. Returns `false` if a halted buffer dropped it.
    pub fn push(&mut self, position: State) -> bool {
        if self.mode == BufferMode::AppendThenHalt && self.is_full() {
            return false;
        }

        let slot = self.cursor;
        self.points[slot] = TrajectoryPoint {
            position,
            color: slot_color(slot),
        };
        self.cursor = (slot + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
        true
    }

    /// Empties the buffer in place; every slot returns to the sentinel.
    pub fn clear(&mut self) {
        for point in &mut self.points {
            point.position = sentinel();
        }
        self.cursor = 0;
        self.len = 0;
    }

    /// Changing the mode clears the buffer so the cursor arithmetic of the
    /// new mode starts from a clean state.
    pub fn set_mode(&mut self, mode: BufferMode) {
        if mode != self.mode {
            self.mode = mode;
            self.clear();
        }
    }

    /// Raw slots in slot order, including unwritten sentinel slots.
    pub fn slots(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn latest(&self) -> Option<&TrajectoryPoint> {
        if self.is_empty() {
            return None;
        }
        let last = (self.cursor + self.capacity() - 1) % self.capacity();
        Some(&self.points[last])
    }

    pub fn ordered_view(&self) -> OrderedView<'_> {
        if self.is_full() {
            let (newer, older) = self.points.split_at(self.cursor);
            OrderedView {
                head: older,
                tail: newer,
            }
        } else {
            OrderedView {
                head: &self.points[..self.len],
                tail: &[],
            }
        }
    }

    pub fn snapshot(&self) -> TrajectorySnapshot {
        TrajectorySnapshot {
            points: self.points.clone(),
            cursor: self.cursor,
            len: self.len,
            mode: self.mode,
        }
    }
}
