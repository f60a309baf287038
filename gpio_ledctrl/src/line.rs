//! GPIO line handles.
//!
//! A [`Line`] is the exclusive claim a driver holds on one pin. It is bound
//! to a direction right after acquisition and handed back to the backend
//! when dropped, so a driver that fails half-way through its init releases
//! what it already holds in reverse order simply by returning early.

use std::{fmt, ops::Not, sync::Arc};

use crate::{backend::GpioBackend, irq::IrqNumber, Result};

/// Logical level of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Self::High
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level.is_high()
    }
}

impl Not for Level {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    /// Output, driven to the given level as soon as the direction is set.
    Output(Level),
}

/// Backend-side identifier of a held line: the global GPIO number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId(u32);

impl LineId {
    pub fn from_gpio(gpio: u32) -> Self {
        Self(gpio)
    }

    pub fn gpio(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpio{}", self.0)
    }
}

/// Exclusive handle on one GPIO line.
pub struct Line<B: GpioBackend> {
    backend: Arc<B>,
    id: LineId,
    label: String,
}

impl<B: GpioBackend> Line<B> {
    /// Claims global GPIO number `gpio` under the consumer name `label`.
    pub fn acquire(backend: &Arc<B>, gpio: u32, label: &str) -> Result<Self> {
        let id = backend.acquire_line(gpio, label)?;
        Ok(Self {
            backend: Arc::clone(backend),
            id,
            label: label.to_owned(),
        })
    }

    pub fn id(&self) -> LineId {
        self.id
    }

    pub fn direction_output(&self, initial: Level) -> Result<()> {
        self.backend
            .set_direction(self.id, Direction::Output(initial))
    }

    pub fn direction_input(&self) -> Result<()> {
        self.backend.set_direction(self.id, Direction::Input)
    }

    pub fn get(&self) -> Level {
        self.backend.read_level(self.id)
    }

    pub fn set(&self, level: Level) {
        self.backend.write_level(self.id, level)
    }

    /// Reads the current output level and drives the inverse. Returns the new level.
    pub fn toggle(&self) -> Level {
        let level = !self.get();
        self.set(level);
        level
    }

    pub fn to_irq(&self) -> Result<IrqNumber> {
        self.backend.line_to_irq(self.id)
    }
}

impl<B: GpioBackend> fmt::Debug for Line<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Line")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

impl<B: GpioBackend> Drop for Line<B> {
    fn drop(&mut self) {
        self.backend.release_line(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_inversion() {
        assert_eq!(!Level::Low, Level::High);
        assert_eq!(!!Level::High, Level::High);
        assert_eq!(Level::from(true), Level::High);
        assert!(!bool::from(Level::Low));
    }
}
