//! Virtual chip exposing the machine's soft lines to consumers.
//!
//! Soft lines are levels the machine and its consumers share: the machine
//! drives them through `set` signals and watches them through soft edges,
//! while consumers read and write them here.  A consumer write lands
//! synchronously: if it matches a soft edge of the current state, the
//! transition request is made before the write call returns.
//!
//! Directions are advisory, like on the real chip this models: writing a
//! line that is nominally an input still stores the level and still
//! triggers edges.  [`SoftPin`] adapts one line to the `embedded-hal`
//! digital traits so driver code written against those can sit on top.

use std::sync::Arc;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use super::Core;
use crate::error::SoftIoError;
use crate::ports::Level;

/// Nominal direction of a soft line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    In,
    Out,
}

/// One soft line.  Fresh machines start all lines as inputs at low.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SoftLine {
    pub(crate) dir: Direction,
    pub(crate) value: bool,
}

/// Cloneable consumer handle to the machine's soft lines.
#[derive(Clone)]
pub struct VirtualChip {
    core: Arc<Core>,
}

impl VirtualChip {
    pub(crate) fn new(core: Arc<Core>) -> Self {
        Self { core }
    }

    pub fn line_count(&self) -> usize {
        self.core.machine.soft_count()
    }

    fn check(&self, index: usize) -> Result<(), SoftIoError> {
        let count = self.line_count();
        if index >= count {
            return Err(SoftIoError { index, count });
        }
        Ok(())
    }

    pub fn direction(&self, index: usize) -> Result<Direction, SoftIoError> {
        self.check(index)?;
        Ok(self.core.control().soft[index].dir)
    }

    pub fn get(&self, index: usize) -> Result<Level, SoftIoError> {
        self.check(index)?;
        Ok(Level::from_bool(self.core.control().soft[index].value))
    }

    /// Write a level.  Returns once any matching soft edge of the current
    /// state has been turned into a transition request.
    pub fn set(&self, index: usize, level: Level) -> Result<(), SoftIoError> {
        self.check(index)?;
        self.core.write_soft(index, level.is_high());
        Ok(())
    }

    pub fn set_direction_input(&self, index: usize) -> Result<(), SoftIoError> {
        self.check(index)?;
        self.core.control().soft[index].dir = Direction::In;
        Ok(())
    }

    /// Switch a line to output and drive it in one call.
    pub fn set_direction_output(&self, index: usize, level: Level) -> Result<(), SoftIoError> {
        self.check(index)?;
        self.core.control().soft[index].dir = Direction::Out;
        self.core.write_soft(index, level.is_high());
        Ok(())
    }

    /// Adapt one line to the `embedded-hal` digital pin traits.
    pub fn pin(&self, index: usize) -> Result<SoftPin, SoftIoError> {
        self.check(index)?;
        Ok(SoftPin {
            chip: self.clone(),
            index,
        })
    }
}

/// One soft line as an `embedded-hal` digital pin.
pub struct SoftPin {
    chip: VirtualChip,
    index: usize,
}

impl ErrorType for SoftPin {
    type Error = SoftIoError;
}

impl OutputPin for SoftPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.chip.set(self.index, Level::Low)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.chip.set(self.index, Level::High)
    }
}

impl InputPin for SoftPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.chip.get(self.index).map(Level::is_high)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.chip.get(self.index).map(|l| !l.is_high())
    }
}
