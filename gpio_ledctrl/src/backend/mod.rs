//! The capability interface drivers are written against.
//!
//! Drivers never talk to hardware directly; every line and interrupt
//! operation goes through a [`GpioBackend`]. Two implementations exist:
//! [`CdevBackend`] for the GPIO character device and [`SimBoard`], an
//! in-memory board with fault injection used by the tests.

mod cdev;
mod sim;

pub use cdev::CdevBackend;
pub use sim::{FaultPoint, LevelChange, ResourceCounts, SimBoard};

use crate::{
    irq::{IrqHandler, IrqNumber, Trigger},
    line::{Direction, Level, LineId},
    Result,
};

pub trait GpioBackend: Send + Sync + 'static {
    /// Claims the line with global number `gpio`.
    ///
    /// Fails with [`Error::NoDevice`](crate::Error::NoDevice) when the number
    /// does not belong to this backend and [`Error::Busy`](crate::Error::Busy)
    /// when the line is already held.
    fn acquire_line(&self, gpio: u32, label: &str) -> Result<LineId>;

    fn set_direction(&self, line: LineId, direction: Direction) -> Result<()>;

    /// Reads the line level. Failures are logged and read as [`Level::Low`].
    fn read_level(&self, line: LineId) -> Level;

    /// Drives an output line. Failures are logged.
    fn write_level(&self, line: LineId, level: Level);

    fn line_to_irq(&self, line: LineId) -> Result<IrqNumber>;

    /// Registers `handler` for the edges in `trigger`.
    ///
    /// The handler runs in the backend's interrupt context and must not block.
    fn request_irq(
        &self,
        irq: IrqNumber,
        trigger: Trigger,
        name: &str,
        handler: IrqHandler,
    ) -> Result<()>;

    /// Unregisters the handler of `irq`. Returns once it can no longer run.
    fn free_irq(&self, irq: IrqNumber);

    fn release_line(&self, line: LineId);
}
