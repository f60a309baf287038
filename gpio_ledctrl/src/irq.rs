//! Interrupt sources and handler registration.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::{backend::GpioBackend, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrqNumber(pub u32);

impl fmt::Display for IrqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "irq {}", self.0)
    }
}

bitflags! {
    /// Edges an interrupt handler is requested for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Trigger: u32 {
        const RISING  = 1 << 0;
        const FALLING = 1 << 1;
        const BOTH    = Self::RISING.bits() | Self::FALLING.bits();
    }
}

/// The return value from interrupt handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not from this device or was not handled.
    None,
    /// The interrupt was handled by this device.
    Handled,
}

/// Hard-interrupt handler. Must not block.
pub type IrqHandler = Arc<dyn Fn(IrqNumber) -> IrqReturn + Send + Sync>;

/// A requested interrupt line; freed on drop.
///
/// Once dropped, the handler is guaranteed not to be running and will not be
/// called again.
pub struct IrqRegistration<B: GpioBackend> {
    backend: Arc<B>,
    irq: IrqNumber,
}

impl<B: GpioBackend> IrqRegistration<B> {
    pub fn request<F>(
        backend: &Arc<B>,
        irq: IrqNumber,
        trigger: Trigger,
        name: &str,
        handler: F,
    ) -> Result<Self>
    where
        F: Fn(IrqNumber) -> IrqReturn + Send + Sync + 'static,
    {
        backend.request_irq(irq, trigger, name, Arc::new(handler))?;
        Ok(Self {
            backend: Arc::clone(backend),
            irq,
        })
    }

    pub fn irq(&self) -> IrqNumber {
        self.irq
    }
}

impl<B: GpioBackend> Drop for IrqRegistration<B> {
    fn drop(&mut self) {
        self.backend.free_irq(self.irq);
    }
}
