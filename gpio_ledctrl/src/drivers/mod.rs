//! The LED/button modules.

pub mod hello;
pub mod led_irq;
pub mod led_wq;

pub use hello::Hello;
pub use led_irq::DebouncedLed;
pub use led_wq::LedSequence;
