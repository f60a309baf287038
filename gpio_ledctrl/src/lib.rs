//! GPIO LED/button drivers.
//!
//! Three modules are provided, each a value whose construction is the
//! module's init and whose drop is its exit:
//!
//! - [`drivers::Hello`] logs on load and unload.
//! - [`drivers::DebouncedLed`] toggles an LED on a button press, debouncing
//!   the button interrupt with a one-shot [`timer::Timer`].
//! - [`drivers::LedSequence`] runs an LED sequence from a
//!   [`workqueue::Work`] item scheduled by the button interrupt.
//!
//! Drivers only use the [`backend::GpioBackend`] capability interface.
//!
//! # Examples
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use gpio_ledctrl::{backend::CdevBackend, drivers::DebouncedLed, Config};
//! let config = Config::default();
//! let chip = Arc::new(CdevBackend::open(&config.chip, config.gpio_base).unwrap());
//! let module = gpio_ledctrl::load::<DebouncedLed<_>, _>(&chip, &config).unwrap();
//! // ... press the button ...
//! module.unload();
//! ```

pub mod backend;
pub mod config;
pub mod drivers;
mod error;
pub mod irq;
pub mod line;
mod logging;
pub mod module;
pub mod timer;
pub mod workqueue;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use module::{load, Loaded, Module, ModuleInfo};
