use std::sync::Arc;

use log::info;

use crate::{
    backend::GpioBackend,
    module::{Module, ModuleInfo},
    Config, Result,
};

/// Does nothing but log on load and unload.
#[derive(Debug)]
pub struct Hello;

impl<B: GpioBackend> Module<B> for Hello {
    const INFO: ModuleInfo = ModuleInfo::new("hello", "Hello world module");

    fn init(_backend: &Arc<B>, _config: &Config) -> Result<Self> {
        info!("Hello from a dummy char device driver");
        Ok(Self)
    }
}

impl Drop for Hello {
    fn drop(&mut self) {
        info!("Goodbye from a dummy char device driver");
    }
}
