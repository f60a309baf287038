//! Module lifecycle.
//!
//! A module is a value: [`Module::init`] builds it, acquiring everything it
//! needs, and dropping it is the exit path. [`load`] wraps init the way a
//! module loader does, turning failures into negative errno status codes.

use std::{fmt, ops::Deref, sync::Arc};

use log::{error, info};

use crate::{backend::GpioBackend, Config, Result};

/// Declarative module metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub author: &'static str,
    pub license: &'static str,
}

impl ModuleInfo {
    /// Metadata with this crate's author and license.
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            author: env!("CARGO_PKG_AUTHORS"),
            license: env!("CARGO_PKG_LICENSE"),
        }
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name:        {}", self.name)?;
        writeln!(f, "description: {}", self.description)?;
        writeln!(f, "author:      {}", self.author)?;
        write!(f, "license:     {}", self.license)
    }
}

pub trait Module<B: GpioBackend>: Sized + Send {
    const INFO: ModuleInfo;

    /// Acquires the module's resources. On error, whatever was acquired has
    /// already been released.
    fn init(backend: &Arc<B>, config: &Config) -> Result<Self>;
}

/// A loaded module. Unloads on drop.
pub struct Loaded<M> {
    module: M,
    // dropped after `module`
    unloaded: UnloadNotice,
}

struct UnloadNotice(ModuleInfo);

impl Drop for UnloadNotice {
    fn drop(&mut self) {
        info!("{}: module unloaded", self.0.name);
    }
}

/// Runs `M`'s init. A failure is logged and returned as a negative errno.
pub fn load<M, B>(backend: &Arc<B>, config: &Config) -> std::result::Result<Loaded<M>, i32>
where
    M: Module<B>,
    B: GpioBackend,
{
    let info = M::INFO;
    match M::init(backend, config) {
        Ok(module) => {
            info!("{}: module loaded", info.name);
            Ok(Loaded {
                module,
                unloaded: UnloadNotice(info),
            })
        }
        Err(e) => {
            let status = e.status();
            error!("{}: init failed with {status}: {e}", info.name);
            Err(status)
        }
    }
}

impl<M> Loaded<M> {
    pub fn info(&self) -> &ModuleInfo {
        &self.unloaded.0
    }

    /// Runs the module's exit path now.
    pub fn unload(self) {}
}

impl<M> Deref for Loaded<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.module
    }
}
