use std::path::PathBuf;

use nix::errno::Errno;

use crate::irq::IrqNumber;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no GPIO descriptor for gpio {gpio}")]
    NoDevice { gpio: u32 },
    #[error("gpio {gpio} is already in use")]
    Busy { gpio: u32 },
    #[error("gpio chip {}: {}", .path.display(), .source)]
    Chip {
        path: PathBuf,
        source: lib_uapi::Error,
    },
    #[error("gpio {gpio}: {source}")]
    Uapi { gpio: u32, source: lib_uapi::Error },
    #[error("{irq} cannot be requested: {errno}")]
    Irq { irq: IrqNumber, errno: Errno },
    #[error("{op} on gpio {gpio} failed: {errno}")]
    Fault {
        op: &'static str,
        gpio: u32,
        errno: Errno,
    },
    #[error("failed to spawn `{name}` thread: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn uapi(gpio: u32) -> impl FnOnce(lib_uapi::Error) -> Self {
        move |source| Self::Uapi { gpio, source }
    }

    /// The errno this failure is reported with.
    pub fn errno(&self) -> Errno {
        match self {
            Self::NoDevice { .. } => Errno::ENODEV,
            Self::Busy { .. } => Errno::EBUSY,
            Self::Chip { source, .. } | Self::Uapi { source, .. } => source.errno(),
            Self::Irq { errno, .. } | Self::Fault { errno, .. } => *errno,
            Self::Spawn { source, .. } => source
                .raw_os_error()
                .map_or(Errno::EAGAIN, Errno::from_raw),
            Self::Io(e) => e.raw_os_error().map_or(Errno::EIO, Errno::from_raw),
            Self::Config(_) => Errno::EINVAL,
        }
    }

    /// Negative status code, as returned by a failed module init.
    pub fn status(&self) -> i32 {
        -(self.errno() as i32)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
