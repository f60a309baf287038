#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Ioctl to {:?} failed: {}", .kind, .source)]
    Ioctl { kind: IoctlKind, source: nix::Error },
    #[error("Reading line event failed: {}", .0)]
    Read(nix::Error),
    #[error("Short line event read: {} of {} bytes", .got, .want)]
    ShortRead { got: usize, want: usize },
    #[error("Polling line request failed: {}", .0)]
    Poll(nix::Error),
}

impl Error {
    /// The errno reported by the kernel, `EIO` for a short read.
    pub fn errno(&self) -> nix::Error {
        match self {
            Self::Ioctl { source, .. } => *source,
            Self::Read(e) | Self::Poll(e) => *e,
            Self::ShortRead { .. } => nix::Error::EIO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlKind {
    GetChipInfo,
    GetLineInfo,
    GetLine,
    SetLineConfig,
    GetValues,
    SetValues,
}

pub(crate) fn ioctl_error(kind: IoctlKind, source: nix::Error) -> Error {
    Error::Ioctl { kind, source }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_is_carried_through() {
        let e = ioctl_error(IoctlKind::GetLine, nix::Error::EBUSY);
        assert_eq!(e.errno(), nix::Error::EBUSY);
        assert!(e.to_string().contains("GetLine"));

        let e = Error::ShortRead { got: 4, want: 48 };
        assert_eq!(e.errno(), nix::Error::EIO);
    }
}
