use std::{borrow::Cow, ffi::CStr, os::fd::{AsRawFd, BorrowedFd}};

use crate::Result;

pub(crate) mod ffi {
    pub(crate) const GPIO_MAX_NAME_SIZE: usize = 32;
    pub(crate) const GPIO_IOC_MAGIC: u8 = 0xB4;

    #[derive(Debug)]
    #[repr(transparent)]
    pub(crate) struct Padding<T, const N: usize>(pub(crate) [T; N]);

    #[derive(Debug)]
    #[repr(transparent)]
    pub(crate) struct CString<const N: usize>(pub(crate) [libc::c_char; N]);

    impl<const N: usize> CString<N> {
        /// Copies `s` in, truncated so that a terminating nul always fits.
        pub(crate) fn fill(&mut self, s: &str) {
            self.0.fill(0);
            for (dst, src) in self.0.iter_mut().zip(s.bytes().take(N - 1)) {
                *dst = src as libc::c_char;
            }
        }

        pub(crate) fn as_bytes(&self) -> [u8; N] {
            self.0.map(|c| c as u8)
        }
    }

    /// Information about a certain GPIO chip
    #[derive(Debug)]
    #[repr(C)]
    pub(crate) struct GpioChipInfo {
        pub(crate) name: CString<GPIO_MAX_NAME_SIZE>,
        pub(crate) label: CString<GPIO_MAX_NAME_SIZE>,
        /// number of GPIO lines on this chip
        pub(crate) lines: u32,
    }

    crate::macros::const_assert!(std::mem::size_of::<GpioChipInfo>() == 68);

    crate::macros::wrap_ioctl!(
        ioctl_read!(
            gpio_get_chipinfo_ioctl,
            crate::common::ffi::GPIO_IOC_MAGIC,
            0x01,
            crate::common::ffi::GpioChipInfo
        ),
        crate::error::IoctlKind::GetChipInfo
    );
}

pub(crate) fn c_str<const N: usize>(s: &ffi::CString<N>) -> String {
    let bytes = s.as_bytes();
    CStr::from_bytes_until_nul(&bytes)
        .map(CStr::to_string_lossy)
        .map(Cow::into_owned)
        .unwrap_or_default()
}

/// Information about a GPIO chip.
#[derive(Debug, Clone)]
pub struct ChipInfo {
    pub name: String,
    pub label: String,
    /// Number of lines the chip exposes.
    pub lines: u32,
}

/// Asks the kernel for the name, label and line count of an open chip.
pub fn chip_info(chip: BorrowedFd<'_>) -> Result<ChipInfo> {
    let mut inner: ffi::GpioChipInfo = unsafe { std::mem::zeroed() };
    ffi::gpio_get_chipinfo_ioctl(chip.as_raw_fd(), &mut inner)?;
    Ok(ChipInfo {
        name: c_str(&inner.name),
        label: c_str(&inner.label),
        lines: inner.lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cstring_fill_truncates_and_terminates() {
        let mut s: ffi::CString<8> = ffi::CString([0; 8]);
        s.fill("gpio_button_irq");
        assert_eq!(c_str(&s), "gpio_bu");
        assert_eq!(s.0[7], 0);

        s.fill("led");
        assert_eq!(c_str(&s), "led");
    }
}
