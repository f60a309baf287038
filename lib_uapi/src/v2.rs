use std::{
    os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd},
    time::Duration,
};

use bitflags::bitflags;

use crate::{
    common::c_str,
    error::{Error, Result},
};

use self::ffi::{GpioV2LineConfig, GpioV2LineEvent, GpioV2LineInfo, GpioV2LineRequest};

bitflags! {
    /// Line flags, used both when requesting a line and in [`LineInfo`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineFlags: u64 {
        const USED                 = 1 << 0;
        const ACTIVE_LOW           = 1 << 1;
        const INPUT                = 1 << 2;
        const OUTPUT               = 1 << 3;
        const EDGE_RISING          = 1 << 4;
        const EDGE_FALLING         = 1 << 5;
        const OPEN_DRAIN           = 1 << 6;
        const OPEN_SOURCE          = 1 << 7;
        const BIAS_PULL_UP         = 1 << 8;
        const BIAS_PULL_DOWN       = 1 << 9;
        const BIAS_DISABLED        = 1 << 10;
        const EVENT_CLOCK_REALTIME = 1 << 11;
        const EVENT_CLOCK_HTE      = 1 << 12;
    }
}

/// Information about a single line as reported by the chip.
#[derive(Debug, Clone)]
pub struct LineInfo {
    pub offset: u32,
    pub name: String,
    pub consumer: String,
    pub flags: LineFlags,
}

impl From<&GpioV2LineInfo> for LineInfo {
    fn from(inner: &GpioV2LineInfo) -> Self {
        Self {
            offset: inner.offset,
            name: c_str(&inner.name),
            consumer: c_str(&inner.consumer),
            flags: LineFlags::from_bits_retain(inner.flags),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

/// An edge event read from a line request.
#[derive(Debug, Clone, Copy)]
pub struct EdgeEvent {
    pub timestamp_ns: u64,
    pub kind: EdgeKind,
    pub offset: u32,
    pub seqno: u32,
    pub line_seqno: u32,
}

impl From<&GpioV2LineEvent> for EdgeEvent {
    fn from(ev: &GpioV2LineEvent) -> Self {
        // the kernel only ever reports the two edge ids
        let kind = if ev.id == ffi::GpioV2LineEventId::RisingEdge as u32 {
            EdgeKind::Rising
        } else {
            EdgeKind::Falling
        };
        Self {
            timestamp_ns: ev.timestamp_ns,
            kind,
            offset: ev.offset,
            seqno: ev.seqno,
            line_seqno: ev.line_seqno,
        }
    }
}

fn line_config(flags: LineFlags, output: Option<bool>) -> GpioV2LineConfig {
    let mut config: GpioV2LineConfig = unsafe { std::mem::zeroed() };
    config.flags = flags.bits();
    if let Some(value) = output {
        config.num_attrs = 1;
        config.attrs[0].attr.id = ffi::GpioV2LineAttrId::OutputValues as u32;
        config.attrs[0].attr.u = ffi::Union {
            values: u64::from(value),
        };
        config.attrs[0].mask = 1;
    }
    config
}

/// Get the information of the line at `offset`.
pub fn line_info(chip: BorrowedFd<'_>, offset: u32) -> Result<LineInfo> {
    let mut inner: GpioV2LineInfo = unsafe { std::mem::zeroed() };
    inner.offset = offset;
    ffi::gpio_v2_get_lineinfo_ioctl(chip.as_raw_fd(), &mut inner)?;
    Ok(LineInfo::from(&inner))
}

/// Requests a single line from the chip.
///
/// `output` is the initial value when `flags` contains [`LineFlags::OUTPUT`].
/// The returned descriptor owns the request; closing it releases the line.
pub fn request_line(
    chip: BorrowedFd<'_>,
    offset: u32,
    consumer: &str,
    flags: LineFlags,
    output: Option<bool>,
) -> Result<OwnedFd> {
    let mut req: GpioV2LineRequest = unsafe { std::mem::zeroed() };
    req.offsets[0] = offset;
    req.num_lines = 1;
    req.consumer.fill(consumer);
    req.config = line_config(flags, output);
    ffi::gpio_v2_get_line_ioctl(chip.as_raw_fd(), &mut req)?;
    debug_assert!(req.fd > 0);
    Ok(unsafe { OwnedFd::from_raw_fd(req.fd) })
}

/// Changes the flags (direction, edge detection, ...) of a requested line.
pub fn reconfigure_line(request: BorrowedFd<'_>, flags: LineFlags, output: Option<bool>) -> Result<()> {
    let mut config = line_config(flags, output);
    ffi::gpio_v2_line_set_config_ioctl(request.as_raw_fd(), &mut config)?;
    Ok(())
}

/// Reads the logical value of the requested line.
pub fn get_value(request: BorrowedFd<'_>) -> Result<bool> {
    let mut values = ffi::GpioV2LineValues { bits: 0, mask: 1 };
    ffi::gpio_v2_line_get_values_ioctl(request.as_raw_fd(), &mut values)?;
    Ok(values.bits & 1 != 0)
}

/// Drives the requested output line.
pub fn set_value(request: BorrowedFd<'_>, value: bool) -> Result<()> {
    let mut values = ffi::GpioV2LineValues {
        bits: u64::from(value),
        mask: 1,
    };
    ffi::gpio_v2_line_set_values_ioctl(request.as_raw_fd(), &mut values)?;
    Ok(())
}

/// Waits up to `timeout` for an edge event to become readable.
///
/// Returns `false` on timeout or when interrupted by a signal.
pub fn wait_edge_event(request: BorrowedFd<'_>, timeout: Duration) -> Result<bool> {
    let mut pfd = libc::pollfd {
        fd: request.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    match unsafe { libc::poll(&mut pfd, 1, timeout_ms) } {
        -1 => match nix::Error::last() {
            nix::Error::EINTR => Ok(false),
            e => Err(Error::Poll(e)),
        },
        0 => Ok(false),
        _ => Ok(pfd.revents & libc::POLLIN != 0),
    }
}

/// Reads one edge event. Blocks if none is queued.
pub fn read_edge_event(request: BorrowedFd<'_>) -> Result<EdgeEvent> {
    const EV_LEN: usize = std::mem::size_of::<GpioV2LineEvent>();
    let mut ev: GpioV2LineEvent = unsafe { std::mem::zeroed() };
    let ptr = std::ptr::addr_of_mut!(ev) as *mut libc::c_void;
    match unsafe { libc::read(request.as_raw_fd(), ptr, EV_LEN) } {
        -1 => Err(Error::Read(nix::Error::last())),
        n if n.unsigned_abs() != EV_LEN => Err(Error::ShortRead {
            got: n.unsigned_abs(),
            want: EV_LEN,
        }),
        _ => Ok(EdgeEvent::from(&ev)),
    }
}

pub(crate) mod ffi {
    #![allow(dead_code)]
    use std::fmt::Debug;

    use crate::common::ffi::{CString, Padding, GPIO_MAX_NAME_SIZE};

    pub(crate) const GPIO_V2_LINES_MAX: usize = 64;
    pub(crate) const GPIO_V2_LINE_NUM_ATTRS_MAX: usize = 10;

    #[derive(Debug)]
    #[repr(C)]
    pub(crate) struct GpioV2LineValues {
        pub(crate) bits: u64,
        pub(crate) mask: u64,
    }

    #[derive(Debug)]
    #[repr(u32)]
    pub(crate) enum GpioV2LineAttrId {
        Flags = 1,
        OutputValues = 2,
        Debounce = 3,
    }

    #[repr(C)]
    pub(crate) union Union {
        pub(crate) flags: u64,
        pub(crate) values: u64,
        pub(crate) debounce_period_us: u32,
    }

    impl Debug for Union {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("Union")
        }
    }

    #[derive(Debug)]
    #[repr(C)]
    pub(crate) struct GpioV2LineAttribute {
        pub(crate) id: u32,
        pub(crate) padding: Padding<u32, 1>,
        pub(crate) u: Union,
    }

    #[derive(Debug)]
    #[repr(C)]
    pub(crate) struct GpioV2LineConfigAttribute {
        pub(crate) attr: GpioV2LineAttribute,
        pub(crate) mask: u64,
    }

    #[derive(Debug)]
    #[repr(C)]
    pub(crate) struct GpioV2LineConfig {
        pub(crate) flags: u64,
        pub(crate) num_attrs: u32,
        pub(crate) padding: Padding<u32, 5>,
        pub(crate) attrs: [GpioV2LineConfigAttribute; GPIO_V2_LINE_NUM_ATTRS_MAX],
    }

    #[derive(Debug)]
    #[repr(C)]
    pub(crate) struct GpioV2LineRequest {
        pub(crate) offsets: [u32; GPIO_V2_LINES_MAX],
        pub(crate) consumer: CString<GPIO_MAX_NAME_SIZE>,
        pub(crate) config: GpioV2LineConfig,
        pub(crate) num_lines: u32,
        pub(crate) event_buffer_size: u32,
        pub(crate) padding: Padding<u32, 5>,
        pub(crate) fd: libc::c_int,
    }

    #[derive(Debug)]
    #[repr(C)]
    pub(crate) struct GpioV2LineInfo {
        pub(crate) name: CString<GPIO_MAX_NAME_SIZE>,
        pub(crate) consumer: CString<GPIO_MAX_NAME_SIZE>,
        pub(crate) offset: u32,
        pub(crate) num_attrs: u32,
        pub(crate) flags: u64,
        pub(crate) attrs: [GpioV2LineAttribute; GPIO_V2_LINE_NUM_ATTRS_MAX],
        pub(crate) padding: Padding<u32, 4>,
    }

    #[derive(Debug)]
    #[repr(u32)]
    pub(crate) enum GpioV2LineEventId {
        RisingEdge = 1,
        FallingEdge = 2,
    }

    #[derive(Debug)]
    #[repr(C)]
    pub(crate) struct GpioV2LineEvent {
        pub(crate) timestamp_ns: u64,
        pub(crate) id: u32,
        pub(crate) offset: u32,
        pub(crate) seqno: u32,
        pub(crate) line_seqno: u32,
        pub(crate) padding: Padding<u32, 6>,
    }

    crate::macros::const_assert!(std::mem::size_of::<GpioV2LineAttribute>() == 16);
    crate::macros::const_assert!(std::mem::size_of::<GpioV2LineConfig>() == 272);
    crate::macros::const_assert!(std::mem::size_of::<GpioV2LineRequest>() == 592);
    crate::macros::const_assert!(std::mem::size_of::<GpioV2LineInfo>() == 256);
    crate::macros::const_assert!(std::mem::size_of::<GpioV2LineEvent>() == 48);

    crate::macros::wrap_ioctl!(
        ioctl_readwrite!(
            gpio_v2_get_lineinfo_ioctl,
            crate::common::ffi::GPIO_IOC_MAGIC,
            0x05,
            crate::v2::ffi::GpioV2LineInfo
        ),
        crate::error::IoctlKind::GetLineInfo
    );

    crate::macros::wrap_ioctl!(
        ioctl_readwrite!(
            gpio_v2_get_line_ioctl,
            crate::common::ffi::GPIO_IOC_MAGIC,
            0x07,
            crate::v2::ffi::GpioV2LineRequest
        ),
        crate::error::IoctlKind::GetLine
    );

    crate::macros::wrap_ioctl!(
        ioctl_readwrite!(
            gpio_v2_line_set_config_ioctl,
            crate::common::ffi::GPIO_IOC_MAGIC,
            0x0D,
            crate::v2::ffi::GpioV2LineConfig
        ),
        crate::error::IoctlKind::SetLineConfig
    );

    crate::macros::wrap_ioctl!(
        ioctl_readwrite!(
            gpio_v2_line_get_values_ioctl,
            crate::common::ffi::GPIO_IOC_MAGIC,
            0x0E,
            crate::v2::ffi::GpioV2LineValues
        ),
        crate::error::IoctlKind::GetValues
    );

    crate::macros::wrap_ioctl!(
        ioctl_readwrite!(
            gpio_v2_line_set_values_ioctl,
            crate::common::ffi::GPIO_IOC_MAGIC,
            0x0F,
            crate::v2::ffi::GpioV2LineValues
        ),
        crate::error::IoctlKind::SetValues
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_config_carries_initial_value() {
        let config = line_config(LineFlags::OUTPUT, Some(true));
        assert_eq!(config.flags, LineFlags::OUTPUT.bits());
        assert_eq!(config.num_attrs, 1);
        assert_eq!(config.attrs[0].attr.id, ffi::GpioV2LineAttrId::OutputValues as u32);
        assert_eq!(config.attrs[0].mask, 1);
        assert_eq!(unsafe { config.attrs[0].attr.u.values }, 1);
    }

    #[test]
    fn input_config_has_no_attributes() {
        let flags = LineFlags::INPUT | LineFlags::EDGE_FALLING;
        let config = line_config(flags, None);
        assert_eq!(config.flags, flags.bits());
        assert_eq!(config.num_attrs, 0);
    }

    #[test]
    fn edge_event_kind_from_id() {
        let mut ev: GpioV2LineEvent = unsafe { std::mem::zeroed() };
        ev.id = ffi::GpioV2LineEventId::FallingEdge as u32;
        ev.offset = 20;
        let parsed = EdgeEvent::from(&ev);
        assert_eq!(parsed.kind, EdgeKind::Falling);
        assert_eq!(parsed.offset, 20);

        ev.id = ffi::GpioV2LineEventId::RisingEdge as u32;
        assert_eq!(EdgeEvent::from(&ev).kind, EdgeKind::Rising);
    }
}
