//! Bindings for the GPIO character device uAPI v2
//! ([gpio.h](https://elixir.bootlin.com/linux/v6.9.2/source/include/uapi/linux/gpio.h)).
//!
//! Only the single-line subset is wrapped: chip and line information, line
//! requests, get/set values, reconfiguration and edge events.

#![allow(unsafe_code)]

mod common;
pub mod error;
mod macros;
mod v2;

pub use common::{chip_info, ChipInfo};
pub use error::{Error, IoctlKind, Result};
pub use v2::{
    get_value, line_info, read_edge_event, reconfigure_line, request_line, set_value,
    wait_edge_event, EdgeEvent, EdgeKind, LineFlags, LineInfo,
};
