//! Board and driver parameters.
//!
//! Every field has a default matching a Raspberry Pi 4B wired as the
//! drivers expect, so an empty file (or no file at all) is a valid config.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// GPIO character device the lines live on.
    pub chip: PathBuf,
    /// Global number of the chip's first line. Pins are offsets from it.
    pub gpio_base: u32,
    pub irq: IrqLedConfig,
    pub wq: WqLedConfig,
}

/// Parameters of the debounced IRQ LED controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct IrqLedConfig {
    pub device_name: String,
    pub irq_name: String,
    pub led_pin: u32,
    pub button_pin: u32,
    pub debounce_ms: u64,
}

/// Parameters of the workqueue LED controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WqLedConfig {
    pub device_name: String,
    pub irq_name: String,
    /// Toggled in this order by each run of the bottom half.
    pub leds: Vec<LedConfig>,
    pub button_pin: u32,
    pub step_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LedConfig {
    pub name: String,
    pub pin: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chip: "/dev/gpiochip0".into(),
            gpio_base: 512,
            irq: IrqLedConfig::default(),
            wq: WqLedConfig::default(),
        }
    }
}

impl Default for IrqLedConfig {
    fn default() -> Self {
        Self {
            device_name: "gpio_led_controller".to_owned(),
            irq_name: "gpio_button_irq".to_owned(),
            led_pin: 21,
            button_pin: 20,
            debounce_ms: 120,
        }
    }
}

impl Default for WqLedConfig {
    fn default() -> Self {
        let led = |name: &str, pin| LedConfig {
            name: name.to_owned(),
            pin,
        };
        Self {
            device_name: "gpio_led_controller_wq".to_owned(),
            irq_name: "gpio_button_irq".to_owned(),
            leds: vec![led("red", 12), led("blue", 16), led("yellow", 21)],
            button_pin: 20,
            step_delay_ms: 500,
        }
    }
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        debug!("loading config from {}", path.display());
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Global GPIO number of `pin`. A number past `u32::MAX` has no device.
    pub fn gpio(&self, pin: u32) -> Result<u32> {
        self.gpio_base
            .checked_add(pin)
            .ok_or(Error::NoDevice { gpio: pin })
    }
}

impl IrqLedConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl WqLedConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}
