#![allow(dead_code)]

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use gpio_ledctrl::{backend::SimBoard, line::Level, Config};

pub(crate) const BASE: u32 = 512;
pub(crate) const NGPIO: u32 = 58;

pub(crate) const BUTTON: u32 = BASE + 20;
pub(crate) const LED: u32 = BASE + 21;
pub(crate) const RED: u32 = BASE + 12;
pub(crate) const BLUE: u32 = BASE + 16;
pub(crate) const YELLOW: u32 = BASE + 21;

pub(crate) const DEBOUNCE: Duration = Duration::from_millis(50);
pub(crate) const STEP: Duration = Duration::from_millis(30);

/// A board with the button resting high on its pull-up.
pub(crate) fn board() -> Arc<SimBoard> {
    let board = SimBoard::new(BASE, NGPIO);
    board.pull(BUTTON, Level::High);
    Arc::new(board)
}

/// Default wiring with shortened delays.
pub(crate) fn config() -> Config {
    let mut config = Config::default();
    config.irq.debounce_ms = DEBOUNCE.as_millis() as u64;
    config.wq.step_delay_ms = STEP.as_millis() as u64;
    config
}

/// Polls `done` until it holds or two seconds pass.
pub(crate) fn wait_until(done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
    true
}
