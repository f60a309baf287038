mod common;

use std::thread;

use gpio_ledctrl::{
    drivers::DebouncedLed,
    irq::IrqReturn,
    line::{Direction, Level},
    load,
};

use common::*;

/// LED writes since the initial "off" set while loading.
fn toggles(board: &gpio_ledctrl::backend::SimBoard) -> usize {
    board.changes(LED).len().saturating_sub(1)
}

#[test]
fn init_configures_lines_and_irq() {
    let board = board();
    let module = load::<DebouncedLed<_>, _>(&board, &config()).unwrap();

    assert_eq!(board.direction(LED), Some(Direction::Output(Level::Low)));
    assert_eq!(board.direction(BUTTON), Some(Direction::Input));
    assert_eq!(board.holder(LED).as_deref(), Some("gpio_led_controller"));
    let irq = module.irq().unwrap();
    assert_eq!(board.irq_name(irq).as_deref(), Some("gpio_button_irq"));
    assert!(!module.is_armed());
}

#[test]
fn clean_press_toggles_once() {
    let board = board();
    let module = load::<DebouncedLed<_>, _>(&board, &config()).unwrap();

    assert_eq!(board.press(BUTTON), Some(IrqReturn::Handled));
    assert!(module.is_armed());
    assert_eq!(toggles(&board), 0);

    thread::sleep(DEBOUNCE * 4);
    assert_eq!(toggles(&board), 1);
    assert_eq!(board.level(LED), Some(Level::High));
    assert!(!module.is_armed());
}

#[test]
fn bouncing_press_toggles_once() {
    let board = board();
    let _module = load::<DebouncedLed<_>, _>(&board, &config()).unwrap();

    // contact bounce: three falling edges well inside one window
    board.press(BUTTON);
    board.release(BUTTON);
    board.press(BUTTON);
    board.release(BUTTON);
    board.press(BUTTON);

    thread::sleep(DEBOUNCE * 4);
    assert_eq!(toggles(&board), 1);
    assert_eq!(board.level(LED), Some(Level::High));
}

#[test]
fn unstable_level_drops_the_press() {
    let board = board();
    let _module = load::<DebouncedLed<_>, _>(&board, &config()).unwrap();

    board.press(BUTTON);
    // back high before the window closes; the check sees a different level
    board.release(BUTTON);

    thread::sleep(DEBOUNCE * 4);
    assert_eq!(toggles(&board), 0);
    assert_eq!(board.level(LED), Some(Level::Low));
}

#[test]
fn separate_presses_toggle_back_and_forth() {
    let board = board();
    let _module = load::<DebouncedLed<_>, _>(&board, &config()).unwrap();

    for expected in [Level::High, Level::Low, Level::High] {
        board.press(BUTTON);
        thread::sleep(DEBOUNCE * 4);
        board.release(BUTTON);
        assert_eq!(board.level(LED), Some(expected));
    }
    assert_eq!(toggles(&board), 3);
}

#[test]
fn unload_turns_led_off_and_releases_everything() {
    let board = board();
    let module = load::<DebouncedLed<_>, _>(&board, &config()).unwrap();

    board.press(BUTTON);
    assert!(wait_until(|| board.level(LED) == Some(Level::High)));
    module.unload();

    assert_eq!(board.level(LED), Some(Level::Low));
    assert!(board.counts().balanced());
    assert!(board.held().is_empty());
    assert_eq!(board.irq_count(), 0);
    // the button is no longer wired to anything
    board.release(BUTTON);
    assert_eq!(board.press(BUTTON), None);
}

#[test]
fn unload_cancels_pending_check() {
    let board = board();
    let module = load::<DebouncedLed<_>, _>(&board, &config()).unwrap();

    board.press(BUTTON);
    assert!(module.is_armed());
    module.unload();
    let writes = board.history().len();

    thread::sleep(DEBOUNCE * 4);
    assert_eq!(board.history().len(), writes);
    assert_eq!(board.level(LED), Some(Level::Low));
}
