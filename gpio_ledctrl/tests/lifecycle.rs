mod common;

use std::sync::Arc;

use gpio_ledctrl::{
    backend::{FaultPoint, GpioBackend, ResourceCounts, SimBoard},
    drivers::{DebouncedLed, Hello, LedSequence},
    load, Module,
};
use nix::errno::Errno;

use common::*;

fn status(errno: Errno) -> Option<i32> {
    Some(-(errno as i32))
}

fn assert_released(board: &SimBoard) {
    assert!(board.counts().balanced(), "{:?}", board.counts());
    assert!(board.held().is_empty(), "still held: {:?}", board.held());
    assert_eq!(board.irq_count(), 0);
}

#[test]
fn hello_touches_no_hardware() {
    let board = board();
    let module = load::<Hello, _>(&board, &config()).unwrap();
    assert_eq!(module.info().name, "hello");
    module.unload();
    assert_eq!(board.counts(), ResourceCounts::default());
}

#[test]
fn module_metadata() {
    let info = <DebouncedLed<SimBoard> as Module<SimBoard>>::INFO;
    assert_eq!(info.name, "gpio_ledctrl_irq");
    assert_eq!(info.license, "MIT");
    assert!(!info.author.is_empty());
    assert!(info.to_string().contains("license:     MIT"));

    let info = <LedSequence<SimBoard> as Module<SimBoard>>::INFO;
    assert_eq!(info.name, "gpio_ledctrl_wq");
    assert!(!info.description.is_empty());
}

#[test]
fn irq_driver_unwinds_every_init_failure() {
    let cases = [
        (FaultPoint::Acquire(LED), Errno::ENODEV),
        (FaultPoint::Acquire(BUTTON), Errno::ENODEV),
        (FaultPoint::SetDirection(LED), Errno::EIO),
        (FaultPoint::SetDirection(BUTTON), Errno::EIO),
        (FaultPoint::LineToIrq(BUTTON), Errno::ENXIO),
        (FaultPoint::RequestIrq(BUTTON), Errno::EIO),
    ];
    for (fault, errno) in cases {
        let board = board();
        board.fail_at(fault);
        let result = load::<DebouncedLed<_>, _>(&board, &config());
        assert_eq!(result.err(), status(errno), "{fault:?}");
        assert_released(&board);
    }
}

#[test]
fn wq_driver_unwinds_every_init_failure() {
    let cases = [
        (FaultPoint::Acquire(RED), Errno::ENODEV),
        (FaultPoint::Acquire(BLUE), Errno::ENODEV),
        (FaultPoint::Acquire(BUTTON), Errno::ENODEV),
        (FaultPoint::SetDirection(YELLOW), Errno::EIO),
        (FaultPoint::SetDirection(BUTTON), Errno::EIO),
        (FaultPoint::LineToIrq(BUTTON), Errno::ENXIO),
        (FaultPoint::RequestIrq(BUTTON), Errno::EIO),
    ];
    for (fault, errno) in cases {
        let board = board();
        board.fail_at(fault);
        let result = load::<LedSequence<_>, _>(&board, &config());
        assert_eq!(result.err(), status(errno), "{fault:?}");
        assert_released(&board);
    }
}

#[test]
fn held_pin_makes_load_busy() {
    let board = board();
    let other = board.acquire_line(BUTTON, "someone-else").unwrap();

    let result = load::<DebouncedLed<_>, _>(&board, &config());
    assert_eq!(result.err(), status(Errno::EBUSY));
    // only the foreign line is left
    assert_eq!(board.held(), [BUTTON]);

    board.release_line(other);
    assert_released(&board);
}

#[test]
fn drivers_sharing_pins_exclude_each_other() {
    let board = board();
    let config = config();
    let irq = load::<DebouncedLed<_>, _>(&board, &config).unwrap();

    // yellow is the irq driver's LED
    let result = load::<LedSequence<_>, _>(&board, &config);
    assert_eq!(result.err(), status(Errno::EBUSY));
    assert_eq!(board.counts().irqs_requested, 1);

    irq.unload();
    let wq = load::<LedSequence<_>, _>(&board, &config).unwrap();
    wq.unload();
    assert_released(&board);
}

#[test]
fn reload_after_unload() {
    let board = board();
    for _ in 0..3 {
        let module = load::<DebouncedLed<_>, _>(&board, &config()).unwrap();
        assert_eq!(board.held().len(), 2);
        module.unload();
    }
    assert_eq!(board.counts().lines_acquired, 6);
    assert_released(&board);
}

#[test]
fn lines_outside_the_chip_have_no_device() {
    let board = Arc::new(SimBoard::new(BASE, 16));
    // the LED and button pins are past the end of this chip
    let result = load::<DebouncedLed<_>, _>(&board, &config());
    assert_eq!(result.err(), status(Errno::ENODEV));
    assert_released(&board);
}

#[test]
fn gpio_base_overflow_fails_the_load() {
    let board = board();
    let mut config = config();
    config.gpio_base = u32::MAX;

    let result = load::<DebouncedLed<_>, _>(&board, &config);
    assert_eq!(result.err(), status(Errno::ENODEV));
    assert_released(&board);

    // red (pin 12) overflows before anything is acquired
    let result = load::<LedSequence<_>, _>(&board, &config);
    assert_eq!(result.err(), status(Errno::ENODEV));
    assert_released(&board);
    assert_eq!(board.counts(), ResourceCounts::default());
}
