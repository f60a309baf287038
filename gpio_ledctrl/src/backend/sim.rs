//! In-memory GPIO board.
//!
//! Lines start low and unheld. Tests drive input levels with
//! [`SimBoard::drive`]; when the new level forms an edge an interrupt handler
//! was requested for, the handler runs synchronously on the driving thread,
//! which stands in for hard-interrupt context. Every output level written is
//! recorded with a timestamp, and every acquisition and release is counted.

use std::{
    collections::{HashMap, HashSet},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use log::{debug, warn};
use nix::errno::Errno;

use crate::{
    backend::GpioBackend,
    irq::{IrqHandler, IrqNumber, IrqReturn, Trigger},
    line::{Direction, Level, LineId},
    Error, Result,
};

/// Interrupt numbers handed out by [`SimBoard`] start here.
const SIM_IRQ_BASE: u32 = 160;

/// Acquisition step at which [`SimBoard`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// The line has no descriptor, as if the pin did not exist.
    Acquire(u32),
    SetDirection(u32),
    LineToIrq(u32),
    /// Requesting the interrupt of this gpio fails.
    RequestIrq(u32),
}

/// Running totals of resources handed out and given back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCounts {
    pub lines_acquired: usize,
    pub lines_released: usize,
    pub irqs_requested: usize,
    pub irqs_freed: usize,
}

impl ResourceCounts {
    /// Everything acquired has been released.
    pub fn balanced(&self) -> bool {
        self.lines_acquired == self.lines_released && self.irqs_requested == self.irqs_freed
    }
}

/// An output level written by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub gpio: u32,
    pub level: Level,
    pub at: Instant,
}

#[derive(Debug)]
struct SimLine {
    level: Level,
    direction: Option<Direction>,
    holder: Option<String>,
}

struct Registration {
    gpio: u32,
    trigger: Trigger,
    name: String,
    handler: IrqHandler,
}

#[derive(Default)]
struct Board {
    lines: Vec<SimLine>,
    irqs: HashMap<IrqNumber, Registration>,
    in_flight: HashMap<IrqNumber, usize>,
    faults: HashSet<FaultPoint>,
    counts: ResourceCounts,
    history: Vec<LevelChange>,
}

pub struct SimBoard {
    base: u32,
    board: Mutex<Board>,
    handlers_done: Condvar,
}

impl SimBoard {
    /// A board whose `ngpio` lines are numbered from `base`.
    pub fn new(base: u32, ngpio: u32) -> Self {
        let lines = (0..ngpio)
            .map(|_| SimLine {
                level: Level::Low,
                direction: None,
                holder: None,
            })
            .collect();
        Self {
            base,
            board: Mutex::new(Board {
                lines,
                ..Default::default()
            }),
            handlers_done: Condvar::new(),
        }
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index(&self, gpio: u32) -> Option<usize> {
        gpio.checked_sub(self.base).map(|i| i as usize)
    }

    fn gpio_of_irq(&self, irq: IrqNumber) -> Option<u32> {
        irq.0
            .checked_sub(SIM_IRQ_BASE)
            .and_then(|offset| self.base.checked_add(offset))
    }

    /// Makes the next operation described by `fault` fail, and every one after it.
    pub fn fail_at(&self, fault: FaultPoint) {
        self.board().faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        self.board().faults.clear();
    }

    /// Sets the resting level of a line, e.g. a button with a pull-up,
    /// without generating an edge.
    pub fn pull(&self, gpio: u32, level: Level) {
        let mut board = self.board();
        if let Some(line) = self.index(gpio).and_then(|i| board.lines.get_mut(i)) {
            line.level = level;
        }
    }

    /// Drives an input line from the outside world.
    ///
    /// If the change is an edge a handler was requested for, the handler
    /// runs before this returns and its result is passed back.
    pub fn drive(&self, gpio: u32, level: Level) -> Option<IrqReturn> {
        let mut board = self.board();
        let line = self.index(gpio).and_then(|i| board.lines.get_mut(i))?;
        if matches!(line.direction, Some(Direction::Output(_))) {
            warn!("sim: gpio{gpio} is an output, ignoring external drive");
            return None;
        }
        let edge = match (line.level, level) {
            (Level::High, Level::Low) => Trigger::FALLING,
            (Level::Low, Level::High) => Trigger::RISING,
            _ => Trigger::empty(),
        };
        line.level = level;
        if edge.is_empty() {
            return None;
        }

        let (irq, handler) = board
            .irqs
            .iter()
            .find(|(_, r)| r.gpio == gpio && r.trigger.intersects(edge))
            .map(|(irq, r)| (*irq, r.handler.clone()))?;
        *board.in_flight.entry(irq).or_default() += 1;
        drop(board);

        let ret = handler(irq);

        let mut board = self.board();
        if let Some(n) = board.in_flight.get_mut(&irq) {
            *n -= 1;
        }
        self.handlers_done.notify_all();
        Some(ret)
    }

    /// A falling edge on a button wired with a pull-up.
    pub fn press(&self, gpio: u32) -> Option<IrqReturn> {
        self.drive(gpio, Level::Low)
    }

    pub fn release(&self, gpio: u32) -> Option<IrqReturn> {
        self.drive(gpio, Level::High)
    }

    pub fn level(&self, gpio: u32) -> Option<Level> {
        let board = self.board();
        self.index(gpio)
            .and_then(|i| board.lines.get(i))
            .map(|line| line.level)
    }

    pub fn direction(&self, gpio: u32) -> Option<Direction> {
        let board = self.board();
        self.index(gpio)
            .and_then(|i| board.lines.get(i))
            .and_then(|line| line.direction)
    }

    /// Consumer label of a held line.
    pub fn holder(&self, gpio: u32) -> Option<String> {
        let board = self.board();
        self.index(gpio)
            .and_then(|i| board.lines.get(i))
            .and_then(|line| line.holder.clone())
    }

    /// Global numbers of all currently held lines.
    pub fn held(&self) -> Vec<u32> {
        let board = self.board();
        (self.base..)
            .zip(board.lines.iter())
            .filter(|(_, line)| line.holder.is_some())
            .map(|(gpio, _)| gpio)
            .collect()
    }

    /// Name of the handler registered for `irq`.
    pub fn irq_name(&self, irq: IrqNumber) -> Option<String> {
        self.board().irqs.get(&irq).map(|r| r.name.clone())
    }

    pub fn irq_count(&self) -> usize {
        self.board().irqs.len()
    }

    pub fn counts(&self) -> ResourceCounts {
        self.board().counts
    }

    /// All output writes so far, oldest first.
    pub fn history(&self) -> Vec<LevelChange> {
        self.board().history.clone()
    }

    /// Output writes to one line, oldest first.
    pub fn changes(&self, gpio: u32) -> Vec<LevelChange> {
        self.board()
            .history
            .iter()
            .filter(|c| c.gpio == gpio)
            .copied()
            .collect()
    }

    fn fault(&self, board: &Board, fault: FaultPoint) -> bool {
        board.faults.contains(&fault)
    }
}

impl GpioBackend for SimBoard {
    fn acquire_line(&self, gpio: u32, label: &str) -> Result<LineId> {
        let mut board = self.board();
        if self.fault(&board, FaultPoint::Acquire(gpio)) {
            return Err(Error::NoDevice { gpio });
        }
        let line = self
            .index(gpio)
            .and_then(|i| board.lines.get_mut(i))
            .ok_or(Error::NoDevice { gpio })?;
        if line.holder.is_some() {
            return Err(Error::Busy { gpio });
        }
        line.holder = Some(label.to_owned());
        board.counts.lines_acquired += 1;
        debug!("sim: gpio{gpio} acquired by {label}");
        Ok(LineId::from_gpio(gpio))
    }

    fn set_direction(&self, line: LineId, direction: Direction) -> Result<()> {
        let gpio = line.gpio();
        let mut board = self.board();
        if self.fault(&board, FaultPoint::SetDirection(gpio)) {
            return Err(Error::Fault {
                op: "set_direction",
                gpio,
                errno: Errno::EIO,
            });
        }
        let sim = self
            .index(gpio)
            .and_then(|i| board.lines.get_mut(i))
            .filter(|l| l.holder.is_some())
            .ok_or(Error::NoDevice { gpio })?;
        sim.direction = Some(direction);
        if let Direction::Output(level) = direction {
            sim.level = level;
            board.history.push(LevelChange {
                gpio,
                level,
                at: Instant::now(),
            });
        }
        Ok(())
    }

    fn read_level(&self, line: LineId) -> Level {
        let board = self.board();
        match self
            .index(line.gpio())
            .and_then(|i| board.lines.get(i))
            .filter(|l| l.holder.is_some())
        {
            Some(sim) => sim.level,
            None => {
                warn!("sim: read of unheld {line}");
                Level::Low
            }
        }
    }

    fn write_level(&self, line: LineId, level: Level) {
        let gpio = line.gpio();
        let mut board = self.board();
        let Some(sim) = self
            .index(gpio)
            .and_then(|i| board.lines.get_mut(i))
            .filter(|l| l.holder.is_some())
        else {
            warn!("sim: write to unheld {line}");
            return;
        };
        if !matches!(sim.direction, Some(Direction::Output(_))) {
            warn!("sim: write to {line}, which is not an output");
            return;
        }
        sim.level = level;
        board.history.push(LevelChange {
            gpio,
            level,
            at: Instant::now(),
        });
    }

    fn line_to_irq(&self, line: LineId) -> Result<IrqNumber> {
        let gpio = line.gpio();
        let board = self.board();
        if self.fault(&board, FaultPoint::LineToIrq(gpio)) {
            return Err(Error::Fault {
                op: "line_to_irq",
                gpio,
                errno: Errno::ENXIO,
            });
        }
        gpio.checked_sub(self.base)
            .and_then(|offset| offset.checked_add(SIM_IRQ_BASE))
            .map(IrqNumber)
            .ok_or(Error::NoDevice { gpio })
    }

    fn request_irq(
        &self,
        irq: IrqNumber,
        trigger: Trigger,
        name: &str,
        handler: IrqHandler,
    ) -> Result<()> {
        let mut board = self.board();
        let gpio = self
            .gpio_of_irq(irq)
            .filter(|&gpio| self.index(gpio).is_some_and(|i| i < board.lines.len()))
            .ok_or(Error::Irq {
                irq,
                errno: Errno::EINVAL,
            })?;
        if self.fault(&board, FaultPoint::RequestIrq(gpio)) {
            return Err(Error::Fault {
                op: "request_irq",
                gpio,
                errno: Errno::EIO,
            });
        }
        if board.irqs.contains_key(&irq) {
            return Err(Error::Irq {
                irq,
                errno: Errno::EBUSY,
            });
        }
        board.irqs.insert(
            irq,
            Registration {
                gpio,
                trigger,
                name: name.to_owned(),
                handler,
            },
        );
        board.counts.irqs_requested += 1;
        Ok(())
    }

    fn free_irq(&self, irq: IrqNumber) {
        let mut board = self.board();
        if board.irqs.remove(&irq).is_none() {
            warn!("sim: trying to free already-free {irq}");
            return;
        }
        board.counts.irqs_freed += 1;
        while board.in_flight.get(&irq).is_some_and(|&n| n > 0) {
            board = self
                .handlers_done
                .wait(board)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn release_line(&self, line: LineId) {
        let mut board = self.board();
        let Some(sim) = self
            .index(line.gpio())
            .and_then(|i| board.lines.get_mut(i))
            .filter(|l| l.holder.is_some())
        else {
            warn!("sim: release of unheld {line}");
            return;
        };
        sim.holder = None;
        sim.direction = None;
        board.counts.lines_released += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    const BASE: u32 = 512;

    #[test]
    fn lines_are_exclusive() {
        let board = SimBoard::new(BASE, 32);
        let id = board.acquire_line(532, "button").unwrap();
        assert_eq!(board.holder(532).as_deref(), Some("button"));
        assert!(matches!(
            board.acquire_line(532, "again"),
            Err(Error::Busy { gpio: 532 })
        ));
        board.release_line(id);
        assert!(board.held().is_empty());
        assert!(board.counts().balanced());
    }

    #[test]
    fn unknown_lines_have_no_device() {
        let board = SimBoard::new(BASE, 32);
        assert!(matches!(
            board.acquire_line(21, "led"),
            Err(Error::NoDevice { gpio: 21 })
        ));
        assert!(matches!(
            board.acquire_line(BASE + 32, "led"),
            Err(Error::NoDevice { .. })
        ));
        assert_eq!(board.counts(), ResourceCounts::default());
    }

    #[test]
    fn outputs_are_recorded() {
        let board = SimBoard::new(BASE, 32);
        let led = board.acquire_line(533, "led").unwrap();
        board.set_direction(led, Direction::Output(Level::Low)).unwrap();
        board.write_level(led, Level::High);
        assert_eq!(board.read_level(led), Level::High);

        let levels: Vec<_> = board.changes(533).iter().map(|c| c.level).collect();
        assert_eq!(levels, [Level::Low, Level::High]);
    }

    #[test]
    fn falling_edge_runs_handler() {
        let board = SimBoard::new(BASE, 32);
        let button = board.acquire_line(532, "button").unwrap();
        board.set_direction(button, Direction::Input).unwrap();
        board.pull(532, Level::High);

        let hits = Arc::new(AtomicUsize::new(0));
        let irq = board.line_to_irq(button).unwrap();
        let h = Arc::clone(&hits);
        board
            .request_irq(
                irq,
                Trigger::FALLING,
                "button",
                Arc::new(move |_| {
                    h.fetch_add(1, Ordering::SeqCst);
                    IrqReturn::Handled
                }),
            )
            .unwrap();
        assert_eq!(board.irq_name(irq).as_deref(), Some("button"));

        assert_eq!(board.press(532), Some(IrqReturn::Handled));
        // rising edge is not requested
        assert_eq!(board.release(532), None);
        // no edge, level unchanged
        assert_eq!(board.drive(532, Level::High), None);
        assert_eq!(board.press(532), Some(IrqReturn::Handled));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        board.free_irq(irq);
        assert_eq!(board.release(532), None);
        assert_eq!(board.press(532), None);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn duplicate_irq_request_is_busy() {
        let board = SimBoard::new(BASE, 32);
        let button = board.acquire_line(532, "button").unwrap();
        let irq = board.line_to_irq(button).unwrap();
        let handler: IrqHandler = Arc::new(|_| IrqReturn::Handled);
        board
            .request_irq(irq, Trigger::FALLING, "a", handler.clone())
            .unwrap();
        let err = board
            .request_irq(irq, Trigger::FALLING, "b", handler)
            .unwrap_err();
        assert_eq!(err.errno(), Errno::EBUSY);
    }

    #[test]
    fn out_of_range_irq_is_invalid() {
        let board = SimBoard::new(BASE, 32);
        let handler: IrqHandler = Arc::new(|_| IrqReturn::Handled);
        for irq in [IrqNumber(u32::MAX), IrqNumber(SIM_IRQ_BASE + 32), IrqNumber(3)] {
            let err = board
                .request_irq(irq, Trigger::FALLING, "button", handler.clone())
                .unwrap_err();
            assert_eq!(err.errno(), Errno::EINVAL, "{irq}");
        }
        assert_eq!(board.irq_count(), 0);
        assert_eq!(board.counts(), ResourceCounts::default());
    }

    #[test]
    fn faults_fire_at_the_requested_step() {
        let board = SimBoard::new(BASE, 32);
        board.fail_at(FaultPoint::SetDirection(533));
        let led = board.acquire_line(533, "led").unwrap();
        let err = board
            .set_direction(led, Direction::Output(Level::Low))
            .unwrap_err();
        assert_eq!(err.status(), -(Errno::EIO as i32));

        board.clear_faults();
        board.set_direction(led, Direction::Output(Level::Low)).unwrap();
    }
}
