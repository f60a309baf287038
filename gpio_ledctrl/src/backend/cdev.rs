//! Backend for the GPIO character device (`/dev/gpiochipN`, uAPI v2).
//!
//! Lines are requested one by one, so each held line owns its own request
//! file descriptor. An interrupt is the edge-event stream of an input line:
//! requesting it reconfigures the line for edge detection and starts an
//! event thread that calls the handler once per event. The interrupt number
//! of a line is its global GPIO number.

use std::{
    collections::HashMap,
    fs::File,
    os::fd::{AsFd, OwnedFd},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use lib_uapi::{ChipInfo, LineFlags};
use log::{debug, error, info, trace, warn};
use nix::errno::Errno;

use crate::{
    backend::GpioBackend,
    irq::{IrqHandler, IrqNumber, IrqReturn, Trigger},
    line::{Direction, Level, LineId},
    Error, Result,
};

/// How often an event thread checks whether it should stop.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Held {
    label: String,
    request: Option<Arc<OwnedFd>>,
    direction: Option<Direction>,
}

struct EventThread {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    held: HashMap<u32, Held>,
    irqs: HashMap<IrqNumber, EventThread>,
}

#[derive(Debug)]
pub struct CdevBackend {
    chip: File,
    path: PathBuf,
    base: u32,
    info: ChipInfo,
    state: Mutex<State>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("held", &self.held.keys().collect::<Vec<_>>())
            .field("irqs", &self.irqs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CdevBackend {
    /// Opens the chip at `path`. Its first line has global number `base`.
    pub fn open<P>(path: P, base: u32) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref().to_path_buf();
        let chip = File::open(&path)?;
        let info = lib_uapi::chip_info(chip.as_fd()).map_err(|source| Error::Chip {
            path: path.clone(),
            source,
        })?;
        info!(
            "{}: {} [{}], {} lines from gpio {}",
            path.display(),
            info.name,
            info.label,
            info.lines,
            base
        );
        Ok(Self {
            chip,
            path,
            base,
            info,
            state: Mutex::new(State::default()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chip_info(&self) -> &ChipInfo {
        &self.info
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn offset(&self, gpio: u32) -> Option<u32> {
        gpio.checked_sub(self.base)
            .filter(|&offset| offset < self.info.lines)
    }

    fn request_of(&self, line: LineId) -> Option<Arc<OwnedFd>> {
        self.state()
            .held
            .get(&line.gpio())
            .and_then(|held| held.request.clone())
    }
}

fn edge_flags(trigger: Trigger) -> LineFlags {
    let mut flags = LineFlags::INPUT;
    if trigger.contains(Trigger::RISING) {
        flags |= LineFlags::EDGE_RISING;
    }
    if trigger.contains(Trigger::FALLING) {
        flags |= LineFlags::EDGE_FALLING;
    }
    flags
}

fn event_loop(irq: IrqNumber, request: Arc<OwnedFd>, handler: IrqHandler, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Acquire) {
        match lib_uapi::wait_edge_event(request.as_fd(), EVENT_POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                error!("{irq}: waiting for events failed: {e}");
                break;
            }
        }
        match lib_uapi::read_edge_event(request.as_fd()) {
            Ok(event) => {
                trace!("{irq}: {:?} edge, seqno {}", event.kind, event.line_seqno);
                if handler(irq) == IrqReturn::None {
                    debug!("{irq}: event not handled");
                }
            }
            Err(e) => {
                error!("{irq}: reading event failed: {e}");
                break;
            }
        }
    }
}

impl GpioBackend for CdevBackend {
    fn acquire_line(&self, gpio: u32, label: &str) -> Result<LineId> {
        let offset = self.offset(gpio).ok_or(Error::NoDevice { gpio })?;
        let mut state = self.state();
        if state.held.contains_key(&gpio) {
            return Err(Error::Busy { gpio });
        }
        let info = lib_uapi::line_info(self.chip.as_fd(), offset).map_err(Error::uapi(gpio))?;
        if info.flags.contains(LineFlags::USED) {
            debug!("gpio{gpio} is used by `{}`", info.consumer);
            return Err(Error::Busy { gpio });
        }
        state.held.insert(
            gpio,
            Held {
                label: label.to_owned(),
                request: None,
                direction: None,
            },
        );
        Ok(LineId::from_gpio(gpio))
    }

    fn set_direction(&self, line: LineId, direction: Direction) -> Result<()> {
        let gpio = line.gpio();
        let offset = self.offset(gpio).ok_or(Error::NoDevice { gpio })?;
        let (flags, output) = match direction {
            Direction::Input => (LineFlags::INPUT, None),
            Direction::Output(level) => (LineFlags::OUTPUT, Some(level.is_high())),
        };

        let mut state = self.state();
        let held = state.held.get_mut(&gpio).ok_or(Error::NoDevice { gpio })?;
        match held.request.clone() {
            Some(request) => lib_uapi::reconfigure_line(request.as_fd(), flags, output)
                .map_err(Error::uapi(gpio))?,
            None => {
                let request =
                    lib_uapi::request_line(self.chip.as_fd(), offset, &held.label, flags, output)
                        .map_err(Error::uapi(gpio))?;
                held.request = Some(Arc::new(request));
            }
        }
        held.direction = Some(direction);
        Ok(())
    }

    fn read_level(&self, line: LineId) -> Level {
        let Some(request) = self.request_of(line) else {
            warn!("read of {line}, which has no direction");
            return Level::Low;
        };
        lib_uapi::get_value(request.as_fd())
            .map(Level::from)
            .unwrap_or_else(|e| {
                warn!("reading {line} failed: {e}");
                Level::Low
            })
    }

    fn write_level(&self, line: LineId, level: Level) {
        let Some(request) = self.request_of(line) else {
            warn!("write to {line}, which has no direction");
            return;
        };
        if let Err(e) = lib_uapi::set_value(request.as_fd(), level.is_high()) {
            warn!("writing {line} failed: {e}");
        }
    }

    fn line_to_irq(&self, line: LineId) -> Result<IrqNumber> {
        let gpio = line.gpio();
        match self.state().held.get(&gpio).and_then(|held| held.direction) {
            Some(Direction::Input) => Ok(IrqNumber(gpio)),
            _ => Err(Error::Fault {
                op: "line_to_irq",
                gpio,
                errno: Errno::ENXIO,
            }),
        }
    }

    fn request_irq(
        &self,
        irq: IrqNumber,
        trigger: Trigger,
        name: &str,
        handler: IrqHandler,
    ) -> Result<()> {
        let gpio = irq.0;
        let mut state = self.state();
        if state.irqs.contains_key(&irq) {
            return Err(Error::Irq {
                irq,
                errno: Errno::EBUSY,
            });
        }
        let request = state
            .held
            .get(&gpio)
            .filter(|held| held.direction == Some(Direction::Input))
            .and_then(|held| held.request.clone())
            .ok_or(Error::Irq {
                irq,
                errno: Errno::EINVAL,
            })?;
        lib_uapi::reconfigure_line(request.as_fd(), edge_flags(trigger), None)
            .map_err(Error::uapi(gpio))?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_name = format!("irq/{}-{name}", irq.0);
        let spawned = thread::Builder::new().name(thread_name.clone()).spawn({
            let request = Arc::clone(&request);
            let stop = Arc::clone(&stop);
            move || event_loop(irq, request, handler, stop)
        });
        let thread = match spawned {
            Ok(thread) => thread,
            Err(source) => {
                if let Err(e) = lib_uapi::reconfigure_line(request.as_fd(), LineFlags::INPUT, None) {
                    warn!("{irq}: disabling edge detection failed: {e}");
                }
                return Err(Error::Spawn {
                    name: thread_name,
                    source,
                });
            }
        };
        state.irqs.insert(irq, EventThread { stop, thread });
        debug!("{irq} requested by {name} on gpio{gpio}");
        Ok(())
    }

    fn free_irq(&self, irq: IrqNumber) {
        let Some(event_thread) = self.state().irqs.remove(&irq) else {
            warn!("trying to free already-free {irq}");
            return;
        };
        event_thread.stop.store(true, Ordering::Release);
        if event_thread.thread.join().is_err() {
            error!("{irq}: handler panicked");
        }
        if let Some(request) = self.request_of(LineId::from_gpio(irq.0)) {
            if let Err(e) = lib_uapi::reconfigure_line(request.as_fd(), LineFlags::INPUT, None) {
                warn!("{irq}: disabling edge detection failed: {e}");
            }
        }
    }

    fn release_line(&self, line: LineId) {
        let irq = IrqNumber(line.gpio());
        if self.state().irqs.contains_key(&irq) {
            warn!("{line} released with {irq} still requested");
            self.free_irq(irq);
        }
        if self.state().held.remove(&line.gpio()).is_none() {
            warn!("release of unheld {line}");
        }
    }
}

impl Drop for CdevBackend {
    fn drop(&mut self) {
        let irqs: Vec<_> = self.state().irqs.keys().copied().collect();
        for irq in irqs {
            self.free_irq(irq);
        }
    }
}
