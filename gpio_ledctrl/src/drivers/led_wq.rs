//! LED sequence run from a work item.
//!
//! The interrupt handler (top half) only schedules the work item. The work
//! handler (bottom half) may sleep: it walks the LEDs in order, waiting a
//! fixed delay before toggling each one. Presses that arrive while a run is
//! queued or in progress are coalesced into it.

use std::{ops::Deref, sync::Arc, thread, time::Duration};

use log::{debug, error, info};

use crate::{
    backend::GpioBackend,
    irq::{IrqNumber, IrqRegistration, IrqReturn, Trigger},
    line::{Level, Line},
    module::{Module, ModuleInfo},
    workqueue::{Work, WorkHandle},
    Config, Result,
};

struct Led<B: GpioBackend> {
    name: String,
    line: Line<B>,
}

/// LEDs in toggle order. Released last-acquired first.
struct LedBank<B: GpioBackend>(Vec<Led<B>>);

impl<B: GpioBackend> Deref for LedBank<B> {
    type Target = [Led<B>];

    fn deref(&self) -> &[Led<B>] {
        &self.0
    }
}

impl<B: GpioBackend> Drop for LedBank<B> {
    fn drop(&mut self) {
        while let Some(led) = self.0.pop() {
            drop(led);
        }
    }
}

struct Context<B: GpioBackend> {
    name: String,
    step_delay: Duration,
    // only held, never read: it is the interrupt source
    _button: Line<B>,
    leds: LedBank<B>,
}

impl<B: GpioBackend> Context<B> {
    fn button_isr(&self, work: &WorkHandle) -> IrqReturn {
        debug!("{}: GPIO button IRQ", self.name);
        if !work.schedule() {
            debug!("{}: sequence already queued, press coalesced", self.name);
        }
        IrqReturn::Handled
    }

    fn button_work(&self) {
        info!("{}: bottom half, processing button press", self.name);
        for led in self.leds.iter() {
            thread::sleep(self.step_delay);
            let level = led.line.toggle();
            debug!("{}: {} LED {level:?}", self.name, led.name);
        }
    }
}

/// Workqueue LED controller.
pub struct LedSequence<B: GpioBackend> {
    // torn down in this order
    irq: Option<IrqRegistration<B>>,
    work: Work,
    ctx: Arc<Context<B>>,
}

impl<B: GpioBackend> LedSequence<B> {
    pub fn irq(&self) -> Option<IrqNumber> {
        self.irq.as_ref().map(IrqRegistration::irq)
    }

    /// Whether a run of the sequence is queued or in progress.
    pub fn is_busy(&self) -> bool {
        self.work.is_pending() || self.work.is_running()
    }
}

impl<B: GpioBackend> Module<B> for LedSequence<B> {
    const INFO: ModuleInfo = ModuleInfo::new(
        "gpio_ledctrl_wq",
        "GPIO module managing three LEDs from a work item",
    );

    fn init(backend: &Arc<B>, config: &Config) -> Result<Self> {
        let cfg = &config.wq;
        let name = cfg.device_name.as_str();
        info!("{name}: GPIO LED controller via workqueue init");

        let mut leds = LedBank(Vec::with_capacity(cfg.leds.len()));
        for led in &cfg.leds {
            let line = config
                .gpio(led.pin)
                .and_then(|gpio| Line::acquire(backend, gpio, name))
                .inspect_err(|e| error!("{name}: failed to get GPIO {} led: {e}", led.name))?;
            leds.0.push(Led {
                name: led.name.clone(),
                line,
            });
        }
        let button = config
            .gpio(cfg.button_pin)
            .and_then(|gpio| Line::acquire(backend, gpio, name))
            .inspect_err(|e| error!("{name}: failed to get GPIO button: {e}"))?;
        for led in leds.iter() {
            led.line.direction_output(Level::Low)?;
        }
        button.direction_input()?;
        let irq = button.to_irq()?;

        let ctx = Arc::new(Context {
            name: name.to_owned(),
            step_delay: cfg.step_delay(),
            _button: button,
            leds,
        });
        let work = Work::new(name, {
            let ctx = Arc::clone(&ctx);
            move || ctx.button_work()
        })?;
        let registration = IrqRegistration::request(backend, irq, Trigger::FALLING, &cfg.irq_name, {
            let ctx = Arc::clone(&ctx);
            let work = work.handle();
            move |_| ctx.button_isr(&work)
        })
        .inspect_err(|e| {
            error!(
                "{name}: failed to request IRQ for GPIO button {}: {e}",
                cfg.button_pin
            )
        })?;

        info!("{name}: button {irq}, {} LEDs", ctx.leds.len());
        Ok(Self {
            irq: Some(registration),
            work,
            ctx,
        })
    }
}

impl<B: GpioBackend> Drop for LedSequence<B> {
    fn drop(&mut self) {
        // the interrupt goes first so nothing can queue new work while
        // the in-flight run is drained
        drop(self.irq.take());
        self.work.cancel_work_sync();
        for led in self.ctx.leds.iter() {
            led.line.set(Level::Low);
        }
        info!("{}: GPIO LED controller detached", self.ctx.name);
    }
}
