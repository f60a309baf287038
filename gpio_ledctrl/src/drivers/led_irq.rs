//! LED toggled by a button, debounced with a one-shot timer.
//!
//! The interrupt handler samples the button and (re-)arms the debounce
//! timer. When the timer expires the button is sampled again; only if it
//! still reads the same level is the press accepted and the LED toggled.
//! A press that is still bouncing when the timer expires is dropped, not
//! retried. Bursts of edges collapse into a single check because every edge
//! restarts the window.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, error, info};

use crate::{
    backend::GpioBackend,
    irq::{IrqNumber, IrqRegistration, IrqReturn, Trigger},
    line::{Level, Line},
    module::{Module, ModuleInfo},
    timer::{Timer, TimerHandle},
    Config, Result,
};

struct Context<B: GpioBackend> {
    name: String,
    debounce: Duration,
    // released in declaration order: button, then led
    button: Line<B>,
    led: Line<B>,
    /// Written only by the interrupt handler, read only by the timer
    /// callback. Arming the timer orders the write before the read.
    prev_button_state: AtomicBool,
}

impl<B: GpioBackend> Context<B> {
    fn button_isr(&self, timer: &TimerHandle) -> IrqReturn {
        debug!("{}: GPIO button IRQ", self.name);
        let level = self.button.get();
        self.prev_button_state
            .store(level.is_high(), Ordering::Relaxed);
        timer.mod_timer(self.debounce);
        IrqReturn::Handled
    }

    fn debounce_expired(&self) {
        let current = self.button.get();
        let previous = Level::from(self.prev_button_state.load(Ordering::Relaxed));
        if current == previous {
            let led = self.led.toggle();
            debug!("{}: press accepted, LED {led:?}", self.name);
        } else {
            debug!("{}: button still bouncing, press dropped", self.name);
        }
    }
}

/// Debounced-IRQ LED controller.
pub struct DebouncedLed<B: GpioBackend> {
    // torn down in this order
    irq: Option<IrqRegistration<B>>,
    timer: Timer,
    ctx: Arc<Context<B>>,
}

impl<B: GpioBackend> DebouncedLed<B> {
    pub fn irq(&self) -> Option<IrqNumber> {
        self.irq.as_ref().map(IrqRegistration::irq)
    }

    /// Whether a debounce check is pending.
    pub fn is_armed(&self) -> bool {
        self.timer.is_pending()
    }
}

impl<B: GpioBackend> Module<B> for DebouncedLed<B> {
    const INFO: ModuleInfo = ModuleInfo::new(
        "gpio_ledctrl_irq",
        "GPIO LED toggled by a debounced button interrupt",
    );

    fn init(backend: &Arc<B>, config: &Config) -> Result<Self> {
        let cfg = &config.irq;
        let name = cfg.device_name.as_str();
        info!("{name}: GPIO LED controller init");

        let led = config
            .gpio(cfg.led_pin)
            .and_then(|gpio| Line::acquire(backend, gpio, name))
            .inspect_err(|e| error!("{name}: failed to get GPIO led: {e}"))?;
        let button = config
            .gpio(cfg.button_pin)
            .and_then(|gpio| Line::acquire(backend, gpio, name))
            .inspect_err(|e| error!("{name}: failed to get GPIO button: {e}"))?;
        led.direction_output(Level::Low)?;
        button.direction_input()?;
        let irq = button.to_irq()?;

        let ctx = Arc::new(Context {
            name: name.to_owned(),
            debounce: cfg.debounce(),
            button,
            led,
            prev_button_state: AtomicBool::new(false),
        });
        let timer = Timer::new(name, {
            let ctx = Arc::clone(&ctx);
            move || ctx.debounce_expired()
        })?;
        let registration = IrqRegistration::request(backend, irq, Trigger::FALLING, &cfg.irq_name, {
            let ctx = Arc::clone(&ctx);
            let timer = timer.handle();
            move |_| ctx.button_isr(&timer)
        })
        .inspect_err(|e| {
            error!(
                "{name}: failed to request IRQ for GPIO button {}: {e}",
                cfg.button_pin
            )
        })?;

        info!("{name}: button {irq}, debounce {:?}", cfg.debounce());
        Ok(Self {
            irq: Some(registration),
            timer,
            ctx,
        })
    }
}

impl<B: GpioBackend> Drop for DebouncedLed<B> {
    fn drop(&mut self) {
        // no new edges, then no pending or running check
        drop(self.irq.take());
        self.timer.del_timer_sync();
        self.ctx.led.set(Level::Low);
        info!("{}: GPIO LED controller detached", self.ctx.name);
    }
}
