//! One-shot timers with kernel `timer_list` semantics.
//!
//! Each [`Timer`] owns a thread that sleeps until the expiry and then runs
//! the callback. Arming an already-armed timer moves the expiry (latest arm
//! wins); the callback runs at most once per expiry. The callback runs in
//! timer context: it must not sleep and must not call
//! [`Timer::del_timer_sync`] on its own timer.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{error, trace};

use crate::{Error, Result};

#[derive(Debug, Default)]
struct State {
    expires: Option<Instant>,
    running: bool,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.changed.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    fn mod_timer(&self, delay: Duration) -> bool {
        let mut state = self.lock();
        let was_pending = state.expires.replace(Instant::now() + delay).is_some();
        self.changed.notify_all();
        was_pending
    }

    fn del_timer_sync(&self) -> bool {
        let mut state = self.lock();
        let was_pending = state.expires.take().is_some();
        self.changed.notify_all();
        while state.running {
            state = self.wait(state);
        }
        was_pending
    }

    fn is_pending(&self) -> bool {
        self.lock().expires.is_some()
    }
}

fn run<F: FnMut()>(shared: &Shared, mut callback: F) {
    let mut state = shared.lock();
    while !state.shutdown {
        let Some(expires) = state.expires else {
            state = shared.wait(state);
            continue;
        };
        let now = Instant::now();
        if now < expires {
            state = shared
                .changed
                .wait_timeout(state, expires - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
            continue;
        }

        state.expires = None;
        state.running = true;
        drop(state);
        callback();
        state = shared.lock();
        state.running = false;
        shared.changed.notify_all();
    }
}

/// A re-armable one-shot timer.
#[derive(Debug)]
pub struct Timer {
    name: String,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

/// Arms a [`Timer`] from another context, such as an interrupt handler.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    shared: Arc<Shared>,
}

impl TimerHandle {
    /// See [`Timer::mod_timer`].
    pub fn mod_timer(&self, delay: Duration) -> bool {
        self.shared.mod_timer(delay)
    }
}

impl Timer {
    /// Sets up a disarmed timer that runs `callback` on expiry.
    pub fn new<F>(name: &str, callback: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let thread = thread::Builder::new()
            .name(format!("timer/{name}"))
            .spawn({
                let shared = Arc::clone(&shared);
                move || run(&shared, callback)
            })
            .map_err(|source| Error::Spawn {
                name: name.to_owned(),
                source,
            })?;
        Ok(Self {
            name: name.to_owned(),
            shared,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> TimerHandle {
        TimerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Arms the timer to expire `delay` from now, replacing any pending
    /// expiry. Returns whether one was pending.
    pub fn mod_timer(&self, delay: Duration) -> bool {
        self.shared.mod_timer(delay)
    }

    /// Disarms the timer and waits for a running callback to return.
    /// Returns whether an expiry was pending.
    pub fn del_timer_sync(&self) -> bool {
        let was_pending = self.shared.del_timer_sync();
        trace!("timer/{}: deleted, was pending: {was_pending}", self.name);
        was_pending
    }

    pub fn is_pending(&self) -> bool {
        self.shared.is_pending()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.expires = None;
            self.shared.changed.notify_all();
        }
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            // dropped from its own callback; the loop exits on return
            return;
        }
        if thread.join().is_err() {
            error!("timer/{}: callback panicked", self.name);
        }
    }
}
