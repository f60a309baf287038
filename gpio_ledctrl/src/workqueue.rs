//! Deferred work items.
//!
//! A [`Work`] is one reusable unit of deferred execution served by its own
//! worker thread. The handler runs in process context and may sleep.
//! Scheduling an item that is pending or still running is a no-op, so at
//! most one run is ever outstanding and runs never overlap.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use log::{error, trace};

use crate::{Error, Result};

#[derive(Debug, Default)]
struct State {
    pending: bool,
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

    fn schedule(&self) -> bool {
        let mut state = self.lock();
        if state.pending || state.running || state.shutdown {
            return false;
        }
        state.pending = true;
        self.changed.notify_all();
        true
    }
}

fn worker<F: FnMut()>(shared: &Shared, mut handler: F) {
    let mut state = shared.lock();
    loop {
        while !state.pending && !state.shutdown {
            state = shared.wait(state);
        }
        if state.shutdown {
            break;
        }
        state.pending = false;
        state.running = true;
        drop(state);
        handler();
        state = shared.lock();
        state.running = false;
        shared.changed.notify_all();
    }
}

#[derive(Debug)]
pub struct Work {
    name: String,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

/// Schedules a [`Work`] from another context, such as an interrupt handler.
#[derive(Debug, Clone)]
pub struct WorkHandle {
    shared: Arc<Shared>,
}

impl WorkHandle {
    /// See [`Work::schedule`].
    pub fn schedule(&self) -> bool {
        self.shared.schedule()
    }
}

impl Work {
    pub fn new<F>(name: &str, handler: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let thread = thread::Builder::new()
            .name(format!("kworker/{name}"))
            .spawn({
                let shared = Arc::clone(&shared);
                move || worker(&shared, handler)
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

    pub fn handle(&self) -> WorkHandle {
        WorkHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queues the item. Returns `false` if it was already pending or running.
    pub fn schedule(&self) -> bool {
        self.shared.schedule()
    }

    /// Removes a pending run and waits for a running one to finish.
    /// Returns whether a run was pending.
    pub fn cancel_work_sync(&self) -> bool {
        let mut state = self.shared.lock();
        let was_pending = std::mem::take(&mut state.pending);
        while state.running {
            state = self.shared.wait(state);
        }
        trace!("kworker/{}: cancelled, was pending: {was_pending}", self.name);
        was_pending
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().pending
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }
}

impl Drop for Work {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.pending = false;
            self.shared.changed.notify_all();
        }
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            error!("kworker/{}: handler panicked", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::{Duration, Instant},
    };

    use super::*;

    fn slow_work(run_for: Duration) -> (Work, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);
        let work = Work::new("test", move || {
            thread::sleep(run_for);
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (work, runs)
    }

    fn wait_until(what: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !what() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn scheduled_work_runs() {
        let (work, runs) = slow_work(Duration::ZERO);
        assert!(work.schedule());
        wait_until(|| runs.load(Ordering::SeqCst) == 1);
        wait_until(|| !work.is_running());
        assert!(work.handle().schedule());
        wait_until(|| runs.load(Ordering::SeqCst) == 2);
    }

    #[test]
    fn schedule_while_running_is_coalesced() {
        let (work, runs) = slow_work(Duration::from_millis(100));
        assert!(work.schedule());
        wait_until(|| work.is_running());
        assert!(!work.schedule());
        assert!(!work.handle().schedule());

        thread::sleep(Duration::from_millis(250));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_waits_for_running_handler() {
        let (work, runs) = slow_work(Duration::from_millis(80));
        work.schedule();
        wait_until(|| work.is_running());
        assert!(!work.cancel_work_sync());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!work.is_running());
    }

    #[test]
    fn schedule_after_drop_started_is_refused() {
        let (work, runs) = slow_work(Duration::from_millis(50));
        let handle = work.handle();
        drop(work);
        assert!(!handle.schedule());
        thread::sleep(Duration::from_millis(80));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
