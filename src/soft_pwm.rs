//! Software PWM driver.
//!
//! One thread per pulsing pin toggles the line through its backend handle.
//! Each half-cycle advances an absolute deadline by the exact tick count,
//! so sleep overshoot does not accumulate. Timing is only as good as the
//! host scheduler's wake-up latency.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{LineHandle, SharedLine};
use crate::duty::Ticks;
use crate::errors::{Error, Result};
use crate::types::State;

struct Control {
    ticks: Ticks,
    stop: bool,
}

struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleeps until `deadline`, or forever if there is none. Returns `true`
    /// if a stop was requested meanwhile.
    fn sleep_until(&self, deadline: Option<Instant>) -> bool {
        let mut control = self.lock();
        loop {
            if control.stop {
                return true;
            }
            control = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.wake
                        .wait_timeout(control, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
                None => self.wake.wait(control).unwrap_or_else(|e| e.into_inner()),
            };
        }
    }
}

/// A running driver. Dropping it stops the thread.
pub(crate) struct SoftPwm {
    thread: Option<thread::JoinHandle<Result<()>>>,
    shared: Arc<Shared>,
    target: String,
}

impl SoftPwm {
    /// Spawns the driver thread for `handle`, which must be an output.
    pub(crate) fn start(
        handle: SharedLine,
        ticks: Ticks,
        realtime: bool,
        target: &str,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control { ticks, stop: false }),
            wake: Condvar::new(),
        });

        let thread = {
            let shared = shared.clone();
            let name = target.to_owned();
            thread::Builder::new()
                .name(format!("soft-pwm {name}"))
                .spawn(move || {
                    if realtime {
                        set_realtime();
                    }
                    run(&**handle, &shared).map_err(|e| {
                        log::error!("{name}: software PWM stopped - {e}");
                        e
                    })
                })
                .map_err(|e| Error::resource(target, "start PWM thread", e))?
        };

        log::debug!(
            "{target}: software PWM started, {}ns high {}ns low",
            ticks.high,
            ticks.low
        );
        Ok(Self {
            thread: Some(thread),
            shared,
            target: target.to_owned(),
        })
    }

    /// Replaces the waveform, picked up at the start of the next cycle.
    pub(crate) fn reconfigure(&self, ticks: Ticks) {
        self.shared.lock().ticks = ticks;
    }

    /// `false` once the driver stopped itself on a write failure.
    pub(crate) fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the driver and waits for its thread to exit, which takes at
    /// most the write in flight. Returns the error the driver stopped on.
    pub(crate) fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.shared.lock().stop = true;
        self.shared.wake.notify_all();

        let res = thread.join().unwrap_or_else(|_| {
            Err(Error::invalid_state(&self.target, "PWM thread panicked"))
        });
        log::debug!("{}: software PWM stopped", self.target);
        res
    }
}

impl Drop for SoftPwm {
    fn drop(&mut self) {
        if !thread::panicking() {
            let _ = self.stop();
        }
    }
}

impl std::fmt::Debug for SoftPwm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftPwm")
            .field("target", &self.target)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run(handle: &dyn LineHandle, shared: &Shared) -> Result<()> {
    let mut deadline = Some(Instant::now());

    loop {
        // one snapshot per cycle keeps high + low equal to a real period
        let ticks = {
            let control = shared.lock();
            if control.stop {
                return Ok(());
            }
            control.ticks
        };

        for (level, ticks) in [(State::Active, ticks.high), (State::Inactive, ticks.low)] {
            if ticks == 0 {
                continue;
            }
            handle.write(level)?;
            deadline = deadline.and_then(|d| d.checked_add(Duration::from_nanos(ticks)));
            if shared.sleep_until(deadline) {
                return Ok(());
            }
        }
    }
}

/// Asks for realtime round-robin scheduling at the highest priority, which
/// silently fails without privileges, and for a 1ns timer slack in case it
/// did fail.
fn set_realtime() {
    // SAFETY: plain syscalls on the calling thread with valid arguments;
    // failures are ignored on purpose
    unsafe {
        let mut params: libc::sched_param = std::mem::zeroed();
        params.sched_priority = libc::sched_get_priority_max(libc::SCHED_RR);
        libc::sched_setscheduler(0, libc::SCHED_RR, &params);

        libc::prctl(libc::PR_SET_TIMERSLACK, 1);
    }
}
