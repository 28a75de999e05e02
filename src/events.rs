//! Edge reader for input pins.
//!
//! A thread per input pin waits for the next edge, dispatches it to the
//! pin's callbacks and rearms. Stopping wakes the pending wait through the
//! handle and joins the thread.

use std::thread;

use crate::backend::{EdgeWait, SharedLine};
use crate::errors::{Error, Result};
use crate::notify::CallChain;

pub(crate) struct EventReader {
    thread: Option<thread::JoinHandle<()>>,
    handle: SharedLine,
    target: String,
}

impl EventReader {
    pub(crate) fn start(handle: SharedLine, chain: CallChain, target: &str) -> Result<Self> {
        let thread = {
            let handle = handle.clone();
            let name = target.to_owned();
            thread::Builder::new()
                .name(format!("edges {name}"))
                .spawn(move || loop {
                    match handle.await_edge() {
                        Ok(EdgeWait::Edge(edge)) => {
                            log::trace!("{name}: {:?} edge at {:?}", edge.kind, edge.timestamp_ns);
                            chain.dispatch(edge.state());
                        }
                        Ok(EdgeWait::Closed) => break,
                        Err(e) => {
                            log::warn!("{name}: edge reader stopped - {e}");
                            break;
                        }
                    }
                })
                .map_err(|e| Error::resource(target, "start edge reader", e))?
        };

        Ok(Self {
            thread: Some(thread),
            handle,
            target: target.to_owned(),
        })
    }

    /// Wakes the reader and waits for it to exit. Callbacks already running
    /// finish first.
    pub(crate) fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.handle.wake();
            if thread.join().is_err() {
                log::warn!("{}: a state-change callback panicked", self.target);
            }
        }
    }
}

impl Drop for EventReader {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for EventReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReader")
            .field("target", &self.target)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::sim::SimChip;
    use crate::backend::{Backend, Direction, LineRequest};
    use crate::types::{Flags, State};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn wait_for(cond: impl Fn() -> bool) {
        let started = Instant::now();
        while !cond() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn dispatches_every_edge() {
        let chip = SimChip::new(1);
        let request = LineRequest {
            direction: Direction::Input,
            flags: Flags::ACTIVE_LOW,
            initial: State::Inactive,
        };
        let handle: SharedLine = Arc::new(chip.open_line(0, &request).unwrap());

        let chain = CallChain::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            chain.add(move |s| seen.lock().unwrap().push(s));
        }

        let mut reader = EventReader::start(handle, chain, "sim:1 pin 0").unwrap();
        chip.set_input(0, true);
        chip.set_input(0, false);
        chip.set_input(0, true);
        wait_for(|| seen.lock().unwrap().len() == 3);
        reader.stop();

        // active low: a high line is inactive
        assert_eq!(
            *seen.lock().unwrap(),
            [State::Inactive, State::Active, State::Inactive]
        );
    }

    #[test]
    fn stop_is_prompt_without_edges() {
        let chip = SimChip::new(1);
        let request = LineRequest {
            direction: Direction::Input,
            flags: Flags::empty(),
            initial: State::Inactive,
        };
        let handle: SharedLine = Arc::new(chip.open_line(0, &request).unwrap());

        let mut reader = EventReader::start(handle, CallChain::new(), "sim:1 pin 0").unwrap();
        let started = Instant::now();
        reader.stop();
        reader.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
