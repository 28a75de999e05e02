//! In-memory chip for running pins without hardware.
//!
//! Lines hold a physical level. Outputs drive it, [`SimChip::set_input`]
//! drives it from the outside and raises edges on requested inputs. Every
//! line keeps counters of writes and of concurrent writers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use nix::errno::Errno;

use crate::backend::{
    Backend, Capabilities, ChipInfo, ChipOptions, Direction, Edge, EdgeKind, EdgeWait, HardwarePwm,
    LineHandle, LineInfo, LineRequest,
};
use crate::errors::{Error, Result};
use crate::types::{Flags, Mode, State};

pub const SIM: &str = "sim";

/// Lines of a `sim` chip opened without a count.
pub const DEFAULT_LINES: u32 = 8;

/// Duty cycle range of simulated hardware PWM.
pub const SIM_PWM_RANGE: u32 = 1_000;

const MODES: &[Mode] = &[Mode::Input, Mode::Output, Mode::Pwm];

/// Opens `sim:N`, an `N` line chip.
pub fn open(param: &str, _options: &ChipOptions) -> Result<Arc<dyn Backend>> {
    let lines = if param.is_empty() {
        DEFAULT_LINES
    } else {
        param.parse().map_err(|_| {
            Error::invalid_argument(
                format!("{SIM}:{param}"),
                format!("Invalid line count '{param}'"),
            )
        })?
    };
    Ok(SimChip::with_id(param, lines, false))
}

#[derive(Debug, Default)]
struct SimLine {
    /// Physical level.
    level: bool,
    request: Option<LineRequest>,
    used_elsewhere: bool,
    edges: Vec<Edge>,
    woken: bool,
    writes: u64,
    writers: u32,
    max_writers: u32,
    fail_writes: bool,
    fail_info: bool,
    fail_close: bool,
    pwm_hz: u32,
    pwm_duty: u32,
}

impl SimLine {
    fn active_low(&self) -> bool {
        self.request
            .is_some_and(|r| r.flags.contains(Flags::ACTIVE_LOW))
    }

    fn logical(&self) -> State {
        State::new(self.level != self.active_low())
    }
}

#[derive(Debug)]
struct Shared {
    lines: Mutex<Vec<SimLine>>,
    edge: Condvar,
    write_delay_us: AtomicU32,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Vec<SimLine>> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A simulated chip.
#[derive(Debug)]
pub struct SimChip {
    id: String,
    hardware_pwm: bool,
    shared: Arc<Shared>,
}

impl SimChip {
    /// A chip with `lines` lines and software PWM only.
    pub fn new(lines: u32) -> Arc<Self> {
        Self::with_id(&lines.to_string(), lines, false)
    }

    /// A chip whose output lines also do PWM in "hardware".
    pub fn with_hardware_pwm(lines: u32) -> Arc<Self> {
        Self::with_id(&lines.to_string(), lines, true)
    }

    fn with_id(id: &str, lines: u32, hardware_pwm: bool) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            hardware_pwm,
            shared: Arc::new(Shared {
                lines: Mutex::new((0..lines).map(|_| SimLine::default()).collect()),
                edge: Condvar::new(),
                write_delay_us: AtomicU32::new(0),
            }),
        })
    }

    fn with_line<T>(&self, offset: u32, f: impl FnOnce(&mut SimLine) -> T) -> Option<T> {
        self.shared.lock().get_mut(offset as usize).map(f)
    }

    /// Drives the physical level of a line from outside. Requested inputs
    /// see an edge when the level changes.
    pub fn set_input(&self, offset: u32, level: bool) {
        let mut lines = self.shared.lock();
        let Some(line) = lines.get_mut(offset as usize) else {
            return;
        };
        if line.request.is_some_and(|r| r.direction == Direction::Output) || line.level == level {
            return;
        }

        line.level = level;
        if line.request.is_some() {
            let kind = if line.logical().is_active() {
                EdgeKind::Rising
            } else {
                EdgeKind::Falling
            };
            line.edges.push(Edge {
                kind,
                timestamp_ns: None,
            });
            self.shared.edge.notify_all();
        }
    }

    /// Physical level of a line.
    pub fn level(&self, offset: u32) -> bool {
        self.with_line(offset, |l| l.level).unwrap_or(false)
    }

    /// Marks a line as held by some other consumer.
    pub fn set_used(&self, offset: u32, used: bool) {
        self.with_line(offset, |l| l.used_elsewhere = used);
    }

    pub fn is_requested(&self, offset: u32) -> bool {
        self.with_line(offset, |l| l.request.is_some())
            .unwrap_or(false)
    }

    /// Writes that reached the line since the chip was created.
    pub fn write_count(&self, offset: u32) -> u64 {
        self.with_line(offset, |l| l.writes).unwrap_or(0)
    }

    /// Largest number of writes ever in flight on the line at once.
    pub fn max_concurrent_writers(&self, offset: u32) -> u32 {
        self.with_line(offset, |l| l.max_writers).unwrap_or(0)
    }

    /// Makes writes to the line fail with `EIO`.
    pub fn fail_writes(&self, offset: u32, fail: bool) {
        self.with_line(offset, |l| l.fail_writes = fail);
    }

    /// Makes line metadata queries fail with `EIO`.
    pub fn fail_line_info(&self, offset: u32, fail: bool) {
        self.with_line(offset, |l| l.fail_info = fail);
    }

    /// Makes closing the line report `EIO`. The line is released anyway.
    pub fn fail_close(&self, offset: u32, fail: bool) {
        self.with_line(offset, |l| l.fail_close = fail);
    }

    /// Holds every write in flight for `delay`, widening the window in
    /// which overlapping writers would be seen.
    pub fn set_write_delay(&self, delay: Duration) {
        let us = u32::try_from(delay.as_micros()).unwrap_or(u32::MAX);
        self.shared.write_delay_us.store(us, Ordering::Relaxed);
    }

    fn line_target(&self, offset: u32) -> String {
        format!("{}:{} pin {}", SIM, self.id, offset)
    }
}

impl Backend for SimChip {
    fn kind(&self) -> &str {
        SIM
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn chip_info(&self) -> Result<ChipInfo> {
        Ok(ChipInfo {
            label: "simulated".to_owned(),
            lines: self.shared.lock().len() as u32,
        })
    }

    fn line_info(&self, offset: u32) -> Result<LineInfo> {
        self.with_line(offset, |l| {
            if l.fail_info {
                return Err(Error::resource(
                    self.line_target(offset),
                    "get line info",
                    Errno::EIO,
                ));
            }
            Ok(LineInfo {
                name: format!("SIM{offset}"),
                direction: Some(l.request.map_or(Direction::Input, |r| r.direction)),
                flags: l.request.map_or(Flags::empty(), |r| r.flags),
                used: l.used_elsewhere || l.request.is_some(),
                consumer: l.used_elsewhere.then(|| "other".to_owned()),
            })
        })
        .ok_or_else(|| Error::invalid_argument(self.line_target(offset), "No such line"))?
    }

    fn capabilities(&self, _offset: u32) -> Capabilities {
        Capabilities {
            modes: MODES,
            input_flags: Flags::INPUT_FLAGS,
            output_flags: Flags::OUTPUT_FLAGS,
            hardware_pwm: self.hardware_pwm,
        }
    }

    fn open_line(&self, offset: u32, request: &LineRequest) -> Result<Box<dyn LineHandle>> {
        let target = self.line_target(offset);
        let mut lines = self.shared.lock();
        let line = lines
            .get_mut(offset as usize)
            .ok_or_else(|| Error::invalid_argument(&target, "No such line"))?;

        if line.request.is_some() {
            return Err(Error::resource(target, "request line", Errno::EBUSY));
        }

        line.request = Some(*request);
        line.edges.clear();
        line.woken = false;
        if request.direction == Direction::Output {
            line.level = request.initial.is_active() != line.active_low();
        }

        Ok(Box::new(SimHandle {
            shared: self.shared.clone(),
            offset,
            direction: request.direction,
            hardware_pwm: self.hardware_pwm,
            target,
        }))
    }
}

#[derive(Debug)]
struct SimHandle {
    shared: Arc<Shared>,
    offset: u32,
    direction: Direction,
    hardware_pwm: bool,
    target: String,
}

impl SimHandle {
    fn with_line<T>(&self, f: impl FnOnce(&mut SimLine) -> T) -> T {
        let mut lines = self.shared.lock();
        f(&mut lines[self.offset as usize])
    }
}

impl LineHandle for SimHandle {
    fn read(&self) -> Result<State> {
        Ok(self.with_line(|l| l.logical()))
    }

    fn write(&self, state: State) -> Result<()> {
        if self.direction != Direction::Output {
            return Err(Error::resource(&self.target, "set pin state", Errno::EPERM));
        }

        let failed = self.with_line(|l| {
            if l.fail_writes {
                return true;
            }
            l.writes += 1;
            l.writers += 1;
            l.max_writers = l.max_writers.max(l.writers);
            l.level = state.is_active() != l.active_low();
            false
        });
        if failed {
            return Err(Error::resource(&self.target, "set pin state", Errno::EIO));
        }

        let delay = self.shared.write_delay_us.load(Ordering::Relaxed);
        if delay > 0 {
            std::thread::sleep(Duration::from_micros(u64::from(delay)));
        }
        self.with_line(|l| l.writers -= 1);
        Ok(())
    }

    fn supports_edges(&self) -> bool {
        self.direction == Direction::Input
    }

    fn await_edge(&self) -> Result<EdgeWait> {
        if self.direction != Direction::Input {
            return Ok(EdgeWait::Closed);
        }

        let mut lines = self.shared.lock();
        loop {
            let line = &mut lines[self.offset as usize];
            if line.woken {
                return Ok(EdgeWait::Closed);
            }
            if !line.edges.is_empty() {
                return Ok(EdgeWait::Edge(line.edges.remove(0)));
            }
            lines = self
                .shared
                .edge
                .wait(lines)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    fn wake(&self) {
        self.with_line(|l| l.woken = true);
        self.shared.edge.notify_all();
    }

    fn hardware_pwm(&self) -> Option<&dyn HardwarePwm> {
        (self.hardware_pwm && self.direction == Direction::Output).then_some(self as &dyn HardwarePwm)
    }

    fn close(self: Box<Self>) -> Result<()> {
        let failed = self.with_line(|l| {
            l.request = None;
            l.woken = true;
            l.edges.clear();
            l.fail_close
        });
        self.shared.edge.notify_all();
        if failed {
            return Err(Error::resource(&self.target, "close line", Errno::EIO));
        }
        Ok(())
    }
}

impl HardwarePwm for SimHandle {
    /// Applies the nearest frequency with a whole microsecond period.
    fn set_pwm_frequency(&self, hz: u32) -> Result<u32> {
        let period_us = (1_000_000 / hz.max(1)).max(1);
        let applied = 1_000_000 / period_us;
        self.with_line(|l| l.pwm_hz = applied);
        Ok(applied)
    }

    fn pwm_frequency(&self) -> Result<u32> {
        Ok(self.with_line(|l| l.pwm_hz))
    }

    fn set_pwm_duty(&self, duty: u32) -> Result<()> {
        if duty > SIM_PWM_RANGE {
            return Err(Error::resource(&self.target, "set PWM duty cycle", Errno::EINVAL));
        }
        self.with_line(|l| l.pwm_duty = duty);
        Ok(())
    }

    fn pwm_duty(&self) -> Result<u32> {
        Ok(self.with_line(|l| l.pwm_duty))
    }

    fn pwm_range(&self) -> u32 {
        SIM_PWM_RANGE
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::ErrorKind;

    fn output(flags: Flags, initial: State) -> LineRequest {
        LineRequest {
            direction: Direction::Output,
            flags,
            initial,
        }
    }

    fn input() -> LineRequest {
        LineRequest {
            direction: Direction::Input,
            flags: Flags::empty(),
            initial: State::Inactive,
        }
    }

    #[test]
    fn open_by_id() {
        let chip = open("4", &ChipOptions::default()).unwrap();
        assert_eq!(chip.chip_info().unwrap().lines, 4);
        assert_eq!(chip.target(), "sim:4");

        let chip = open("", &ChipOptions::default()).unwrap();
        assert_eq!(chip.chip_info().unwrap().lines, DEFAULT_LINES);

        let err = open("many", &ChipOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn double_request_is_busy() {
        let chip = SimChip::new(2);
        let line = chip.open_line(0, &input()).unwrap();

        let err = chip.open_line(0, &input()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBUSY));

        line.close().unwrap();
        assert!(!chip.is_requested(0));
        chip.open_line(0, &input()).unwrap();
    }

    #[test]
    fn active_low_output() {
        let chip = SimChip::new(1);
        let line = chip
            .open_line(0, &output(Flags::ACTIVE_LOW, State::Active))
            .unwrap();
        assert!(!chip.level(0));
        assert_eq!(line.read().unwrap(), State::Active);

        line.write(State::Inactive).unwrap();
        assert!(chip.level(0));
        assert_eq!(chip.write_count(0), 1);
        assert_eq!(chip.max_concurrent_writers(0), 1);
    }

    #[test]
    fn injected_edges() {
        let chip = SimChip::new(1);
        let line = chip.open_line(0, &input()).unwrap();
        assert!(line.supports_edges());

        chip.set_input(0, true);
        chip.set_input(0, true);
        chip.set_input(0, false);

        let kinds: Vec<_> = (0..2)
            .map(|_| match line.await_edge().unwrap() {
                EdgeWait::Edge(e) => e.kind,
                EdgeWait::Closed => panic!("closed"),
            })
            .collect();
        assert_eq!(kinds, [EdgeKind::Rising, EdgeKind::Falling]);

        line.wake();
        assert_eq!(line.await_edge().unwrap(), EdgeWait::Closed);
    }

    #[test]
    fn wake_unblocks_waiter() {
        let chip = SimChip::new(1);
        let line: Arc<dyn LineHandle> = Arc::from(chip.open_line(0, &input()).unwrap());

        let waiter = {
            let line = line.clone();
            std::thread::spawn(move || line.await_edge().unwrap())
        };
        std::thread::sleep(Duration::from_millis(20));
        line.wake();
        assert_eq!(waiter.join().unwrap(), EdgeWait::Closed);
    }

    #[test]
    fn used_elsewhere() {
        let chip = SimChip::new(1);
        chip.set_used(0, true);
        let info = chip.line_info(0).unwrap();
        assert!(info.used);
        assert_eq!(info.consumer.as_deref(), Some("other"));
    }

    #[test]
    fn failing_writes() {
        let chip = SimChip::new(1);
        let line = chip.open_line(0, &output(Flags::empty(), State::Inactive)).unwrap();
        chip.fail_writes(0, true);
        let err = line.write(State::Active).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EIO));
        assert_eq!(chip.write_count(0), 0);
    }

    #[test]
    fn failing_close_still_releases() {
        let chip = SimChip::new(1);
        let line = chip.open_line(0, &input()).unwrap();
        chip.fail_close(0, true);
        let err = line.close().unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EIO));
        assert!(!chip.is_requested(0));

        chip.fail_line_info(0, true);
        assert_eq!(chip.line_info(0).unwrap_err().raw_os_error(), Some(libc::EIO));
    }

    #[test]
    fn hardware_pwm() {
        let chip = SimChip::with_hardware_pwm(1);
        let line = chip.open_line(0, &output(Flags::empty(), State::Inactive)).unwrap();
        let pwm = line.hardware_pwm().unwrap();

        assert_eq!(pwm.set_pwm_frequency(3).unwrap(), 3);
        assert_eq!(pwm.set_pwm_frequency(300_000).unwrap(), 333_333);
        pwm.set_pwm_duty(250).unwrap();
        assert_eq!(pwm.pwm_duty().unwrap(), 250);
        assert!(pwm.set_pwm_duty(SIM_PWM_RANGE + 1).is_err());
    }
}
