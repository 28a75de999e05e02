//! A single GPIO line and its mode state machine.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    Backend, Capabilities, ChipOptions, Direction, LineInfo, LineRequest, SharedLine,
};
use crate::duty::Waveform;
use crate::errors::{Error, Result};
use crate::events::EventReader;
use crate::notify::{CallChain, CallId};
use crate::soft_pwm::SoftPwm;
use crate::types::{Family, Flags, Mode, ModeRequest, State};

/// Worker thread bound to the current mode.
#[derive(Debug)]
enum Driver {
    Idle,
    SoftPwm(SoftPwm),
    Events(EventReader),
}

#[derive(Debug)]
struct Attached {
    handle: SharedLine,
    driver: Driver,
}

/// One line of a [`Chip`](crate::Chip).
///
/// A pin starts out [`Mode::Detached`]. [`Pin::set_mode`] validates the
/// request against the backend's capabilities, releases whatever the pin
/// held before and requests the line anew. Input pins whose backend reports
/// edges run a reader thread that feeds the registered callbacks; PWM pins
/// either program the backend's PWM hardware or run a software driver
/// thread.
///
/// A pin is driven from one thread at a time; callbacks run on the pin's
/// reader thread.
#[derive(Debug)]
pub struct Pin {
    backend: Arc<dyn Backend>,
    position: u32,
    target: String,
    realtime_pwm: bool,
    caps: Capabilities,
    info: LineInfo,
    requested: Mode,
    flags: Flags,
    waveform: Waveform,
    attached: Option<Attached>,
    chain: CallChain,
    pwm_error: Option<Error>,
}

impl Pin {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        position: u32,
        options: &ChipOptions,
    ) -> Result<Self> {
        let target = format!("{} pin {}", backend.target(), position);
        let caps = backend.capabilities(position);
        let info = backend.line_info(position)?;

        Ok(Self {
            backend,
            position,
            target,
            realtime_pwm: options.realtime_pwm(),
            caps,
            info,
            requested: Mode::Detached,
            flags: Flags::empty(),
            waveform: Waveform::default(),
            attached: None,
            chain: CallChain::new(),
            pwm_error: None,
        })
    }

    /// Line offset within the chip.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Line name as last reported by the backend.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Line metadata as last reported by the backend.
    pub fn info(&self) -> &LineInfo {
        &self.info
    }

    /// Whether some consumer holds the line, as last reported by the
    /// backend. Informational only; it does not block mode changes.
    pub fn is_used(&self) -> bool {
        self.info.used
    }

    /// Re-reads the line metadata from the backend.
    pub fn refresh(&mut self) -> Result<()> {
        self.info = self.backend.line_info(self.position)?;
        Ok(())
    }

    /// Current mode.
    ///
    /// A software PWM pin reports [`Mode::Pwm`] only while its driver runs:
    /// with a constant waveform, or once the driver stopped on an error, it
    /// reports [`Mode::Output`].
    pub fn mode(&self) -> Mode {
        match (&self.attached, self.requested) {
            (None, _) => Mode::Detached,
            (Some(_), Mode::Pwm) if self.caps.hardware_pwm => Mode::Pwm,
            (Some(_), Mode::Pwm) if self.pwm_running() => Mode::Pwm,
            (Some(_), Mode::Pwm) => Mode::Output,
            (Some(_), mode) => mode,
        }
    }

    pub fn is_detached(&self) -> bool {
        self.attached.is_none()
    }

    pub fn is_input(&self) -> bool {
        self.mode() == Mode::Input
    }

    /// Output, PWM included.
    pub fn is_output(&self) -> bool {
        matches!(self.mode(), Mode::Output | Mode::Pwm)
    }

    /// Flags applied by the last successful [`Pin::set_mode`].
    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn is(&self, flag: Flags) -> bool {
        !flag.is_empty() && self.flags.contains(flag)
    }

    pub fn supported_modes(&self) -> &'static [Mode] {
        self.caps.modes
    }

    pub fn supports_mode(&self, mode: Mode) -> bool {
        self.caps.supports_mode(mode)
    }

    /// Flags valid in at least one mode.
    pub fn supported_flags(&self) -> Flags {
        self.caps.flags()
    }

    pub fn supports_flag(&self, flag: Flags) -> bool {
        !flag.is_empty() && self.caps.flags().contains(flag)
    }

    /// Whether the pin is in PWM mode with the backend doing the pulsing.
    pub fn is_hardware_pwm(&self) -> bool {
        self.caps.hardware_pwm && self.mode() == Mode::Pwm
    }

    /// Whether a software PWM driver thread is toggling the pin.
    pub fn pwm_running(&self) -> bool {
        matches!(
            &self.attached,
            Some(Attached { driver: Driver::SoftPwm(pwm), .. }) if pwm.is_running()
        )
    }

    fn check_request(&self, req: &ModeRequest) -> Result<Direction> {
        if !self.caps.supports_mode(req.mode) {
            return Err(Error::invalid_argument(
                &self.target,
                format!("Unsupported mode: {}", req.mode),
            ));
        }

        let (valid, direction) = match req.mode.family() {
            Some(Family::Input) => (self.caps.input_flags, Direction::Input),
            Some(Family::Output) => (self.caps.output_flags, Direction::Output),
            None => unreachable!("detached requests never get here"),
        };

        let invalid = req.flags.difference(valid);
        if !invalid.is_empty() {
            return Err(Error::invalid_argument(
                &self.target,
                format!("Invalid flags for {} mode: {}", req.mode, invalid),
            ));
        }
        for pair in [
            Flags::PULL_UP | Flags::PULL_DOWN,
            Flags::OPEN_DRAIN | Flags::OPEN_SOURCE,
        ] {
            if req.flags.contains(pair) {
                return Err(Error::invalid_argument(
                    &self.target,
                    format!("Conflicting flags: {pair}"),
                ));
            }
        }
        Ok(direction)
    }

    /// Changes the pin mode.
    ///
    /// Accepts a bare [`Mode`] or a `(Mode, Flags)`, `(Mode, State)` or
    /// `(Mode, Flags, State)` tuple; the state is the initial level of an
    /// output. The request is validated first, so a rejected request leaves
    /// the pin as it was. Otherwise the pin is detached, then attached in
    /// the new mode; if that fails the pin stays detached. Failures to
    /// release the old line or to re-read the line metadata are logged.
    pub fn set_mode(&mut self, req: impl Into<ModeRequest>) -> Result<()> {
        let req = req.into();
        if req.mode == Mode::Detached {
            return self.detach();
        }

        let direction = self.check_request(&req)?;
        if let Err(e) = self.detach() {
            log::warn!("{e}");
        }

        let request = LineRequest {
            direction,
            flags: req.flags,
            initial: req.initial,
        };
        let handle: SharedLine = Arc::new(self.backend.open_line(self.position, &request)?);

        self.attached = Some(Attached {
            handle: handle.clone(),
            driver: Driver::Idle,
        });
        self.requested = req.mode;
        self.flags = req.flags;
        log::debug!("{}: mode {} flags {}", self.target, req.mode, req.flags);

        let started = if req.mode == Mode::Input && handle.supports_edges() {
            match EventReader::start(handle, self.chain.clone(), &self.target) {
                Ok(reader) => {
                    if let Some(attached) = &mut self.attached {
                        attached.driver = Driver::Events(reader);
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        } else {
            drop(handle);
            match req.mode {
                Mode::Pwm => self.apply_waveform(),
                _ => Ok(()),
            }
        };
        if let Err(e) = started {
            if let Err(close) = self.detach() {
                log::warn!("{}: {close}", self.target);
            }
            return Err(e);
        }

        if let Err(e) = self.refresh() {
            log::warn!("{e}");
        }
        Ok(())
    }

    /// Releases the line. Does nothing if the pin is already detached.
    ///
    /// A software PWM driver is stopped and joined first, which may take
    /// as long as the write it has in flight. If releasing the line fails
    /// the error is returned, but the pin is detached all the same.
    pub fn detach(&mut self) -> Result<()> {
        let Some(attached) = self.attached.take() else {
            return Ok(());
        };
        self.requested = Mode::Detached;
        self.flags = Flags::empty();

        match attached.driver {
            Driver::SoftPwm(mut pwm) => {
                if let Err(e) = pwm.stop() {
                    self.pwm_error = Some(e);
                }
            }
            Driver::Events(mut reader) => reader.stop(),
            Driver::Idle => {}
        }

        let closed = match Arc::try_unwrap(attached.handle) {
            Ok(handle) => handle.close(),
            Err(_) => {
                log::warn!("{}: line still shared, closing on drop", self.target);
                Ok(())
            }
        };
        log::debug!("{}: detached", self.target);

        closed.and(self.refresh())
    }

    fn handle(&self) -> Result<&SharedLine> {
        self.attached
            .as_ref()
            .map(|a| &a.handle)
            .ok_or_else(|| Error::invalid_state(&self.target, "Pin is detached"))
    }

    /// Logical level of the line.
    ///
    /// Fails with [`ErrorKind::InvalidState`](crate::ErrorKind::InvalidState)
    /// while detached or while a software PWM driver owns the line.
    pub fn state(&self) -> Result<State> {
        let handle = self.handle()?;
        if self.pwm_running() {
            return Err(Error::invalid_state(
                &self.target,
                "Pin is driven by software PWM",
            ));
        }
        handle.read()
    }

    /// Drives an output to `state`.
    ///
    /// On a software PWM pin that is not pulsing, this turns the pin into a
    /// plain output.
    pub fn set_state(&mut self, state: State) -> Result<()> {
        let handle = self.handle()?.clone();
        match self.mode() {
            Mode::Output => {}
            Mode::Input => return Err(Error::invalid_state(&self.target, "Pin is an input")),
            _ => return Err(Error::invalid_state(&self.target, "Pin is in PWM mode")),
        }

        if self.requested == Mode::Pwm {
            self.stop_soft_pwm();
            self.requested = Mode::Output;
        }
        handle.write(state)
    }

    /// Drives an output inactive.
    pub fn reset(&mut self) -> Result<()> {
        self.set_state(State::Inactive)
    }

    pub fn period(&self) -> Duration {
        self.waveform.period()
    }

    pub fn pulse(&self) -> Duration {
        self.waveform.pulse()
    }

    /// Pulse as a percentage of the period.
    pub fn duty_cycle(&self) -> f64 {
        self.waveform.duty_cycle()
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Sets the PWM period, at least one nanosecond. A longer pulse is cut
    /// down to the new period.
    ///
    /// Takes effect at once on a PWM pin. Hardware PWM may round the
    /// period; the stored waveform is read back from the backend.
    pub fn set_period(&mut self, period: Duration) -> Result<()> {
        self.waveform.set_period(period);
        self.apply_waveform()
    }

    /// Sets the PWM pulse width, clamped to the period.
    pub fn set_pulse(&mut self, pulse: Duration) -> Result<()> {
        self.waveform.set_pulse(pulse);
        self.apply_waveform()
    }

    /// Sets the pulse width as a percentage of the period, clamped to
    /// `[0, 100]` and rounded half up to whole nanoseconds.
    pub fn set_duty_cycle(&mut self, pc: f64) -> Result<()> {
        self.waveform.set_duty_cycle(pc);
        self.apply_waveform()
    }

    /// Pushes the waveform to a PWM pin. Other pins only store it.
    fn apply_waveform(&mut self) -> Result<()> {
        if self.requested != Mode::Pwm {
            return Ok(());
        }
        let handle = self.handle()?.clone();

        if let Some(hw) = handle.hardware_pwm() {
            let range = hw.pwm_range();
            hw.set_pwm_frequency(self.waveform.frequency_hz())?;
            self.waveform.set_frequency_hz(hw.pwm_frequency()?);

            hw.set_pwm_duty(self.waveform.duty_in_range(range))?;
            if !self.waveform.pulse().is_zero() {
                self.waveform.set_duty_in_range(hw.pwm_duty()?, range);
            }
            return Ok(());
        }

        if self.waveform.is_constant() {
            self.stop_soft_pwm();
            return handle.write(State::new(self.waveform.constant_level()));
        }

        let ticks = self.waveform.ticks();
        if let Some(Attached {
            driver: Driver::SoftPwm(pwm),
            ..
        }) = &self.attached
        {
            if pwm.is_running() {
                pwm.reconfigure(ticks);
                return Ok(());
            }
        }

        self.stop_soft_pwm();
        let pwm = SoftPwm::start(handle, ticks, self.realtime_pwm, &self.target)?;
        if let Some(attached) = &mut self.attached {
            attached.driver = Driver::SoftPwm(pwm);
        }
        Ok(())
    }

    /// Stops a software PWM driver, keeping the error it stopped on.
    fn stop_soft_pwm(&mut self) {
        let Some(attached) = &mut self.attached else {
            return;
        };
        if let Driver::SoftPwm(mut pwm) = mem::replace(&mut attached.driver, Driver::Idle) {
            if let Err(e) = pwm.stop() {
                self.pwm_error = Some(e);
            }
        }
    }

    /// Takes the error a software PWM driver stopped itself on.
    ///
    /// A driver that fails to write to the line logs the error and exits,
    /// leaving the pin in [`Mode::Output`]; changing the waveform or the
    /// mode starts a new one.
    pub fn take_pwm_error(&mut self) -> Option<Error> {
        let finished = matches!(
            &self.attached,
            Some(Attached { driver: Driver::SoftPwm(pwm), .. }) if !pwm.is_running()
        );
        if finished {
            self.stop_soft_pwm();
        }
        self.pwm_error.take()
    }

    /// Registers a callback invoked with the new level on every edge of an
    /// input pin, in registration order.
    ///
    /// Callbacks run on the pin's reader thread and must not call back into
    /// this pin's mode methods.
    pub fn on_state_changed(&self, f: impl Fn(State) + Send + Sync + 'static) -> CallId {
        self.chain.add(f)
    }

    /// Registers a callback invoked on every rising edge.
    pub fn on_state_on(&self, f: impl Fn() + Send + Sync + 'static) -> CallId {
        self.chain.add(move |state| {
            if state.is_active() {
                f()
            }
        })
    }

    /// Registers a callback invoked on every falling edge.
    pub fn on_state_off(&self, f: impl Fn() + Send + Sync + 'static) -> CallId {
        self.chain.add(move |state| {
            if !state.is_active() {
                f()
            }
        })
    }

    /// Unregisters a callback, returning `false` if it was not registered.
    /// Safe to call from within the callback itself.
    pub fn remove_callback(&self, id: CallId) -> bool {
        self.chain.remove(id)
    }
}

impl Drop for Pin {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            log::warn!("{}: {e}", self.target);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::sim::{SimChip, SIM_PWM_RANGE};
    use crate::errors::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    fn sim_pin(chip: &Arc<SimChip>, position: u32) -> Pin {
        let options = ChipOptions::default().with_realtime_pwm(false);
        Pin::new(chip.clone(), position, &options).unwrap()
    }

    fn wait_for(cond: impl Fn() -> bool) {
        let started = Instant::now();
        while !cond() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn output_levels() {
        let chip = SimChip::new(2);
        let mut pin = sim_pin(&chip, 1);
        assert_eq!(pin.mode(), Mode::Detached);
        assert_eq!(pin.name(), "SIM1");

        pin.set_mode((Mode::Output, Flags::ACTIVE_LOW, State::Active))
            .unwrap();
        assert!(pin.is_output());
        assert!(pin.is(Flags::ACTIVE_LOW));
        assert!(!chip.level(1));
        assert_eq!(pin.state().unwrap(), State::Active);

        pin.reset().unwrap();
        assert!(chip.level(1));
        assert_eq!(pin.state().unwrap(), State::Inactive);
    }

    #[test]
    fn rejected_flags_leave_pin_alone() {
        let chip = SimChip::new(1);
        let mut pin = sim_pin(&chip, 0);
        pin.set_mode((Mode::Output, State::Active)).unwrap();

        let err = pin.set_mode((Mode::Input, Flags::OPEN_DRAIN)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.target(), "sim:1 pin 0");

        let err = pin.set_mode((Mode::Output, Flags::PULL_UP)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = pin
            .set_mode((Mode::Output, Flags::OPEN_DRAIN | Flags::OPEN_SOURCE))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(pin.mode(), Mode::Output);
        assert!(chip.is_requested(0));
        assert_eq!(pin.state().unwrap(), State::Active);
    }

    #[test]
    fn detach_twice() {
        let chip = SimChip::new(1);
        let mut pin = sim_pin(&chip, 0);
        pin.set_mode(Mode::Input).unwrap();

        pin.detach().unwrap();
        pin.detach().unwrap();
        assert!(pin.is_detached());
        assert!(!chip.is_requested(0));
        assert_eq!(pin.flags(), Flags::empty());
    }

    #[test]
    fn detached_state_is_invalid() {
        let chip = SimChip::new(1);
        let mut pin = sim_pin(&chip, 0);
        assert_eq!(pin.state().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(
            pin.set_state(State::Active).unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        pin.set_mode(Mode::Input).unwrap();
        assert_eq!(
            pin.set_state(State::Active).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn close_failure_does_not_lose_the_request() {
        let chip = SimChip::new(1);
        let mut pin = sim_pin(&chip, 0);
        pin.set_mode(Mode::Input).unwrap();

        chip.fail_close(0, true);
        pin.set_mode((Mode::Output, State::Active)).unwrap();
        assert_eq!(pin.mode(), Mode::Output);
        assert!(chip.level(0));

        chip.fail_close(0, false);
        pin.detach().unwrap();
    }

    #[test]
    fn metadata_failure_keeps_new_mode() {
        let chip = SimChip::new(1);
        let mut pin = sim_pin(&chip, 0);
        pin.set_period(Duration::from_millis(1)).unwrap();
        pin.set_duty_cycle(50.0).unwrap();

        chip.fail_line_info(0, true);
        pin.set_mode(Mode::Pwm).unwrap();
        assert_eq!(pin.mode(), Mode::Pwm);
        assert!(pin.pwm_running());

        chip.fail_line_info(0, false);
        pin.detach().unwrap();
        assert!(!chip.is_requested(0));
    }

    #[test]
    fn busy_line_fails_and_stays_detached() {
        let chip = SimChip::new(1);
        let mut first = sim_pin(&chip, 0);
        let mut second = sim_pin(&chip, 0);
        first.set_mode(Mode::Output).unwrap();

        let err = second.set_mode(Mode::Output).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(err.raw_os_error(), Some(libc::EBUSY));
        assert!(second.is_detached());
    }

    #[test]
    fn input_callbacks() {
        let chip = SimChip::new(1);
        let mut pin = sim_pin(&chip, 0);
        let ons = Arc::new(AtomicUsize::new(0));
        let offs = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));

        {
            let ons = ons.clone();
            pin.on_state_on(move || {
                ons.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let offs = offs.clone();
            pin.on_state_off(move || {
                offs.fetch_add(1, Ordering::SeqCst);
            });
        }
        let id = {
            let all = all.clone();
            pin.on_state_changed(move |_| {
                all.fetch_add(1, Ordering::SeqCst);
            })
        };

        pin.set_mode((Mode::Input, Flags::PULL_UP)).unwrap();
        chip.set_input(0, true);
        wait_for(|| all.load(Ordering::SeqCst) == 1);
        chip.set_input(0, false);
        wait_for(|| all.load(Ordering::SeqCst) == 2);

        assert_eq!(ons.load(Ordering::SeqCst), 1);
        assert_eq!(offs.load(Ordering::SeqCst), 1);

        assert!(pin.remove_callback(id));
        assert!(!pin.remove_callback(id));
        pin.detach().unwrap();
    }

    #[test]
    fn quarter_duty_pwm() {
        let chip = SimChip::new(1);
        let mut pin = sim_pin(&chip, 0);
        pin.set_mode(Mode::Pwm).unwrap();
        // zero pulse: held low, no driver
        assert_eq!(pin.mode(), Mode::Output);
        assert!(!pin.pwm_running());

        pin.set_period(Duration::from_millis(1)).unwrap();
        pin.set_duty_cycle(25.0).unwrap();
        assert_eq!(pin.pulse(), Duration::from_micros(250));
        assert_eq!(pin.mode(), Mode::Pwm);
        assert_eq!(pin.state().unwrap_err().kind(), ErrorKind::InvalidState);

        pin.set_duty_cycle(100.0).unwrap();
        assert!(!pin.pwm_running());
        assert!(chip.level(0));

        pin.set_duty_cycle(50.0).unwrap();
        assert!(pin.pwm_running());
        pin.detach().unwrap();
        assert!(!pin.pwm_running());
    }

    #[test]
    fn one_driver_at_a_time() {
        let chip = SimChip::new(1);
        chip.set_write_delay(Duration::from_micros(200));
        let mut pin = sim_pin(&chip, 0);
        pin.set_period(Duration::from_micros(500)).unwrap();
        pin.set_duty_cycle(50.0).unwrap();

        for n in 0..5 {
            pin.set_mode(Mode::Pwm).unwrap();
            thread::sleep(Duration::from_millis(5));
            pin.set_duty_cycle(20.0 + f64::from(n) * 10.0).unwrap();
            thread::sleep(Duration::from_millis(5));
        }
        pin.detach().unwrap();

        assert!(chip.write_count(0) > 0);
        assert_eq!(chip.max_concurrent_writers(0), 1);
    }

    #[test]
    fn driver_stops_on_write_error() {
        let chip = SimChip::new(1);
        let mut pin = sim_pin(&chip, 0);
        pin.set_period(Duration::from_millis(1)).unwrap();
        pin.set_duty_cycle(50.0).unwrap();
        pin.set_mode(Mode::Pwm).unwrap();

        chip.fail_writes(0, true);
        wait_for(|| !pin.pwm_running());
        assert_eq!(pin.mode(), Mode::Output);

        let err = pin.take_pwm_error().unwrap();
        assert_eq!(err.raw_os_error(), Some(libc::EIO));
        assert!(pin.take_pwm_error().is_none());

        // a new waveform restarts the driver
        chip.fail_writes(0, false);
        pin.set_duty_cycle(40.0).unwrap();
        assert_eq!(pin.mode(), Mode::Pwm);
    }

    #[test]
    fn hardware_pwm_reads_back() {
        let chip = SimChip::with_hardware_pwm(1);
        let mut pin = sim_pin(&chip, 0);
        pin.set_mode(Mode::Pwm).unwrap();
        assert_eq!(pin.mode(), Mode::Pwm);
        assert!(pin.is_hardware_pwm());
        assert!(!pin.pwm_running());

        pin.set_period(Duration::from_millis(1)).unwrap();
        pin.set_duty_cycle(25.0).unwrap();
        assert_eq!(pin.period(), Duration::from_millis(1));
        assert_eq!(pin.pulse(), Duration::from_micros(250));

        // a shorter period cuts the pulse
        pin.set_period(Duration::from_nanos(3_333)).unwrap();
        assert_eq!(pin.duty_cycle(), 100.0);

        // 300 kHz has no whole microsecond period, 333 kHz does
        pin.set_duty_cycle(25.0).unwrap();
        assert_eq!(pin.period(), Duration::from_nanos(3_000));
        assert!((pin.duty_cycle() - 25.0).abs() <= 100.0 / f64::from(SIM_PWM_RANGE));
    }

    #[test]
    fn used_elsewhere_is_informational() {
        let chip = SimChip::new(1);
        chip.set_used(0, true);
        let mut pin = sim_pin(&chip, 0);
        assert!(pin.is_used());
        pin.set_mode(Mode::Output).unwrap();
        assert!(pin.is_used());
    }

    #[test]
    fn capabilities() {
        let chip = SimChip::new(1);
        let pin = sim_pin(&chip, 0);
        assert!(pin.supports_mode(Mode::Pwm));
        assert!(pin.supports_flag(Flags::OPEN_SOURCE));
        assert!(!pin.supports_flag(Flags::empty()));
        assert_eq!(
            pin.supported_flags(),
            Flags::INPUT_FLAGS | Flags::OUTPUT_FLAGS
        );
        assert_eq!(pin.supported_modes(), [Mode::Input, Mode::Output, Mode::Pwm]);
    }
}
