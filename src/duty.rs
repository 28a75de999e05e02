//! Period/pulse waveform and duty-cycle conversion.
//!
//! One tick is one nanosecond. Durations saturate at `u64::MAX` ticks.

use std::time::Duration;

/// Default period of a freshly opened pin: 100 ms.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);

/// A PWM waveform. Always `1 <= period` and `pulse <= period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waveform {
    period: u64,
    pulse: u64,
}

/// High/low split of one waveform cycle, in ticks. `high + low == period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticks {
    pub high: u64,
    pub low: u64,
}

pub(crate) fn to_ticks(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

impl Waveform {
    pub fn new(period: Duration, pulse: Duration) -> Self {
        let mut w = Self::default();
        w.set_period(period);
        w.set_pulse(pulse);
        w
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period)
    }

    pub fn pulse(&self) -> Duration {
        Duration::from_nanos(self.pulse)
    }

    /// Sets the period, at least one tick. A pulse longer than the new
    /// period is cut down to it.
    pub fn set_period(&mut self, period: Duration) {
        self.period = to_ticks(period).max(1);
        self.pulse = self.pulse.min(self.period);
    }

    /// Sets the pulse, clamped into `[0, period]`.
    pub fn set_pulse(&mut self, pulse: Duration) {
        self.pulse = to_ticks(pulse).min(self.period);
    }

    /// Sets the pulse from a percentage of the period, rounding half up.
    /// The percentage is clamped to `[0, 100]`; NaN counts as 0.
    pub fn set_duty_cycle(&mut self, pc: f64) {
        let pc = if pc.is_nan() { 0.0 } else { pc.clamp(0.0, 100.0) };
        // `as` saturates, and the result is at most `period` anyway
        let pulse = (self.period as f64 * pc / 100.0 + 0.5) as u64;
        self.pulse = pulse.min(self.period);
    }

    pub fn duty_cycle(&self) -> f64 {
        100.0 * self.pulse as f64 / self.period as f64
    }

    pub fn ticks(&self) -> Ticks {
        Ticks {
            high: self.pulse,
            low: self.period - self.pulse,
        }
    }

    /// Always off or always on: no toggling needed.
    pub fn is_constant(&self) -> bool {
        self.pulse == 0 || self.pulse == self.period
    }

    /// Level held by a constant waveform.
    pub(crate) fn constant_level(&self) -> bool {
        self.pulse == self.period
    }

    /// Frequency in whole Hz, at least 1.
    pub(crate) fn frequency_hz(&self) -> u32 {
        u32::try_from(1_000_000_000 / self.period)
            .unwrap_or(u32::MAX)
            .max(1)
    }

    /// Replaces the period with the one of a `hz` frequency, keeping the
    /// duty cycle as close as the tick resolution allows.
    pub(crate) fn set_frequency_hz(&mut self, hz: u32) {
        let pc = self.duty_cycle();
        self.period = (1_000_000_000 / u64::from(hz.max(1))).max(1);
        self.set_duty_cycle(pc);
    }

    /// Pulse as a fraction of `range`, truncating.
    pub(crate) fn duty_in_range(&self, range: u32) -> u32 {
        let d = u128::from(self.pulse) * u128::from(range) / u128::from(self.period);
        u32::try_from(d).unwrap_or(range)
    }

    /// Sets the pulse from a fraction of `range`.
    pub(crate) fn set_duty_in_range(&mut self, duty: u32, range: u32) {
        let range = u128::from(range.max(1));
        let p = u128::from(self.period) * u128::from(duty) / range;
        self.pulse = u64::try_from(p).unwrap_or(u64::MAX).min(self.period);
    }
}

impl Default for Waveform {
    fn default() -> Self {
        Self {
            period: to_ticks(DEFAULT_PERIOD),
            pulse: 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quarter_duty() {
        let mut w = Waveform::default();
        w.set_period(Duration::from_nanos(1_000_000));
        w.set_duty_cycle(25.0);
        assert_eq!(w.pulse(), Duration::from_nanos(250_000));
        assert_eq!(
            w.ticks(),
            Ticks {
                high: 250_000,
                low: 750_000
            }
        );
    }

    #[test]
    fn duty_round_trip_within_one_tick() {
        for period in [1u64, 2, 3, 7, 10, 999, 1_000, 20_000_000] {
            let mut w = Waveform::default();
            w.set_period(Duration::from_nanos(period));
            let tick_pc = 100.0 / period as f64;
            for pc in [0.0, 0.1, 12.5, 33.3, 49.99, 50.0, 66.6, 99.9, 100.0] {
                w.set_duty_cycle(pc);
                let actual = w.duty_cycle();
                assert!(
                    (actual - pc).abs() <= tick_pc,
                    "period {period} pc {pc} actual {actual}"
                );
            }
        }
    }

    #[test]
    fn rounds_half_up() {
        let mut w = Waveform::default();
        w.set_period(Duration::from_nanos(3));
        // 3 * 50% = 1.5 ticks
        w.set_duty_cycle(50.0);
        assert_eq!(w.pulse(), Duration::from_nanos(2));
    }

    #[test]
    fn duty_clamps() {
        let mut w = Waveform::default();
        w.set_duty_cycle(150.0);
        assert_eq!(w.pulse(), w.period());
        w.set_duty_cycle(-3.0);
        assert_eq!(w.pulse(), Duration::ZERO);
        w.set_duty_cycle(f64::NAN);
        assert_eq!(w.pulse(), Duration::ZERO);
    }

    #[test]
    fn pulse_clamps_to_period() {
        let mut w = Waveform::default();
        w.set_period(Duration::from_micros(10));
        w.set_pulse(Duration::from_micros(25));
        assert_eq!(w.pulse(), Duration::from_micros(10));
    }

    #[test]
    fn period_at_least_one_tick() {
        let mut w = Waveform::default();
        w.set_period(Duration::ZERO);
        assert_eq!(w.period(), Duration::from_nanos(1));
        assert_eq!(w.duty_cycle(), 0.0);
    }

    #[test]
    fn shorter_period_reclamps_pulse() {
        let mut w = Waveform::new(Duration::from_millis(10), Duration::from_millis(8));
        w.set_period(Duration::from_millis(5));
        assert_eq!(w.pulse(), Duration::from_millis(5));
        assert!(w.is_constant());
        assert!(w.constant_level());

        // A longer period leaves the pulse alone.
        w.set_period(Duration::from_millis(20));
        assert_eq!(w.pulse(), Duration::from_millis(5));
    }

    #[test]
    fn saturates_huge_durations() {
        let mut w = Waveform::default();
        w.set_period(Duration::MAX);
        assert_eq!(w.period(), Duration::from_nanos(u64::MAX));
        w.set_duty_cycle(100.0);
        assert_eq!(w.pulse(), w.period());
    }

    #[test]
    fn frequency_and_range() {
        let mut w = Waveform::new(Duration::from_millis(1), Duration::from_micros(250));
        assert_eq!(w.frequency_hz(), 1000);
        assert_eq!(w.duty_in_range(40_000), 10_000);

        w.set_frequency_hz(500);
        assert_eq!(w.period(), Duration::from_millis(2));
        assert_eq!(w.pulse(), Duration::from_micros(500));

        w.set_duty_in_range(20_000, 40_000);
        assert_eq!(w.pulse(), Duration::from_millis(1));
    }
}
