use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;

use bstr::ByteSlice;

use crate::backend::{Backend, ChipOptions, Registry};
use crate::errors::{Error, Result};
use crate::pin::Pin;

/// An open GPIO chip and its pins.
///
/// A chip is opened by identifier, `"<backend>[:<param>]"`, and owns one
/// [`Pin`] per line the backend reports. All pins start detached.
///
/// Dropping the chip detaches every pin before the backend is released.
/// Failures while detaching are logged, not returned.
///
/// ```no_run
/// use gpio_pins::{Chip, Mode, State};
///
/// # fn main() -> gpio_pins::Result<()> {
/// let mut chip = Chip::open("cdev:0")?;
/// let led = chip.pin_mut(17)?;
/// led.set_mode((Mode::Output, State::Active))?;
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Chip {
    backend: Arc<dyn Backend>,
    label: String,
    pins: Vec<Pin>,
}

impl Chip {
    /// Opens a chip through the default [`Registry`] with default options.
    pub fn open(id: &str) -> Result<Self> {
        Self::open_with(&Registry::default(), id, &ChipOptions::default())
    }

    pub fn open_with(registry: &Registry, id: &str, options: &ChipOptions) -> Result<Self> {
        let backend = registry.open(id, options)?;
        Self::from_backend(backend, options)
    }

    /// Wraps an already open backend.
    pub fn from_backend(backend: Arc<dyn Backend>, options: &ChipOptions) -> Result<Self> {
        let info = backend.chip_info()?;
        let pins = (0..info.lines)
            .map(|n| Pin::new(backend.clone(), n, options))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "{}: opened \"{}\" with {} lines",
            backend.target(),
            info.label,
            info.lines
        );
        Ok(Self {
            backend,
            label: info.label,
            pins,
        })
    }

    /// Backend name, e.g. `cdev`.
    pub fn kind(&self) -> &str {
        self.backend.kind()
    }

    /// Backend parameter the chip was opened with, e.g. `0` for `cdev:0`.
    pub fn id(&self) -> &str {
        self.backend.id()
    }

    /// Label reported by the chip.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    fn out_of_range(&self, n: usize) -> Error {
        Error::invalid_argument(
            self.backend.target(),
            format!("Pin {} out of range 0..{}", n, self.pins.len()),
        )
    }

    pub fn pin(&self, n: usize) -> Result<&Pin> {
        self.pins.get(n).ok_or_else(|| self.out_of_range(n))
    }

    pub fn pin_mut(&mut self, n: usize) -> Result<&mut Pin> {
        if n >= self.pins.len() {
            return Err(self.out_of_range(n));
        }
        Ok(&mut self.pins[n])
    }

    pub fn pins(&self) -> impl Iterator<Item = &Pin> + '_ {
        self.pins.iter()
    }

    pub fn pins_mut(&mut self) -> impl Iterator<Item = &mut Pin> + '_ {
        self.pins.iter_mut()
    }
}

impl Drop for Chip {
    fn drop(&mut self) {
        for pin in &mut self.pins {
            if let Err(e) = pin.detach() {
                log::warn!("{e}");
            }
        }
        self.pins.clear();
        log::debug!("{}: closed", self.backend.target());
    }
}

/// Lists the kernel GPIO chips present on this system as chip identifiers
/// for `backend` (`cdev`, `chip` or `gpiod`), sorted by chip number.
pub fn chip_ids(backend: &str) -> Result<Vec<String>> {
    let dir = std::fs::read_dir("/dev").map_err(|e| Error::resource(backend, "list /dev", e))?;

    let mut numbers = Vec::new();
    for entry in dir {
        let entry = entry.map_err(|e| Error::resource(backend, "list /dev", e))?;
        let name = entry.file_name();
        let Some(n) = name.as_bytes().strip_prefix(b"gpiochip") else {
            continue;
        };
        if let Some(n) = n.to_str().ok().and_then(|n| n.parse::<u32>().ok()) {
            numbers.push(n);
        }
    }

    numbers.sort_unstable();
    Ok(numbers.into_iter().map(|n| format!("{backend}:{n}")).collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::sim::SimChip;
    use crate::errors::ErrorKind;
    use crate::types::{Mode, State};
    use std::time::Duration;

    fn options() -> ChipOptions {
        ChipOptions::default().with_realtime_pwm(false)
    }

    #[test]
    fn four_line_scenario() {
        let mut chip = Chip::open_with(&Registry::default(), "sim:4", &options()).unwrap();
        assert_eq!(chip.pin_count(), 4);
        assert_eq!(chip.kind(), "sim");
        assert_eq!(chip.id(), "4");
        assert_eq!(chip.pin(5).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(chip.pin_mut(4).unwrap_err().kind(), ErrorKind::InvalidArgument);

        let pin = chip.pin_mut(0).unwrap();
        pin.set_mode((Mode::Output, State::Active)).unwrap();
        assert_eq!(pin.state().unwrap(), State::Active);

        pin.set_period(Duration::from_millis(1)).unwrap();
        pin.set_duty_cycle(25.0).unwrap();
        assert_eq!(pin.pulse(), Duration::from_micros(250));

        pin.detach().unwrap();
        assert_eq!(pin.state().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn pins_start_detached() {
        let chip = Chip::from_backend(SimChip::new(3), &options()).unwrap();
        assert_eq!(chip.label(), "simulated");
        assert!(chip.pins().all(Pin::is_detached));
        assert_eq!(
            chip.pins().map(Pin::position).collect::<Vec<_>>(),
            [0, 1, 2]
        );
    }

    #[test]
    fn drop_releases_lines() {
        let sim = SimChip::new(2);
        {
            let mut chip = Chip::from_backend(sim.clone(), &options()).unwrap();
            for pin in chip.pins_mut() {
                pin.set_mode(Mode::Input).unwrap();
            }
            assert!(sim.is_requested(1));
        }
        assert!(!sim.is_requested(0));
        assert!(!sim.is_requested(1));
    }

    #[test]
    fn bad_id() {
        let err = Chip::open("nope:0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = Chip::open("cdev:1234").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
