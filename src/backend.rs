//! The contract between the pin core and the transports behind it.
//!
//! A [`Backend`] stands for one opened chip. It reports chip and line
//! metadata and hands out a [`LineHandle`] per requested line; the handle
//! owns the kernel or daemon resource for as long as the pin stays in one
//! mode. Backends are picked at runtime by name through a [`Registry`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::types::{Flags, Mode, State};

mod cdev;
pub mod cdev_v1;
pub mod cdev_v2;
pub mod pigpio;
pub mod sim;

/// Consumer label used when none is configured.
pub const DEFAULT_CONSUMER: &str = "gpio-pins";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    /// A functional name for the chip, such as a product number. Might be empty.
    pub label: String,
    /// Number of lines, fixed for the lifetime of the chip.
    pub lines: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Line metadata as the backend currently sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineInfo {
    pub name: String,
    /// Direction the line is configured for; `None` if the backend cannot
    /// tell or the line is muxed to some other function.
    pub direction: Option<Direction>,
    /// Flags the backend reports as applied. Backends that cannot read
    /// them back report none.
    pub flags: Flags,
    /// Held by some consumer, the kernel included.
    pub used: bool,
    pub consumer: Option<String>,
}

/// What a line supports, queried before attempting a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub modes: &'static [Mode],
    pub input_flags: Flags,
    pub output_flags: Flags,
    /// PWM is done by the backend, no software driver is needed.
    pub hardware_pwm: bool,
}

impl Capabilities {
    pub fn supports_mode(&self, mode: Mode) -> bool {
        mode == Mode::Detached || self.modes.contains(&mode)
    }

    pub fn flags(&self) -> Flags {
        self.input_flags | self.output_flags
    }
}

/// Request for a line handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub direction: Direction,
    /// Already validated against the direction's flag family.
    pub flags: Flags,
    /// Initial level of an output, ignored for inputs.
    pub initial: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

/// An edge detected on an input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub kind: EdgeKind,
    /// Backend timestamp, where one is provided. The clock is backend specific.
    pub timestamp_ns: Option<u64>,
}

impl Edge {
    /// The logical level the line moved to.
    pub fn state(&self) -> State {
        State::new(self.kind == EdgeKind::Rising)
    }
}

/// Outcome of waiting for an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeWait {
    Edge(Edge),
    /// The handle was woken or the backend hung up; no more edges follow.
    Closed,
}

/// An open line in one mode.
///
/// `read`, `write`, `await_edge` and `wake` may be called from different
/// threads at once. `close` runs only after every other user is gone.
pub trait LineHandle: Send + Sync + fmt::Debug {
    fn read(&self) -> Result<State>;

    fn write(&self, state: State) -> Result<()>;

    /// Whether [`LineHandle::await_edge`] delivers edges.
    fn supports_edges(&self) -> bool {
        false
    }

    /// Blocks until the next edge. Not auto-repeating: call again for the
    /// next one.
    fn await_edge(&self) -> Result<EdgeWait> {
        Ok(EdgeWait::Closed)
    }

    /// Makes a pending or future [`LineHandle::await_edge`] return
    /// [`EdgeWait::Closed`].
    fn wake(&self) {}

    fn hardware_pwm(&self) -> Option<&dyn HardwarePwm> {
        None
    }

    /// Releases the line.
    fn close(self: Box<Self>) -> Result<()>;
}

/// A line handle shared with a pin's worker thread. Only the pin closes it,
/// after the worker is gone.
pub(crate) type SharedLine = Arc<Box<dyn LineHandle>>;

/// PWM timers driven by the backend itself.
pub trait HardwarePwm {
    /// Programs the frequency, returning the one actually applied.
    fn set_pwm_frequency(&self, hz: u32) -> Result<u32>;

    fn pwm_frequency(&self) -> Result<u32>;

    /// Programs the duty cycle as a fraction of [`HardwarePwm::pwm_range`].
    fn set_pwm_duty(&self, duty: u32) -> Result<()>;

    fn pwm_duty(&self) -> Result<u32>;

    fn pwm_range(&self) -> u32;
}

/// One opened chip.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Backend name, the part of the chip id before the colon.
    fn kind(&self) -> &str;

    /// Backend specific parameter, the part of the chip id after the colon.
    fn id(&self) -> &str;

    /// `kind:id`, used to prefix error messages.
    fn target(&self) -> String {
        if self.id().is_empty() {
            self.kind().to_owned()
        } else {
            format!("{}:{}", self.kind(), self.id())
        }
    }

    fn chip_info(&self) -> Result<ChipInfo>;

    fn line_info(&self, offset: u32) -> Result<LineInfo>;

    fn capabilities(&self, offset: u32) -> Capabilities;

    fn open_line(&self, offset: u32, request: &LineRequest) -> Result<Box<dyn LineHandle>>;
}

/// Settings applied when opening a chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipOptions {
    pub(crate) consumer: String,
    pub(crate) realtime_pwm: bool,
    pub(crate) pigpio_addr: Option<String>,
}

impl ChipOptions {
    pub fn new() -> Self {
        Self {
            consumer: DEFAULT_CONSUMER.to_owned(),
            realtime_pwm: true,
            pigpio_addr: None,
        }
    }

    /// Consumer label the kernel shows for lines this chip requests.
    pub fn with_consumer(self, consumer: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            ..self
        }
    }

    /// Whether software PWM threads try for realtime round-robin
    /// scheduling. Failing to get it is not an error.
    pub fn with_realtime_pwm(self, realtime_pwm: bool) -> Self {
        Self {
            realtime_pwm,
            ..self
        }
    }

    /// Default `host:port` for `pigpio` chips opened without one.
    pub fn with_pigpio_addr(self, addr: impl Into<String>) -> Self {
        Self {
            pigpio_addr: Some(addr.into()),
            ..self
        }
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub fn realtime_pwm(&self) -> bool {
        self.realtime_pwm
    }
}

impl Default for ChipOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens the backend for the parameter part of a chip id.
pub type Constructor = fn(param: &str, options: &ChipOptions) -> Result<Arc<dyn Backend>>;

/// Backend constructors by name.
#[derive(Clone)]
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

impl Registry {
    /// A registry without any backend.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Adds a backend, returning the constructor it replaced.
    pub fn register(&mut self, name: impl Into<String>, ctor: Constructor) -> Option<Constructor> {
        self.constructors.insert(name.into(), ctor)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.constructors.keys().map(String::as_str)
    }

    /// Opens `id`, of the form `backend` or `backend:param`.
    pub fn open(&self, id: &str, options: &ChipOptions) -> Result<Arc<dyn Backend>> {
        let (name, param) = id.split_once(':').unwrap_or((id, ""));

        let ctor = self.constructors.get(name).ok_or_else(|| {
            Error::invalid_argument(id, format!("Unknown backend type '{name}'"))
        })?;

        log::debug!("{id}: opening chip");
        ctor(param, options)
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(cdev_v1::GPIOD, cdev_v1::open_gpiod);
        registry.register(cdev_v1::CHIP, cdev_v1::open_chip);
        registry.register(cdev_v2::CDEV, cdev_v2::open);
        registry.register(pigpio::PIGPIO, pigpio::open);
        registry.register(sim::SIM, sim::open);
        registry
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
