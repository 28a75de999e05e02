//! Portable pin vocabulary: modes, flags and logical levels.

use std::fmt;

use bitflags::bitflags;
use itertools::Itertools;

/// Pin mode.
///
/// [`Mode::Pwm`] is requested like any other mode, but a software-PWM pin
/// only reports it while its driver thread is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mode {
    Detached,
    Input,
    Output,
    Pwm,
}

impl Mode {
    /// The flag family a mode draws its flags from.
    pub(crate) const fn family(self) -> Option<Family> {
        match self {
            Mode::Detached => None,
            Mode::Input => Some(Family::Input),
            Mode::Output | Mode::Pwm => Some(Family::Output),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Detached => "detached",
            Mode::Input => "input",
            Mode::Output => "output",
            Mode::Pwm => "pwm",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Input,
    Output,
}

bitflags! {
    /// Pin configuration flags.
    ///
    /// `ACTIVE_LOW` applies to both directions; `PULL_UP`/`PULL_DOWN` are
    /// input-only, `OPEN_DRAIN`/`OPEN_SOURCE` output-only.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        const ACTIVE_LOW = 0x0001;
        const PULL_UP = 0x0010;
        const PULL_DOWN = 0x0020;
        const OPEN_DRAIN = 0x0100;
        const OPEN_SOURCE = 0x0200;
    }
}

impl Flags {
    pub const INPUT_FLAGS: Flags = Flags::ACTIVE_LOW
        .union(Flags::PULL_UP)
        .union(Flags::PULL_DOWN);

    pub const OUTPUT_FLAGS: Flags = Flags::ACTIVE_LOW
        .union(Flags::OPEN_DRAIN)
        .union(Flags::OPEN_SOURCE);
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names = self
            .iter_names()
            .map(|(name, _)| name.to_ascii_lowercase().replace('_', "-"))
            .join("|");
        let unknown = self.bits() & !Flags::all().bits();
        if unknown != 0 {
            write!(f, "{names}|{unknown:#x}")
        } else {
            f.write_str(&names)
        }
    }
}

/// Logical level of a pin, after any active-low inversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum State {
    Active,
    #[default]
    Inactive,
}

impl State {
    pub const fn new(is_active: bool) -> Self {
        if is_active {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub const fn is_active(&self) -> bool {
        matches!(self, State::Active)
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        State::new(value)
    }
}

impl From<State> for bool {
    fn from(value: State) -> Self {
        value.is_active()
    }
}

impl std::ops::Not for State {
    type Output = State;

    fn not(self) -> State {
        State::new(!self.is_active())
    }
}

/// A mode change: mode, flags and the initial output level.
///
/// Anything from a bare [`Mode`] up to `(Mode, Flags, State)` converts into
/// one, with missing parts defaulting to no flags and [`State::Inactive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest {
    pub mode: Mode,
    pub flags: Flags,
    pub initial: State,
}

impl ModeRequest {
    pub const fn new(mode: Mode) -> Self {
        Self {
            mode,
            flags: Flags::empty(),
            initial: State::Inactive,
        }
    }

    pub const fn with_flags(self, flags: Flags) -> Self {
        Self { flags, ..self }
    }

    pub const fn with_initial(self, initial: State) -> Self {
        Self { initial, ..self }
    }
}

impl From<Mode> for ModeRequest {
    fn from(mode: Mode) -> Self {
        ModeRequest::new(mode)
    }
}

impl From<(Mode, Flags)> for ModeRequest {
    fn from((mode, flags): (Mode, Flags)) -> Self {
        ModeRequest::new(mode).with_flags(flags)
    }
}

impl From<(Mode, State)> for ModeRequest {
    fn from((mode, initial): (Mode, State)) -> Self {
        ModeRequest::new(mode).with_initial(initial)
    }
}

impl From<(Mode, Flags, State)> for ModeRequest {
    fn from((mode, flags, initial): (Mode, Flags, State)) -> Self {
        ModeRequest::new(mode).with_flags(flags).with_initial(initial)
    }
}
