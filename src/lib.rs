// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The `gpio-pins` crate drives individual GPIO pins through interchangeable
//! backends: the Linux [GPIO character device
//! ABI](https://www.kernel.org/doc/Documentation/ABI/testing/gpio-cdev) in
//! its v1 and v2 flavours, the pigpio daemon, and an in-memory simulator.
//!
//! A [`Chip`] is opened by identifier, `"<backend>[:<param>]"`:
//!
//! | identifier | backend |
//! |------------|---------|
//! | `gpiod:N`  | `/dev/gpiochipN`, v1 line handles, no edge notification |
//! | `chip:N`   | `/dev/gpiochipN`, v1 line handles and line events |
//! | `cdev:N`   | `/dev/gpiochipN`, v2 line requests |
//! | `pigpio[:host[:port]]` | pigpio daemon, `PIGPIO_ADDR`/`PIGPIO_PORT` or `localhost:8888` |
//! | `sim[:N]`  | `N` simulated lines |
//!
//! Each pin is [`Mode::Detached`] until given a mode. Outputs can be driven
//! to a [`State`], inputs report edges to callbacks, and PWM pins follow a
//! [`Waveform`], in hardware where the backend has it and from a driver
//! thread otherwise.
//!
//! # Examples
//!
//! Blink an LED at 2 Hz while mirroring a button onto the log:
//!
//! ```no_run
//! use std::time::Duration;
//! use gpio_pins::{Chip, Flags, Mode};
//!
//! # fn main() -> gpio_pins::Result<()> {
//! let mut chip = Chip::open("cdev:0")?;
//!
//! let led = chip.pin_mut(17)?;
//! led.set_mode(Mode::Pwm)?;
//! led.set_period(Duration::from_millis(500))?;
//! led.set_duty_cycle(50.0)?;
//!
//! let button = chip.pin_mut(27)?;
//! button.set_mode((Mode::Input, Flags::PULL_UP))?;
//! button.on_state_changed(|state| println!("button {:?}", state));
//!
//! std::thread::sleep(Duration::from_secs(10));
//! # Ok(()) }
//! ```
//!
//! Tests and hardware-free programs can use the simulator, which also lets
//! the caller drive inputs:
//!
//! ```
//! use gpio_pins::backend::sim::SimChip;
//! use gpio_pins::{Chip, ChipOptions, Mode, State};
//!
//! # fn main() -> gpio_pins::Result<()> {
//! let sim = SimChip::new(4);
//! let mut chip = Chip::from_backend(sim.clone(), &ChipOptions::default())?;
//! chip.pin_mut(0)?.set_mode((Mode::Output, State::Active))?;
//! assert!(sim.level(0));
//! # Ok(()) }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backend;
pub mod chip;
pub mod duty;
mod errors;
mod events;
pub mod fixed_str;
pub mod notify;
pub mod pin;
mod soft_pwm;
pub mod types;

#[allow(non_camel_case_types)]
pub mod uapi;

pub use backend::{Backend, ChipOptions, Registry};
pub use chip::{chip_ids, Chip};
pub use duty::Waveform;
pub use errors::{Error, ErrorKind, Result};
pub use notify::CallId;
pub use pin::Pin;
pub use types::{Flags, Mode, ModeRequest, State};
