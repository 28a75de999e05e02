// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Blinks a pin through software (or hardware) PWM.

use gpio_pins::{Chip, ChipOptions, Mode, Registry};
use quicli::prelude::*;
use std::thread::sleep;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// The chip identifier (e.g. cdev:0, pigpio, sim:4)
    chip: String,
    /// The pin position on the provided chip
    pin: usize,
    /// Period in milliseconds
    period_ms: u64,
    /// Duration over which to blink in milliseconds
    duration_ms: u64,
    /// Duty cycle in percent
    #[structopt(long, default_value = "50")]
    duty: f64,
    /// Consumer label reported to the kernel
    #[structopt(long, default_value = "blinky")]
    consumer: String,
}

fn do_main(args: Cli) -> anyhow::Result<()> {
    let options = ChipOptions::new().with_consumer(args.consumer);
    let mut chip = Chip::open_with(&Registry::default(), &args.chip, &options)?;
    let pin = chip.pin_mut(args.pin)?;

    pin.set_mode(Mode::Pwm)?;
    pin.set_period(Duration::from_millis(args.period_ms))?;
    pin.set_duty_cycle(args.duty)?;
    println!(
        "{} {}: {:?} period, {:?} pulse",
        args.chip,
        pin.name(),
        pin.period(),
        pin.pulse()
    );

    sleep(Duration::from_millis(args.duration_ms));

    if let Some(e) = pin.take_pwm_error() {
        return Err(e.into());
    }
    pin.detach()?;
    Ok(())
}

fn main() -> CliResult {
    let args = Cli::from_args();
    do_main(args).or_else(|e| {
        error!("{:?}", e);
        Ok(())
    })
}
