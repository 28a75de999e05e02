// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Clone of functionality of linux/tools/gpio/lsgpio.c, for any backend.

use gpio_pins::backend::Direction;
use gpio_pins::*;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// Chip identifiers to list; defaults to every /dev/gpiochip* device
    chips: Vec<String>,
}

fn main() {
    let args = Cli::from_args();
    let ids = if args.chips.is_empty() {
        match chip_ids("cdev") {
            Ok(ids) => ids,
            Err(e) => {
                println!("Failed to list chips: {}", e);
                return;
            }
        }
    } else {
        args.chips
    };

    for id in ids {
        let chip = match Chip::open(&id) {
            Ok(chip) => chip,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        println!(
            "GPIO chip: \"{}\", \"{}\", {} GPIO Lines",
            id,
            chip.label(),
            chip.pin_count()
        );
        for pin in chip.pins() {
            let info = pin.info();
            let mut flags = vec![];

            if info.used {
                flags.push("used");
            }
            if info.direction == Some(Direction::Output) {
                flags.push("output");
            }
            if info.flags.contains(Flags::ACTIVE_LOW) {
                flags.push("active-low");
            }
            if info.flags.contains(Flags::OPEN_DRAIN) {
                flags.push("open-drain");
            }
            if info.flags.contains(Flags::OPEN_SOURCE) {
                flags.push("open-source");
            }
            if info.flags.contains(Flags::PULL_UP) {
                flags.push("pull-up");
            }
            if info.flags.contains(Flags::PULL_DOWN) {
                flags.push("pull-down");
            }

            let usage = if !flags.is_empty() {
                format!("[{}]", flags.join(" "))
            } else {
                "".to_owned()
            };

            println!(
                "\tline {lineno:>3}: {name} {consumer} {usage}",
                lineno = pin.position(),
                name = if info.name.is_empty() { "unnamed" } else { &info.name },
                consumer = info.consumer.as_deref().unwrap_or("unused"),
                usage = usage,
            );
        }
        println!();
    }
}
