// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Backend over the second generation character-device uAPI.
//!
//! Every line is a `GPIO_V2_GET_LINE_IOCTL` request. Inputs always ask for
//! both edges, outputs pass their initial level as an output-values
//! attribute so the line never glitches through the wrong level.

use std::fs::File;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use super::cdev::{self, ChipDevice, Waker};
use crate::backend::{
    Backend, Capabilities, ChipInfo, ChipOptions, Direction, Edge, EdgeKind, EdgeWait, LineHandle,
    LineInfo, LineRequest,
};
use crate::errors::{Error, Result};
use crate::types::{Flags, Mode, State};
use crate::uapi::v2::{self, LineFlags};

pub const CDEV: &str = "cdev";

const MODES: &[Mode] = &[Mode::Input, Mode::Output, Mode::Pwm];

pub fn open(param: &str, options: &ChipOptions) -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(V2Chip {
        dev: ChipDevice::open(CDEV, param, options)?,
    }))
}

#[derive(Debug)]
struct V2Chip {
    dev: ChipDevice,
}

const fn build_flags(request: &LineRequest) -> LineFlags {
    let flags = match request.direction {
        Direction::Input => LineFlags::INPUT
            .union(LineFlags::EDGE_RISING)
            .union(LineFlags::EDGE_FALLING),
        Direction::Output => LineFlags::OUTPUT,
    };

    let want = request.flags;
    let flags = if want.contains(Flags::ACTIVE_LOW) {
        flags.union(LineFlags::ACTIVE_LOW)
    } else {
        flags
    };

    let flags = if want.contains(Flags::PULL_UP) {
        flags.union(LineFlags::BIAS_PULL_UP)
    } else if want.contains(Flags::PULL_DOWN) {
        flags.union(LineFlags::BIAS_PULL_DOWN)
    } else {
        flags
    };

    if want.contains(Flags::OPEN_DRAIN) {
        flags.union(LineFlags::OPEN_DRAIN)
    } else if want.contains(Flags::OPEN_SOURCE) {
        flags.union(LineFlags::OPEN_SOURCE)
    } else {
        flags
    }
}

fn line_flags(kernel: LineFlags) -> Flags {
    let mut f = Flags::empty();
    f.set(Flags::ACTIVE_LOW, kernel.contains(LineFlags::ACTIVE_LOW));
    f.set(Flags::OPEN_DRAIN, kernel.contains(LineFlags::OPEN_DRAIN));
    f.set(Flags::OPEN_SOURCE, kernel.contains(LineFlags::OPEN_SOURCE));
    f.set(Flags::PULL_UP, kernel.contains(LineFlags::BIAS_PULL_UP));
    f.set(Flags::PULL_DOWN, kernel.contains(LineFlags::BIAS_PULL_DOWN));
    f
}

impl Backend for V2Chip {
    fn kind(&self) -> &str {
        self.dev.kind()
    }

    fn id(&self) -> &str {
        self.dev.id()
    }

    fn chip_info(&self) -> Result<ChipInfo> {
        self.dev.chip_info()
    }

    fn line_info(&self, offset: u32) -> Result<LineInfo> {
        let mut info = v2::gpio_line_info::new(offset);
        // SAFETY: `info` is a properly sized `gpio_v2_line_info`
        unsafe { v2::gpio_get_line_info(self.dev.raw_fd(), &mut info) }
            .map_err(|e| Error::resource(self.dev.line_target(offset), "get line info", e))?;

        let direction = if info.flags.contains(LineFlags::OUTPUT) {
            Some(Direction::Output)
        } else if info.flags.contains(LineFlags::INPUT) {
            Some(Direction::Input)
        } else {
            None
        };
        let consumer = cdev::name_to_string(info.consumer);

        Ok(LineInfo {
            name: cdev::name_to_string(info.name),
            direction,
            flags: line_flags(info.flags),
            used: info.flags.contains(LineFlags::USED),
            consumer: (!consumer.is_empty()).then_some(consumer),
        })
    }

    fn capabilities(&self, _offset: u32) -> Capabilities {
        Capabilities {
            modes: MODES,
            input_flags: Flags::INPUT_FLAGS,
            output_flags: Flags::OUTPUT_FLAGS,
            hardware_pwm: false,
        }
    }

    fn open_line(&self, offset: u32, request: &LineRequest) -> Result<Box<dyn LineHandle>> {
        let target = self.dev.line_target(offset);

        let mut req = v2::gpio_line_request::zeroed();
        req.offsets[0] = offset;
        req.num_lines = 1;
        req.consumer = self.dev.consumer();
        req.config.flags = build_flags(request);
        if request.direction == Direction::Output {
            req.config
                .push_output_values(u64::from(request.initial.is_active()), 1);
        }

        // SAFETY: `req` is a properly sized `gpio_v2_line_request`
        unsafe { v2::gpio_get_line(self.dev.raw_fd(), &mut req) }
            .map_err(|e| Error::resource(&target, "request line", e))?;

        let file = cdev::line_file(req.fd);
        let waker = match request.direction {
            Direction::Input => Some(
                Waker::new().map_err(|e| Error::resource(&target, "create waker", e))?,
            ),
            Direction::Output => None,
        };

        Ok(Box::new(RequestLine {
            file,
            waker,
            target,
        }))
    }
}

/// One line of a v2 line request. Inputs carry a waker for edge waits.
#[derive(Debug)]
struct RequestLine {
    file: File,
    waker: Option<Waker>,
    target: String,
}

impl LineHandle for RequestLine {
    fn read(&self) -> Result<State> {
        let mut values = v2::gpio_line_values { bits: 0, mask: 1 };
        // SAFETY: `values` is a properly sized `gpio_v2_line_values`
        unsafe { v2::gpio_line_get_values(self.file.as_raw_fd(), &mut values) }
            .map_err(|e| Error::resource(&self.target, "get pin state", e))?;
        Ok(State::new(values.bits & 1 != 0))
    }

    fn write(&self, state: State) -> Result<()> {
        let mut values = v2::gpio_line_values {
            bits: u64::from(state.is_active()),
            mask: 1,
        };
        // SAFETY: `values` is a properly sized `gpio_v2_line_values`
        unsafe { v2::gpio_line_set_values(self.file.as_raw_fd(), &mut values) }
            .map_err(|e| Error::resource(&self.target, "set pin state", e))?;
        Ok(())
    }

    fn supports_edges(&self) -> bool {
        self.waker.is_some()
    }

    fn await_edge(&self) -> Result<EdgeWait> {
        let Some(waker) = &self.waker else {
            return Ok(EdgeWait::Closed);
        };

        loop {
            let readable = cdev::wait_readable(&self.file, waker)
                .map_err(|e| Error::resource(&self.target, "wait for edge", e))?;
            if !readable {
                return Ok(EdgeWait::Closed);
            }

            let buf = cdev::read_event::<{ v2::GPIO_LINE_EVENT_SIZE }>(&self.file)
                .map_err(|e| Error::resource(&self.target, "read edge", e))?;
            let event = v2::gpio_line_event::from_bytes(&buf);
            let kind = match event.id {
                v2::GPIO_V2_LINE_EVENT_RISING_EDGE => EdgeKind::Rising,
                v2::GPIO_V2_LINE_EVENT_FALLING_EDGE => EdgeKind::Falling,
                _ => continue,
            };
            return Ok(EdgeWait::Edge(Edge {
                kind,
                timestamp_ns: Some(event.timestamp_ns),
            }));
        }
    }

    fn wake(&self) {
        if let Some(waker) = &self.waker {
            waker.wake();
        }
    }

    fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        cdev::close_line(this.file, this.target)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn input_requests_both_edges() {
        let request = LineRequest {
            direction: Direction::Input,
            flags: Flags::PULL_UP | Flags::ACTIVE_LOW,
            initial: State::Inactive,
        };
        assert_eq!(
            build_flags(&request),
            LineFlags::INPUT
                | LineFlags::EDGE_RISING
                | LineFlags::EDGE_FALLING
                | LineFlags::ACTIVE_LOW
                | LineFlags::BIAS_PULL_UP
        );
    }

    #[test]
    fn output_drive() {
        let request = LineRequest {
            direction: Direction::Output,
            flags: Flags::OPEN_SOURCE,
            initial: State::Active,
        };
        assert_eq!(
            build_flags(&request),
            LineFlags::OUTPUT | LineFlags::OPEN_SOURCE
        );
    }

    #[test]
    fn kernel_line_flags() {
        let kernel = LineFlags::USED | LineFlags::INPUT | LineFlags::BIAS_PULL_DOWN;
        assert_eq!(line_flags(kernel), Flags::PULL_DOWN);
    }
}
