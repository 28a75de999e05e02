// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Backends over the first generation character-device uAPI.
//!
//! `gpiod` requests every line through a line handle and has no edge
//! notification. `chip` requests inputs through the line-event API instead,
//! so state-change callbacks fire on both edges.

use std::fs::File;
use std::sync::Arc;

use nix::errno::Errno;

use super::cdev::{self, ChipDevice, Waker};
use crate::backend::{
    Backend, Capabilities, ChipInfo, ChipOptions, Direction, Edge, EdgeKind, EdgeWait, LineHandle,
    LineInfo, LineRequest,
};
use crate::errors::{Error, Result};
use crate::types::{Flags, Mode, State};
use crate::uapi::v1::{
    self, GPIOEVENT_REQUEST_FLAGS, GPIOHANDLE_REQUEST_FLAGS, GPIOLINE_FLAG,
};

pub const GPIOD: &str = "gpiod";
pub const CHIP: &str = "chip";

const MODES: &[Mode] = &[Mode::Input, Mode::Output, Mode::Pwm];

/// Opens `/dev/gpiochipN` for the handle-only `gpiod` backend.
pub fn open_gpiod(param: &str, options: &ChipOptions) -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(V1Chip {
        dev: ChipDevice::open(GPIOD, param, options)?,
        edges: false,
    }))
}

/// Opens `/dev/gpiochipN` for the `chip` backend, with edge events on inputs.
pub fn open_chip(param: &str, options: &ChipOptions) -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(V1Chip {
        dev: ChipDevice::open(CHIP, param, options)?,
        edges: true,
    }))
}

#[derive(Debug)]
struct V1Chip {
    dev: ChipDevice,
    edges: bool,
}

fn request_flags(request: &LineRequest) -> GPIOHANDLE_REQUEST_FLAGS {
    let mut f = match request.direction {
        Direction::Input => GPIOHANDLE_REQUEST_FLAGS::INPUT,
        Direction::Output => GPIOHANDLE_REQUEST_FLAGS::OUTPUT,
    };
    f.set(
        GPIOHANDLE_REQUEST_FLAGS::ACTIVE_LOW,
        request.flags.contains(Flags::ACTIVE_LOW),
    );
    f.set(
        GPIOHANDLE_REQUEST_FLAGS::OPEN_DRAIN,
        request.flags.contains(Flags::OPEN_DRAIN),
    );
    f.set(
        GPIOHANDLE_REQUEST_FLAGS::OPEN_SOURCE,
        request.flags.contains(Flags::OPEN_SOURCE),
    );
    f
}

fn line_flags(kernel: GPIOLINE_FLAG) -> Flags {
    let mut f = Flags::empty();
    f.set(Flags::ACTIVE_LOW, kernel.contains(GPIOLINE_FLAG::ACTIVE_LOW));
    f.set(Flags::OPEN_DRAIN, kernel.contains(GPIOLINE_FLAG::OPEN_DRAIN));
    f.set(Flags::OPEN_SOURCE, kernel.contains(GPIOLINE_FLAG::OPEN_SOURCE));
    f.set(Flags::PULL_UP, kernel.contains(GPIOLINE_FLAG::BIAS_PULL_UP));
    f.set(Flags::PULL_DOWN, kernel.contains(GPIOLINE_FLAG::BIAS_PULL_DOWN));
    f
}

impl Backend for V1Chip {
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
        let mut info = v1::gpioline_info::new(offset);
        // SAFETY: `info` is a properly sized `gpioline_info`
        unsafe { v1::gpio_get_lineinfo(self.dev.raw_fd(), &mut info) }
            .map_err(|e| Error::resource(self.dev.line_target(offset), "get line info", e))?;

        let consumer = cdev::name_to_string(info.consumer);
        Ok(LineInfo {
            name: cdev::name_to_string(info.name),
            direction: Some(if info.flags.contains(GPIOLINE_FLAG::IS_OUT) {
                Direction::Output
            } else {
                Direction::Input
            }),
            flags: line_flags(info.flags),
            used: info.flags.contains(GPIOLINE_FLAG::KERNEL),
            consumer: (!consumer.is_empty()).then_some(consumer),
        })
    }

    fn capabilities(&self, _offset: u32) -> Capabilities {
        Capabilities {
            modes: MODES,
            input_flags: Flags::ACTIVE_LOW,
            output_flags: Flags::OUTPUT_FLAGS,
            hardware_pwm: false,
        }
    }

    fn open_line(&self, offset: u32, request: &LineRequest) -> Result<Box<dyn LineHandle>> {
        let target = self.dev.line_target(offset);

        if self.edges && request.direction == Direction::Input {
            let mut req = v1::gpioevent_request::zeroed();
            req.lineoffset = offset;
            req.handleflags = request_flags(request);
            req.eventflags = GPIOEVENT_REQUEST_FLAGS::BOTH_EDGES;
            req.consumer_label = self.dev.consumer();

            // SAFETY: `req` is a properly sized `gpioevent_request`
            unsafe { v1::gpio_get_lineevent(self.dev.raw_fd(), &mut req) }
                .map_err(|e| Error::resource(&target, "request line events", e))?;

            let file = cdev::line_file(req.fd);
            let waker = Waker::new().map_err(|e| Error::resource(&target, "create waker", e))?;
            return Ok(Box::new(EventLine {
                file,
                waker,
                target,
            }));
        }

        let mut req = v1::gpiohandle_request::zeroed();
        req.lineoffsets[0] = offset;
        req.lines = 1;
        req.flags = request_flags(request);
        req.default_values[0] = u8::from(request.initial.is_active());
        req.consumer_label = self.dev.consumer();

        // SAFETY: `req` is a properly sized `gpiohandle_request`
        unsafe { v1::gpio_get_linehandle(self.dev.raw_fd(), &mut req) }
            .map_err(|e| Error::resource(&target, "request line", e))?;

        Ok(Box::new(HandleLine {
            file: cdev::line_file(req.fd),
            target,
        }))
    }
}

fn get_value(file: &File, target: &str) -> Result<State> {
    use std::os::fd::AsRawFd;

    let mut data = v1::gpiohandle_data::zeroed();
    // SAFETY: `data` is a properly sized `gpiohandle_data`
    unsafe { v1::gpiohandle_get_line_values(file.as_raw_fd(), &mut data) }
        .map_err(|e| Error::resource(target, "get pin state", e))?;
    Ok(State::new(data.values[0] != 0))
}

/// A line requested through `GPIO_GET_LINEHANDLE_IOCTL`.
#[derive(Debug)]
struct HandleLine {
    file: File,
    target: String,
}

impl LineHandle for HandleLine {
    fn read(&self) -> Result<State> {
        get_value(&self.file, &self.target)
    }

    fn write(&self, state: State) -> Result<()> {
        use std::os::fd::AsRawFd;

        let mut data = v1::gpiohandle_data::zeroed();
        data.values[0] = u8::from(state.is_active());
        // SAFETY: `data` is a properly sized `gpiohandle_data`
        unsafe { v1::gpiohandle_set_line_values(self.file.as_raw_fd(), &mut data) }
            .map_err(|e| Error::resource(&self.target, "set pin state", e))?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        cdev::close_line(self.file, self.target)
    }
}

/// An input requested through `GPIO_GET_LINEEVENT_IOCTL`.
#[derive(Debug)]
struct EventLine {
    file: File,
    waker: Waker,
    target: String,
}

impl LineHandle for EventLine {
    fn read(&self) -> Result<State> {
        get_value(&self.file, &self.target)
    }

    fn write(&self, _state: State) -> Result<()> {
        Err(Error::resource(&self.target, "set pin state", Errno::EPERM))
    }

    fn supports_edges(&self) -> bool {
        true
    }

    fn await_edge(&self) -> Result<EdgeWait> {
        loop {
            let readable = cdev::wait_readable(&self.file, &self.waker)
                .map_err(|e| Error::resource(&self.target, "wait for edge", e))?;
            if !readable {
                return Ok(EdgeWait::Closed);
            }

            let buf = cdev::read_event::<{ v1::GPIOEVENT_DATA_SIZE }>(&self.file)
                .map_err(|e| Error::resource(&self.target, "read edge", e))?;
            let (timestamp_ns, id) = v1::parse_gpioevent_data(&buf);
            let kind = match id {
                v1::GPIOEVENT_EVENT_RISING_EDGE => EdgeKind::Rising,
                v1::GPIOEVENT_EVENT_FALLING_EDGE => EdgeKind::Falling,
                _ => continue,
            };
            return Ok(EdgeWait::Edge(Edge {
                kind,
                timestamp_ns: Some(timestamp_ns),
            }));
        }
    }

    fn wake(&self) {
        self.waker.wake();
    }

    fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        cdev::close_line(this.file, this.target)
    }
}
