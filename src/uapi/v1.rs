// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! First generation uAPI: line handles (`GPIO_GET_LINEHANDLE_IOCTL`) and
//! line events (`GPIO_GET_LINEEVENT_IOCTL`).

use bitflags::bitflags;
use nix::ioctl_readwrite;

use super::GPIO_MAX_NAME_SIZE;

pub const GPIOHANDLES_MAX: usize = 64;

bitflags! {
    /// Informational Flags
    ///
    /// Maps to kernel [`GPIOLINE_FLAG_*`] flags.
    ///
    /// [`GPIOLINE_FLAG_*`]: https://github.com/torvalds/linux/blob/v5.19/include/uapi/linux/gpio.h
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GPIOLINE_FLAG: u32 {
        const KERNEL = (1 << 0);
        const IS_OUT = (1 << 1);
        const ACTIVE_LOW = (1 << 2);
        const OPEN_DRAIN = (1 << 3);
        const OPEN_SOURCE = (1 << 4);
        const BIAS_PULL_UP = (1 << 5);
        const BIAS_PULL_DOWN = (1 << 6);
        const BIAS_DISABLE = (1 << 7);
    }
}

/// Information about a certain GPIO line
#[repr(C)]
pub struct gpioline_info {
    /// The local offset on this GPIO device, fill this in when
    /// requesting the line information from the kernel.
    pub line_offset: u32,
    /// various flags for this line
    pub flags: GPIOLINE_FLAG,
    /// the name of this GPIO line, may be empty
    pub name: [u8; GPIO_MAX_NAME_SIZE],
    /// a functional name for the consumer of this GPIO line as set by
    /// whatever is using it, empty if there is no current user
    pub consumer: [u8; GPIO_MAX_NAME_SIZE],
}

impl gpioline_info {
    pub const fn new(line_offset: u32) -> Self {
        Self {
            line_offset,
            flags: GPIOLINE_FLAG::empty(),
            name: [0; GPIO_MAX_NAME_SIZE],
            consumer: [0; GPIO_MAX_NAME_SIZE],
        }
    }
}

bitflags! {
    /// Line Request Flags
    ///
    /// Maps to kernel [`GPIOHANDLE_REQUEST_*`] flags.
    ///
    /// [`GPIOHANDLE_REQUEST_*`]: https://github.com/torvalds/linux/blob/v5.19/include/uapi/linux/gpio.h#L58
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GPIOHANDLE_REQUEST_FLAGS: u32 {
        const INPUT = (1 << 0);
        const OUTPUT = (1 << 1);
        const ACTIVE_LOW = (1 << 2);
        const OPEN_DRAIN = (1 << 3);
        const OPEN_SOURCE = (1 << 4);
        const BIAS_PULL_UP = (1 << 5);
        const BIAS_PULL_DOWN = (1 << 6);
        const BIAS_DISABLE = (1 << 7);
    }
}

/// Information about a GPIO handle request
#[repr(C)]
pub struct gpiohandle_request {
    /// an array of desired lines, specified by offset index for the associated GPIO device
    pub lineoffsets: [u32; GPIOHANDLES_MAX],
    /// desired flags for the desired GPIO lines.
    pub flags: GPIOHANDLE_REQUEST_FLAGS,
    /// if [GPIOHANDLE_REQUEST_FLAGS::OUTPUT] is set for a requested
    /// line, this specifies the default output value, should be 0 (low) or
    /// 1 (high), anything else than 0 or 1 will be interpreted as 1 (high)
    pub default_values: [u8; GPIOHANDLES_MAX],
    /// a desired consumer label for the selected GPIO line(s)
    pub consumer_label: [u8; GPIO_MAX_NAME_SIZE],
    /// number of lines requested in this request, set to 1 to request a single line
    pub lines: u32,
    /// if successful this field will contain a valid anonymous file handle
    pub fd: libc::c_int,
}

impl gpiohandle_request {
    pub const fn zeroed() -> Self {
        Self {
            lineoffsets: [0; GPIOHANDLES_MAX],
            flags: GPIOHANDLE_REQUEST_FLAGS::empty(),
            default_values: [0; GPIOHANDLES_MAX],
            consumer_label: [0; GPIO_MAX_NAME_SIZE],
            lines: 0,
            fd: 0,
        }
    }
}

/// Values on a GPIO handle; only index 0 is used for single-line handles.
#[repr(C)]
pub struct gpiohandle_data {
    pub values: [u8; GPIOHANDLES_MAX],
}

impl gpiohandle_data {
    pub const fn zeroed() -> Self {
        Self {
            values: [0; GPIOHANDLES_MAX],
        }
    }
}

bitflags! {
    /// Event request flags
    ///
    /// Maps to kernel [`GPIOEVENT_REQUEST_*`] flags.
    ///
    /// [`GPIOEVENT_REQUEST_*`]: https://github.com/torvalds/linux/blob/v5.19/include/uapi/linux/gpio.h
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GPIOEVENT_REQUEST_FLAGS: u32 {
        const RISING_EDGE = (1 << 0);
        const FALLING_EDGE = (1 << 1);
        const BOTH_EDGES = Self::RISING_EDGE.bits() | Self::FALLING_EDGE.bits();
    }
}

/// Information about a GPIO event request
#[repr(C)]
pub struct gpioevent_request {
    /// the desired line to subscribe to events from
    pub lineoffset: u32,
    /// desired handle flags for the desired GPIO line
    pub handleflags: GPIOHANDLE_REQUEST_FLAGS,
    /// desired flags for the desired GPIO event line
    pub eventflags: GPIOEVENT_REQUEST_FLAGS,
    /// a desired consumer label for the selected GPIO line(s)
    pub consumer_label: [u8; GPIO_MAX_NAME_SIZE],
    /// if successful this field will contain a valid anonymous file handle
    pub fd: libc::c_int,
}

impl gpioevent_request {
    pub const fn zeroed() -> Self {
        Self {
            lineoffset: 0,
            handleflags: GPIOHANDLE_REQUEST_FLAGS::empty(),
            eventflags: GPIOEVENT_REQUEST_FLAGS::empty(),
            consumer_label: [0; GPIO_MAX_NAME_SIZE],
            fd: 0,
        }
    }
}

pub const GPIOEVENT_EVENT_RISING_EDGE: u32 = 0x01;
pub const GPIOEVENT_EVENT_FALLING_EDGE: u32 = 0x02;

/// Size of `struct gpioevent_data` as read from an event fd: a `u64`
/// timestamp followed by a `u32` id, padded to 8 bytes.
pub const GPIOEVENT_DATA_SIZE: usize = 16;

/// Decodes `struct gpioevent_data` into `(timestamp_ns, id)`.
pub fn parse_gpioevent_data(buf: &[u8; GPIOEVENT_DATA_SIZE]) -> (u64, u32) {
    let mut ts = [0; 8];
    ts.copy_from_slice(&buf[0..8]);
    let mut id = [0; 4];
    id.copy_from_slice(&buf[8..12]);
    (u64::from_ne_bytes(ts), u32::from_ne_bytes(id))
}

ioctl_readwrite!(gpio_get_lineinfo, 0xB4, 0x02, gpioline_info);
ioctl_readwrite!(gpio_get_linehandle, 0xB4, 0x03, gpiohandle_request);
ioctl_readwrite!(gpio_get_lineevent, 0xB4, 0x04, gpioevent_request);

ioctl_readwrite!(gpiohandle_get_line_values, 0xB4, 0x08, gpiohandle_data);
ioctl_readwrite!(gpiohandle_set_line_values, 0xB4, 0x09, gpiohandle_data);
