// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Second generation uAPI: line requests (`GPIO_V2_GET_LINE_IOCTL`).

use bitflags::bitflags;
use nix::ioctl_readwrite;

use super::GPIO_MAX_NAME_SIZE;

pub const GPIO_LINES_MAX: usize = 64;
pub const GPIO_LINE_NUM_ATTRS_MAX: usize = 10;

bitflags! {
    /// Informational Flags
    ///
    /// Maps to kernel [`GPIO_V2_LINE_FLAG_*`] flags.
    ///
    /// [`GPIO_V2_LINE_FLAG_*`]: https://github.com/torvalds/linux/blob/v5.19/include/uapi/linux/gpio.h
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct LineFlags: u64 {
        const USED = (1 << 0);
        const ACTIVE_LOW = (1 << 1);
        const INPUT = (1 << 2);
        const OUTPUT = (1 << 3);
        const EDGE_RISING = (1 << 4);
        const EDGE_FALLING = (1 << 5);
        const OPEN_DRAIN = (1 << 6);
        const OPEN_SOURCE = (1 << 7);
        const BIAS_PULL_UP = (1 << 8);
        const BIAS_PULL_DOWN = (1 << 9);
        const BIAS_DISABLED = (1 << 10);
        const EVENT_CLOCK_REALTIME = (1 << 11);
        const EVENT_CLOCK_HTE = (1 << 12);
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_values {
    pub(crate) bits: u64,
    pub(crate) mask: u64,
}

pub(crate) const GPIO_V2_LINE_ATTR_ID_FLAGS: u32 = 1;
pub(crate) const GPIO_V2_LINE_ATTR_ID_OUTPUT_VALUES: u32 = 2;
pub(crate) const GPIO_V2_LINE_ATTR_ID_DEBOUNCE: u32 = 3;

/// a configurable attribute of a line
#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_attribute {
    /// attribute identifier
    pub(crate) id: u32,
    /// reserved for future use and must be zero filled
    pub(crate) _padding: u32,
    /// A tagged union when combined with `id`
    pub(crate) attribute: gpio_line_attribute_union,
}

impl gpio_line_attribute {
    pub(crate) const fn zeroed() -> Self {
        Self {
            id: 0,
            _padding: 0,
            attribute: gpio_line_attribute_union { values: 0 },
        }
    }
}

impl core::fmt::Debug for gpio_line_attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // SAFETY: every variant is plain old data and `id` selects the live one
        let value = unsafe {
            match self.id {
                GPIO_V2_LINE_ATTR_ID_FLAGS => &self.attribute.flags as &dyn core::fmt::Debug,
                GPIO_V2_LINE_ATTR_ID_OUTPUT_VALUES => {
                    &self.attribute.values as &dyn core::fmt::Debug
                }
                GPIO_V2_LINE_ATTR_ID_DEBOUNCE => {
                    &self.attribute.debounce_period_us as &dyn core::fmt::Debug
                }
                _ => &"unknown line attribute" as &dyn core::fmt::Debug,
            }
        };
        f.debug_struct("gpio_line_attribute")
            .field("id", &self.id)
            .field("attribute", value)
            .finish()
    }
}

#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) union gpio_line_attribute_union {
    /// flags overriding the request-wide flags for the masked lines
    pub(crate) flags: LineFlags,
    /// bitmap of output values, bit N being `gpio_line_request.offsets[N]`
    pub(crate) values: u64,
    /// debounce period, in microseconds
    pub(crate) debounce_period_us: u32,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_config_attribute {
    pub(crate) attr: gpio_line_attribute,
    pub(crate) mask: u64,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_config {
    pub(crate) flags: LineFlags,
    pub(crate) num_attrs: u32,
    _padding: [u32; 5],
    pub(crate) attrs: [gpio_line_config_attribute; GPIO_LINE_NUM_ATTRS_MAX],
}

impl gpio_line_config {
    pub const fn zeroed() -> Self {
        Self {
            flags: LineFlags::empty(),
            num_attrs: 0,
            _padding: [0; 5],
            attrs: [gpio_line_config_attribute {
                attr: gpio_line_attribute::zeroed(),
                mask: 0,
            }; GPIO_LINE_NUM_ATTRS_MAX],
        }
    }

    /// Appends an output-values attribute covering the lines in `mask`.
    pub(crate) fn push_output_values(&mut self, bits: u64, mask: u64) {
        let idx = self.num_attrs as usize;
        if idx < GPIO_LINE_NUM_ATTRS_MAX {
            self.attrs[idx] = gpio_line_config_attribute {
                attr: gpio_line_attribute {
                    id: GPIO_V2_LINE_ATTR_ID_OUTPUT_VALUES,
                    _padding: 0,
                    attribute: gpio_line_attribute_union { values: bits },
                },
                mask,
            };
            self.num_attrs += 1;
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_request {
    pub(crate) offsets: [u32; GPIO_LINES_MAX],
    pub(crate) consumer: [u8; GPIO_MAX_NAME_SIZE],
    pub(crate) config: gpio_line_config,
    pub(crate) num_lines: u32,
    pub(crate) event_buffer_size: u32,
    _padding: [u32; 5],
    pub(crate) fd: std::os::fd::RawFd,
}

impl gpio_line_request {
    pub const fn zeroed() -> Self {
        Self {
            offsets: [0; GPIO_LINES_MAX],
            consumer: [0; GPIO_MAX_NAME_SIZE],
            config: gpio_line_config::zeroed(),
            num_lines: 0,
            event_buffer_size: 0,
            _padding: [0; 5],
            fd: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_info {
    pub(crate) name: [u8; GPIO_MAX_NAME_SIZE],
    pub(crate) consumer: [u8; GPIO_MAX_NAME_SIZE],
    pub(crate) offset: u32,
    pub(crate) num_attrs: u32,
    pub(crate) flags: LineFlags,
    pub(crate) attrs: [gpio_line_attribute; GPIO_LINE_NUM_ATTRS_MAX],
    pub(crate) _padding: [u32; 4],
}

impl gpio_line_info {
    pub const fn new(offset: u32) -> Self {
        Self {
            name: [0; GPIO_MAX_NAME_SIZE],
            consumer: [0; GPIO_MAX_NAME_SIZE],
            offset,
            num_attrs: 0,
            flags: LineFlags::empty(),
            attrs: [gpio_line_attribute::zeroed(); GPIO_LINE_NUM_ATTRS_MAX],
            _padding: [0; 4],
        }
    }
}

pub(crate) const GPIO_V2_LINE_EVENT_RISING_EDGE: u32 = 1;
pub(crate) const GPIO_V2_LINE_EVENT_FALLING_EDGE: u32 = 2;

/// Size of `struct gpio_v2_line_event` as read from a line request fd.
pub(crate) const GPIO_LINE_EVENT_SIZE: usize = 48;

/// The fields of `struct gpio_v2_line_event` this crate uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct gpio_line_event {
    pub(crate) timestamp_ns: u64,
    pub(crate) id: u32,
    pub(crate) offset: u32,
    pub(crate) seqno: u32,
    pub(crate) line_seqno: u32,
}

impl gpio_line_event {
    pub(crate) fn from_bytes(buf: &[u8; GPIO_LINE_EVENT_SIZE]) -> Self {
        let u32_at = |at: usize| {
            let mut b = [0; 4];
            b.copy_from_slice(&buf[at..at + 4]);
            u32::from_ne_bytes(b)
        };
        let mut ts = [0; 8];
        ts.copy_from_slice(&buf[0..8]);

        Self {
            timestamp_ns: u64::from_ne_bytes(ts),
            id: u32_at(8),
            offset: u32_at(12),
            seqno: u32_at(16),
            line_seqno: u32_at(20),
        }
    }
}

ioctl_readwrite!(gpio_get_line, 0xB4, 0x07, gpio_line_request);

ioctl_readwrite!(gpio_get_line_info, 0xB4, 0x05, gpio_line_info);

ioctl_readwrite!(gpio_line_get_values, 0xB4, 0x0E, gpio_line_values);
ioctl_readwrite!(gpio_line_set_values, 0xB4, 0x0F, gpio_line_values);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn struct_sizes_match_kernel() {
        assert_eq!(std::mem::size_of::<gpio_line_attribute>(), 16);
        assert_eq!(std::mem::size_of::<gpio_line_config>(), 272);
        assert_eq!(std::mem::size_of::<gpio_line_request>(), 592);
        assert_eq!(std::mem::size_of::<gpio_line_info>(), 256);
    }

    #[test]
    fn output_values_attribute() {
        let mut config = gpio_line_config::zeroed();
        config.push_output_values(1, 1);

        assert_eq!(config.num_attrs, 1);
        assert_eq!(config.attrs[0].attr.id, GPIO_V2_LINE_ATTR_ID_OUTPUT_VALUES);
        assert_eq!(config.attrs[0].mask, 1);
    }

    #[test]
    fn event_from_bytes() {
        let mut buf = [0u8; GPIO_LINE_EVENT_SIZE];
        buf[0..8].copy_from_slice(&7u64.to_ne_bytes());
        buf[8..12].copy_from_slice(&GPIO_V2_LINE_EVENT_RISING_EDGE.to_ne_bytes());
        buf[12..16].copy_from_slice(&3u32.to_ne_bytes());
        buf[16..20].copy_from_slice(&9u32.to_ne_bytes());

        let event = gpio_line_event::from_bytes(&buf);
        assert_eq!(event.timestamp_ns, 7);
        assert_eq!(event.id, GPIO_V2_LINE_EVENT_RISING_EDGE);
        assert_eq!(event.offset, 3);
        assert_eq!(event.seqno, 9);
    }
}
