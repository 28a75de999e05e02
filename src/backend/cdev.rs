// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Plumbing shared by the character-device backends.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::path::PathBuf;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::backend::{ChipInfo, ChipOptions};
use crate::errors::{Error, Result};
use crate::fixed_str::FixedStr;
use crate::uapi::{self, GPIO_MAX_NAME_SIZE};

/// Opened `/dev/gpiochipN` node.
#[derive(Debug)]
pub(super) struct ChipDevice {
    file: File,
    kind: &'static str,
    id: String,
    consumer: [u8; GPIO_MAX_NAME_SIZE],
}

/// `N` of `/dev/gpiochipN`: one to three decimal digits.
pub(super) fn valid_chip_number(param: &str) -> bool {
    (1..=3).contains(&param.len()) && param.bytes().all(|b| b.is_ascii_digit())
}

impl ChipDevice {
    pub(super) fn open(kind: &'static str, param: &str, options: &ChipOptions) -> Result<Self> {
        let target = format!("{kind}:{param}");
        if !valid_chip_number(param) {
            return Err(Error::invalid_argument(
                target,
                format!("Invalid chip number '{param}', expected 1 to 3 digits"),
            ));
        }

        let consumer = FixedStr::<GPIO_MAX_NAME_SIZE>::new(options.consumer())
            .map_err(|e| Error::invalid_argument(&target, format!("Consumer label: {e}")))?
            .into_byte_array();

        let path = PathBuf::from(format!("/dev/gpiochip{param}"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::resource(&target, "open chip device", e))?;

        let this = Self {
            file,
            kind,
            id: param.to_owned(),
            consumer,
        };
        let _ = this.chip_info()?;
        Ok(this)
    }

    pub(super) fn kind(&self) -> &'static str {
        self.kind
    }

    pub(super) fn id(&self) -> &str {
        &self.id
    }

    pub(super) fn target(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }

    pub(super) fn line_target(&self, offset: u32) -> String {
        format!("{}:{} pin {}", self.kind, self.id, offset)
    }

    pub(super) fn consumer(&self) -> [u8; GPIO_MAX_NAME_SIZE] {
        self.consumer
    }

    pub(super) fn raw_fd(&self) -> std::os::fd::RawFd {
        self.file.as_raw_fd()
    }

    pub(super) fn chip_info(&self) -> Result<ChipInfo> {
        let mut info = uapi::gpio_chip_info::zeroed();
        // SAFETY: `info` is a properly sized and aligned `gpiochip_info`
        unsafe { uapi::gpio_get_chipinfo(self.raw_fd(), &mut info) }
            .map_err(|e| Error::resource(self.target(), "get chip info", e))?;

        Ok(ChipInfo {
            label: name_to_string(info.label),
            lines: info.lines,
        })
    }
}

/// Kernel names are NUL padded and not guaranteed to be UTF-8.
pub(super) fn name_to_string(bytes: [u8; GPIO_MAX_NAME_SIZE]) -> String {
    FixedStr::from_byte_array_lossy(bytes).as_str().to_owned()
}

/// Takes ownership of the fd a line request ioctl returned.
pub(super) fn line_file(fd: libc::c_int) -> File {
    // SAFETY: the kernel just handed us this fd and nothing else owns it
    unsafe { File::from_raw_fd(fd) }
}

/// Closes a line fd, reporting the error a plain drop would swallow.
pub(super) fn close_line(file: File, target: String) -> Result<()> {
    nix::unistd::close(file.into_raw_fd()).map_err(|e| Error::resource(target, "close line", e))
}

/// Wakes a thread blocked in [`wait_readable`].
///
/// Once woken it stays readable, so every later wait returns at once.
#[derive(Debug)]
pub(super) struct Waker {
    fd: OwnedFd,
}

impl Waker {
    pub(super) fn new() -> io::Result<Self> {
        // SAFETY: plain syscall, the result is checked below
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            // SAFETY: `fd` is a fresh eventfd owned by nobody else
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    pub(super) fn wake(&self) {
        let one: u64 = 1;
        // SAFETY: writes 8 bytes from a live u64 to an eventfd we own. A full
        // counter fails with EAGAIN, which still leaves the fd readable.
        unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &one as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            );
        }
    }
}

/// Blocks until `line` has an event to read (`true`) or `waker` fired (`false`).
pub(super) fn wait_readable(line: &File, waker: &Waker) -> io::Result<bool> {
    loop {
        let mut fds = [
            PollFd::new(line.as_fd(), PollFlags::POLLIN),
            PollFd::new(waker.fd.as_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut fds, PollTimeout::NONE) {
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }

        let ready = |fd: &PollFd| fd.revents().is_some_and(|r| !r.is_empty());
        if ready(&fds[1]) {
            return Ok(false);
        }
        if ready(&fds[0]) {
            return Ok(true);
        }
    }
}

/// Reads one fixed-size kernel event record.
pub(super) fn read_event<const N: usize>(mut line: &File) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    line.read_exact(&mut buf)?;
    Ok(buf)
}
