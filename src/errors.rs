// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error type shared by chips, pins and backends.

use std::io::Error as IOError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by chip and pin operations.
///
/// Every variant carries the identity of the chip (and pin, where one is
/// involved) that raised it, e.g. `gpiod:0 pin 4`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed chip id, unsupported mode or flags, out-of-range pin.
    #[error("{target}: {msg}")]
    InvalidArgument { target: String, msg: String },

    /// A backend call failed.
    #[error("{target}: {op} - {source}")]
    Resource {
        target: String,
        op: &'static str,
        #[source]
        source: IOError,
    },

    /// The operation is not valid in the pin's current state.
    #[error("{target}: {msg}")]
    InvalidState { target: String, msg: &'static str },
}

/// Fieldless mirror of [`Error`] for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Resource,
    InvalidState,
}

impl Error {
    pub(crate) fn invalid_argument(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::InvalidArgument {
            target: target.into(),
            msg: msg.into(),
        }
    }

    pub(crate) fn resource(
        target: impl Into<String>,
        op: &'static str,
        source: impl Into<IOError>,
    ) -> Self {
        Error::Resource {
            target: target.into(),
            op,
            source: source.into(),
        }
    }

    pub(crate) fn invalid_state(target: impl Into<String>, msg: &'static str) -> Self {
        Error::InvalidState {
            target: target.into(),
            msg,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Error::Resource { .. } => ErrorKind::Resource,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }

    /// The chip/pin identity the error was raised for.
    pub fn target(&self) -> &str {
        match self {
            Error::InvalidArgument { target, .. }
            | Error::Resource { target, .. }
            | Error::InvalidState { target, .. } => target,
        }
    }

    /// The OS error code behind a [`Error::Resource`], if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Resource { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resource_error_keeps_errno() {
        let err = Error::resource("gpiod:0 pin 3", "set pin state", nix::errno::Errno::EBUSY);

        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(err.raw_os_error(), Some(libc::EBUSY));
        assert!(err.to_string().starts_with("gpiod:0 pin 3: set pin state - "));
    }
}
