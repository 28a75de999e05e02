//! Raw bindings to the Linux GPIO character device uAPI (`linux/gpio.h`).

mod common;

pub use common::*;

pub(crate) mod v1;

pub(crate) mod v2;
