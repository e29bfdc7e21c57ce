//! pdftk process layer
//!
//! Locates the `pdftk` executable, runs it synchronously and maps its exit
//! status to errors.

mod client;
mod command;
mod locator;

pub use client::{Pdftk, DEFAULT_BURST_PREFIX};
pub use locator::{find_executable, find_in_dirs, is_executable, PDFTK};
