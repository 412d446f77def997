//! Shared helpers for bundling.

pub(crate) mod fs;
pub(crate) mod process;
