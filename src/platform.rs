//! Installed-platform surface: version record probes and add-on patchers.

pub mod addon;
pub mod info;
