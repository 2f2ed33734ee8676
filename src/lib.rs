//! qubes-fwupd - firmware updates for Qubes OS
//!
//! Drives fwupd in dom0 and, optionally, in the USB qube, re-validating
//! everything that crosses the domain boundary before it is installed.

pub mod engine;
