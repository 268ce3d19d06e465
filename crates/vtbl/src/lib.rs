//! Raw virtual-table patching.
//!
//! This crate is the only place in the workspace that writes into foreign
//! memory. It knows two things: where the hooked virtual functions live
//! inside the vendor-fixed dispatch tables ([`device`], [`command_list`]),
//! and how to swap a function-pointer slot in a live table ([`install`]).
//!
//! Offsets are taken from the `windows` crate's generated vtable structs at
//! build time, never hand-computed. Everything here is `cfg(windows)`; on
//! other targets the crate compiles to nothing.

#[cfg(windows)]
mod offsets;
#[cfg(windows)]
mod patch;

#[cfg(windows)]
pub use offsets::{command_list, device, CommandListOffsets, DeviceOffsets};
#[cfg(windows)]
pub use patch::{install, read};
