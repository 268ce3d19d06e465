//! Bindless descriptor grafting for a hooked D3D12 device.
//!
//! The host engine's renderer knows nothing about bindless resource access.
//! This crate makes it possible anyway, by intercepting a handful of device
//! and command-list virtual functions:
//!
//! - root-signature creation is rewritten to append one large SRV descriptor
//!   table at a reserved register window ([`augment`]),
//! - the engine's main shader-visible descriptor heap is created with extra
//!   reserved capacity to back that table ([`HeapRegistry`]),
//! - and every command list's binding state is tracked so the appended table
//!   is pointed at the reserved region exactly once per signature-set/draw
//!   sequence, without stomping bindings the application sets itself
//!   ([`ListState`]).
//!
//! All of the above is owned by a [`BindlessContext`], created by the
//! embedding plugin and shared with the hook thunks. The pure decision logic
//! is platform-independent; only blob conversion, descriptor writes, and the
//! thunks themselves (the `hooks` module) touch D3D12.

mod context;
mod heaps;
mod rewrite;
mod signature;
mod tracker;

#[cfg(windows)]
mod convert;
#[cfg(windows)]
pub mod hooks;
#[cfg(windows)]
mod textures;

pub use context::{Augmentation, BindlessContext, ForcedTable, HeapsDecision};
pub use heaps::{ExtendedHeap, HeapClass, HeapRegistry, LARGE_HEAP_THRESHOLD, RESERVED_MARGIN};
pub use rewrite::{augment, Outcome, BINDLESS_CAPACITY, BINDLESS_REGISTER};
pub use signature::{
    DescriptorRange, ParameterKind, RangeKind, RootParameter, SignatureDesc, StaticSampler,
    VISIBILITY_ALL,
};
pub use tracker::{ListState, Phase, Pipeline, TableAction};

#[cfg(windows)]
pub use textures::{set_bindless_textures, BindlessTexture};

/// Frames the host engine keeps in flight; the reserved heap region holds one
/// bank of [`BINDLESS_CAPACITY`] descriptors per frame.
pub const FRAMES_IN_FLIGHT: u32 = 3;
