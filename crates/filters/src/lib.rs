//! Frame dispatch instances for the external denoise/upscale engines.
//!
//! The engines themselves live in a vendor SDK behind the [`DenoiseEngine`]
//! and [`UpscaleEngine`] trait seams, with [`RenderBackend`] fronting the
//! rendering abstraction; this crate owns everything around them: the
//! fixed-layout frame descriptors handed across the managed boundary
//! ([`DenoiseFrame`], [`UpscaleFrame`]), the per-instance plumbing that
//! turns a frame descriptor into engine calls ([`DenoiserInstance`],
//! [`UpscalerInstance`]), and the id-keyed instance [`Registry`].

mod denoiser;
mod engine;
mod frame;
mod registry;
mod upscaler;

pub use denoiser::DenoiserInstance;
pub use engine::{
    resource_states, upscaler_flags, BackendError, CommandBuffer, DenoiseEngine, EngineError,
    PassId, PassKind, RecordingState, RenderBackend, ResourceSnapshot, Texture, TexturePair,
    TextureView, UpscaleDispatch, UpscaleEngine, UpscaleGuides, UpscalerProperties, UpscalerSetup,
};
pub use frame::{
    CommonSettings, DenoiseFrame, DiffuseSettings, ResourceInput, ResourceState, ShadowSettings,
    UpscaleFrame,
};
pub use registry::Registry;
pub use upscaler::UpscalerInstance;
