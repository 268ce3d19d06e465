//! Trait seams for the external collaborators.
//!
//! [`RenderBackend`] is the rendering abstraction that wraps the native
//! device: it reports the recording command list, wraps native resources
//! into engine texture handles, and builds the engine instances.
//! [`DenoiseEngine`] and [`UpscaleEngine`] front the vendor SDK; their
//! internals are out of scope here.

use crate::frame::{CommonSettings, DiffuseSettings, ResourceInput, ShadowSettings};

/// Opaque wrapped-texture handle issued by the rendering abstraction.
pub type Texture = u64;

/// Opaque texture-view handle issued by the rendering abstraction.
pub type TextureView = u64;

/// Denoiser pass identifier, chosen by the caller at `recreate` time.
pub type PassId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    ShadowSigma,
    DiffuseReblur,
}

/// The native command list currently being recorded by the host engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordingState {
    pub command_list: usize,
}

/// Engine command buffer wrapping a recording native command list. Obtained
/// per dispatch and released right after.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandBuffer {
    pub raw: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendError {
    /// The abstraction could not wrap the native object.
    WrapFailed,
    /// The underlying engine returned this raw result code.
    Engine(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineError {
    Create(i32),
    Dispatch(i32),
}

/// Raw resource-state values used for the barriers around the validation
/// output texture.
pub mod resource_states {
    pub const COMMON: u32 = 0;
    pub const PIXEL_SHADER_RESOURCE: u32 = 0x80;
}

/// Upscaler behavior flags, as understood by the external engine.
pub mod upscaler_flags {
    pub const DEPTH_INFINITE: u32 = 1 << 0;
    pub const HDR: u32 = 1 << 1;
    pub const DEPTH_INVERTED: u32 = 1 << 2;
}

/// The set of textures handed to the denoiser for one frame, keyed by the
/// engine's resource-type value. Later writes to a slot replace earlier
/// ones.
#[derive(Clone, Debug, Default)]
pub struct ResourceSnapshot {
    entries: Vec<ResourceInput>,
}

impl ResourceSnapshot {
    pub fn set(&mut self, input: ResourceInput) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.slot == input.slot) {
            *existing = input;
        } else {
            self.entries.push(input);
        }
    }

    pub fn get(&self, slot: u32) -> Option<&ResourceInput> {
        self.entries.iter().find(|e| e.slot == slot)
    }

    pub fn entries(&self) -> &[ResourceInput] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub trait DenoiseEngine: Send {
    /// Tears the engine instance down and rebuilds it for a new resolution.
    fn recreate(
        &mut self,
        width: u16,
        height: u16,
        queued_frames: u32,
        passes: &[(PassId, PassKind)],
    ) -> Result<(), EngineError>;

    fn set_common_settings(&mut self, settings: &CommonSettings);
    fn set_shadow_settings(&mut self, pass: PassId, settings: &ShadowSettings);
    fn set_diffuse_settings(&mut self, pass: PassId, settings: &DiffuseSettings);
    fn begin_frame(&mut self);

    fn denoise(
        &mut self,
        passes: &[PassId],
        command_buffer: CommandBuffer,
        snapshot: &ResourceSnapshot,
    ) -> Result<(), EngineError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpscalerSetup {
    pub output_width: u16,
    pub output_height: u16,
    /// Raw engine mode value from the frame descriptor.
    pub mode: u32,
    pub flags: u32,
}

/// Engine-reported resolutions after a successful `recreate`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpscalerProperties {
    pub render: (u16, u16),
    pub upscale: (u16, u16),
}

/// A wrapped texture together with its shader view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TexturePair {
    pub texture: Texture,
    pub view: TextureView,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpscaleGuides {
    pub motion: TexturePair,
    pub depth: TexturePair,
    pub diffuse_albedo: TexturePair,
    pub specular_albedo: TexturePair,
    pub normal_roughness: TexturePair,
    pub specular_motion_or_hit: TexturePair,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpscaleDispatch {
    pub input: TexturePair,
    pub output: TexturePair,
    pub guides: UpscaleGuides,
    pub current_resolution: (u16, u16),
    pub camera_jitter: [f32; 2],
    pub motion_vector_scale: [f32; 2],
    pub world_to_view: [f32; 16],
    pub view_to_clip: [f32; 16],
}

pub trait UpscaleEngine: Send {
    fn recreate(
        &mut self,
        setup: &UpscalerSetup,
        command_buffer: CommandBuffer,
    ) -> Result<(), EngineError>;

    fn properties(&self) -> UpscalerProperties;

    fn dispatch(
        &mut self,
        command_buffer: CommandBuffer,
        desc: &UpscaleDispatch,
    ) -> Result<(), EngineError>;
}

/// The rendering abstraction collaborator.
pub trait RenderBackend: Send + Sync {
    /// `None` when the host engine is not currently recording; dispatches
    /// are silently skipped in that case.
    fn recording_state(&self) -> Option<RecordingState>;

    fn begin_command_buffer(&self, recording: &RecordingState)
        -> Result<CommandBuffer, BackendError>;
    fn end_command_buffer(&self, command_buffer: CommandBuffer);

    fn create_denoiser(&self) -> Result<Box<dyn DenoiseEngine>, BackendError>;
    fn create_upscaler(&self) -> Result<Box<dyn UpscaleEngine>, BackendError>;

    /// Wraps a native resource pointer into an engine texture handle.
    fn wrap_texture(&self, resource: usize, format: u32) -> Result<Texture, BackendError>;
    fn release_texture(&self, texture: Texture);

    /// Native object identity behind a wrapped texture, used as a cache key.
    fn texture_native(&self, texture: Texture) -> u64;
    fn create_texture_view(&self, texture: Texture, storage: bool)
        -> Result<TextureView, BackendError>;
    fn release_texture_view(&self, view: TextureView);

    /// Records a resource transition barrier on the recording list.
    fn transition(&self, recording: &RecordingState, resource: usize, before: u32, after: u32);
}
