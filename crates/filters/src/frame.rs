//! Fixed-layout structs crossing the managed/native boundary.
//!
//! Everything here is `repr(C)` and tightly packed to match the marshalled
//! layout on the managed side; read fields out of the packed frames by value
//! before taking references.

use crate::engine::Texture;

/// Per-frame settings shared by every denoiser pass.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CommonSettings {
    pub view_to_clip: [f32; 16],
    pub view_to_clip_prev: [f32; 16],
    pub world_to_view: [f32; 16],
    pub world_to_view_prev: [f32; 16],
    pub motion_vector_scale: [f32; 3],
    pub camera_jitter: [f32; 2],
    pub camera_jitter_prev: [f32; 2],
    pub resolution_scale: [f32; 2],
    pub time_delta_between_frames: f32,
    pub denoising_range: f32,
    pub disocclusion_threshold: f32,
    pub split_screen: f32,
    pub frame_index: u32,
    pub accumulation_mode: u32,
    pub is_motion_vector_in_world_space: u8,
    pub enable_validation: u8,
}

/// Shadow (sigma) pass settings.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ShadowSettings {
    pub light_direction: [f32; 3],
    pub plane_distance_sensitivity: f32,
    pub max_stabilized_frame_num: u32,
}

/// Diffuse (reblur) pass settings.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DiffuseSettings {
    pub hit_distance_params: [f32; 4],
    pub max_accumulated_frame_num: u32,
    pub max_fast_accumulated_frame_num: u32,
    pub enable_anti_firefly: u8,
}

/// Resource state the engine must assume a cached texture is in.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceState {
    pub access: u32,
    pub layout: u32,
    pub stages: u32,
}

/// One entry of the denoiser's cached resource array. `slot` is the
/// engine-defined resource-type value, passed through uninterpreted.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceInput {
    pub slot: u32,
    pub texture: Texture,
    pub state: ResourceState,
}

/// Denoise frame descriptor (render event 1).
///
/// Carries both the native resource pointers (for barriers) and the
/// pre-wrapped texture handles the managed side already created.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DenoiseFrame {
    pub common: CommonSettings,
    pub shadow: ShadowSettings,
    pub diffuse: DiffuseSettings,
    pub width: u16,
    pub height: u16,
    pub motion: usize,
    pub normal_roughness: usize,
    pub view_z: usize,
    pub penumbra: usize,
    pub shadow_translucency: usize,
    pub diffuse_radiance: usize,
    pub out_diffuse_radiance: usize,
    pub validation: usize,
    pub wrapped_motion: Texture,
    pub wrapped_normal_roughness: Texture,
    pub wrapped_view_z: Texture,
    pub wrapped_penumbra: Texture,
    pub wrapped_shadow_translucency: Texture,
    pub wrapped_diffuse_radiance: Texture,
    pub wrapped_out_diffuse_radiance: Texture,
    pub wrapped_validation: Texture,
    pub instance_id: i32,
}

/// Upscale frame descriptor (render event 2).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct UpscaleFrame {
    pub input: Texture,
    pub output: Texture,
    pub motion: Texture,
    pub depth: Texture,
    pub diffuse_albedo: Texture,
    pub specular_albedo: Texture,
    pub normal_roughness: Texture,
    pub specular_motion_or_hit: Texture,
    pub world_to_view: [f32; 16],
    pub view_to_clip: [f32; 16],
    pub output_width: u16,
    pub output_height: u16,
    pub current_width: u16,
    pub current_height: u16,
    pub camera_jitter: [f32; 2],
    pub instance_id: i32,
    pub mode: u32,
}
