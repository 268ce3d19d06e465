//! Plugin surface of the bindless interposer.
//!
//! The host engine loads this library, hands it a log callback via
//! [`InitHook`], its device via [`HookDevice`], and from then on talks to it
//! through the exported entry points below and through the hooked device
//! itself. The embedding glue wires the rendering abstraction in with
//! [`install_backend`] before any instance is created.
//!
//! Everything exported here keeps Unity-plugin naming so the managed-side
//! bindings stay unchanged.

#![allow(non_snake_case)]

mod events;
mod host_log;

use std::ffi::c_void;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use filters::{DenoiserInstance, Registry, RenderBackend, ResourceInput, UpscalerInstance};

pub use events::{on_render_event, EVENT_DENOISE, EVENT_UPSCALE};
pub use host_log::LogCallback;

static BACKEND: OnceLock<Arc<dyn RenderBackend>> = OnceLock::new();

/// Wires in the rendering abstraction. First caller wins; returns false when
/// a backend was already installed.
pub fn install_backend(backend: Arc<dyn RenderBackend>) -> bool {
    BACKEND.set(backend).is_ok()
}

pub(crate) fn backend() -> Option<&'static Arc<dyn RenderBackend>> {
    BACKEND.get()
}

pub(crate) fn denoisers() -> &'static Mutex<Registry<DenoiserInstance>> {
    static REGISTRY: OnceLock<Mutex<Registry<DenoiserInstance>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Registry::new()))
}

pub(crate) fn upscalers() -> &'static Mutex<Registry<UpscalerInstance>> {
    static REGISTRY: OnceLock<Mutex<Registry<UpscalerInstance>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Registry::new()))
}

/// Stores the host log callback and routes the `log` facade to it.
#[no_mangle]
pub extern "system" fn InitHook(logger: Option<LogCallback>) {
    host_log::install(logger);
    log::trace!("InitHook");
}

/// Hooks the device creation functions. Idempotent; later devices share the
/// first context.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "system" fn HookDevice(device: *mut c_void) {
    bindless::hooks::hook_device(device, Arc::new(bindless::BindlessContext::new()));
}

/// Hooks the command-list recording functions through `list` and starts
/// tracking it. Lists created through the hooked device are picked up
/// automatically; this covers lists that predate the device hook.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "system" fn HookCommandList(list: *mut c_void) {
    bindless::hooks::hook_command_list(list);
}

/// Writes shader-resource views for `count` textures into the reserved
/// bindless region of every extended heap, starting at `offset`.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "system" fn SetBindlessTextures(
    offset: u32,
    count: u32,
    textures: *const bindless::BindlessTexture,
) {
    let Some(context) = bindless::hooks::context() else {
        log::warn!("SetBindlessTextures before HookDevice");
        return;
    };
    if textures.is_null() || count == 0 {
        return;
    }
    let textures = std::slice::from_raw_parts(textures, count as usize);
    bindless::set_bindless_textures(context, offset, textures);
}

/// Selects the per-frame bank of the reserved region.
#[cfg(windows)]
#[no_mangle]
pub extern "system" fn SetBindlessFrameIndex(frame: u32) {
    if let Some(context) = bindless::hooks::context() {
        context.set_frame_index(frame);
    }
}

#[no_mangle]
pub extern "system" fn CreateDenoiserInstance() -> i32 {
    let Some(backend) = BACKEND.get() else {
        log::error!("CreateDenoiserInstance without a rendering backend");
        return 0;
    };
    match backend.create_denoiser() {
        Ok(engine) => denoisers().lock().insert(|id| DenoiserInstance::new(id, engine)),
        Err(error) => {
            log::error!("denoiser engine creation failed: {error:?}");
            0
        }
    }
}

#[no_mangle]
pub extern "system" fn DestroyDenoiserInstance(id: i32) {
    if denoisers().lock().remove(id).is_some() {
        log::trace!("denoiser {id} destroyed");
    }
}

/// Wholesale replacement of a denoiser's cached resource array; null or
/// empty input clears it.
#[no_mangle]
pub unsafe extern "system" fn UpdateDenoiserResources(
    id: i32,
    resources: *const ResourceInput,
    count: i32,
) {
    let mut registry = denoisers().lock();
    let Some(instance) = registry.get_mut(id) else {
        return;
    };
    if resources.is_null() || count <= 0 {
        instance.update_resources(&[]);
        return;
    }
    instance.update_resources(std::slice::from_raw_parts(resources, count as usize));
}

#[no_mangle]
pub extern "system" fn CreateUpscalerInstance() -> i32 {
    let Some(backend) = BACKEND.get() else {
        log::error!("CreateUpscalerInstance without a rendering backend");
        return 0;
    };
    match backend.create_upscaler() {
        Ok(engine) => upscalers().lock().insert(|id| UpscalerInstance::new(id, engine)),
        Err(error) => {
            log::error!("upscaler engine creation failed: {error:?}");
            0
        }
    }
}

#[no_mangle]
pub extern "system" fn DestroyUpscalerInstance(id: i32) {
    let removed = upscalers().lock().remove(id);
    if let Some(mut instance) = removed {
        if let Some(backend) = BACKEND.get() {
            instance.release_views(backend.as_ref());
        }
        log::trace!("upscaler {id} destroyed");
    }
}

/// Wraps a native texture into an engine handle via the abstraction.
#[no_mangle]
pub unsafe extern "system" fn WrapTexture(resource: *mut c_void, format: u32) -> u64 {
    let Some(backend) = BACKEND.get() else {
        return 0;
    };
    match backend.wrap_texture(resource as usize, format) {
        Ok(texture) => texture,
        Err(error) => {
            log::warn!("texture wrap failed: {error:?}");
            0
        }
    }
}

#[no_mangle]
pub extern "system" fn ReleaseTexture(texture: u64) {
    if let Some(backend) = BACKEND.get() {
        backend.release_texture(texture);
    }
}

/// The callback the host engine invokes for plugin render events.
#[no_mangle]
pub extern "system" fn GetRenderEventAndDataFunc(
) -> unsafe extern "system" fn(event_id: i32, data: *mut c_void) {
    events::on_render_event
}
