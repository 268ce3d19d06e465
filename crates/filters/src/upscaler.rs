//! Per-instance upscaler plumbing.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::engine::{
    upscaler_flags, RenderBackend, Texture, TexturePair, TextureView, UpscaleDispatch,
    UpscaleEngine, UpscaleGuides, UpscalerSetup,
};
use crate::frame::UpscaleFrame;

/// Cache key for a texture view: the native object identity with the storage
/// bit folded into the top bit.
fn view_key(native: u64, storage: bool) -> u64 {
    (u64::from(storage) << 63) | (native & 0x7FFF_FFFF_FFFF_FFFF)
}

/// One logical upscaler, owning its engine context and a view cache keyed by
/// native texture identity.
pub struct UpscalerInstance {
    id: i32,
    engine: Box<dyn UpscaleEngine>,
    views: HashMap<u64, TextureView>,
    width: u16,
    height: u16,
}

impl UpscalerInstance {
    pub fn new(id: i32, engine: Box<dyn UpscaleEngine>) -> Self {
        Self { id, engine, views: HashMap::new(), width: 0, height: 0 }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    fn pair(&mut self, backend: &dyn RenderBackend, texture: Texture, storage: bool) -> TexturePair {
        if texture == 0 {
            return TexturePair::default();
        }
        let key = view_key(backend.texture_native(texture), storage);
        let view = match self.views.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => match backend.create_texture_view(texture, storage) {
                Ok(view) => *entry.insert(view),
                Err(error) => {
                    log::warn!("upscaler {}: view creation failed: {error:?}", self.id);
                    0
                }
            },
        };
        TexturePair { texture, view }
    }

    /// Runs the upscale pass for one frame. Skips silently when the frame
    /// has no extent or nothing is recording.
    pub fn dispatch(&mut self, frame: &UpscaleFrame, backend: &dyn RenderBackend) {
        let (width, height) = (frame.output_width, frame.output_height);
        if width == 0 || height == 0 {
            log::trace!("upscaler {}: zero-sized frame, skipping", self.id);
            return;
        }
        let Some(recording) = backend.recording_state() else {
            return;
        };

        let command_buffer = match backend.begin_command_buffer(&recording) {
            Ok(command_buffer) => command_buffer,
            Err(error) => {
                log::error!("upscaler {}: command buffer wrap failed: {error:?}", self.id);
                return;
            }
        };

        if (self.width, self.height) != (width, height) {
            if self.width == 0 && self.height == 0 {
                log::info!("upscaler {}: creating engine at {width}x{height}", self.id);
            } else {
                log::info!("upscaler {}: size changed, recreating at {width}x{height}", self.id);
            }
            let setup = UpscalerSetup {
                output_width: width,
                output_height: height,
                mode: frame.mode,
                flags: upscaler_flags::DEPTH_INFINITE
                    | upscaler_flags::HDR
                    | upscaler_flags::DEPTH_INVERTED,
            };
            match self.engine.recreate(&setup, command_buffer) {
                Ok(()) => {
                    self.width = width;
                    self.height = height;
                    let properties = self.engine.properties();
                    log::info!(
                        "upscaler {}: render {}x{}, upscale {}x{}",
                        self.id,
                        properties.render.0,
                        properties.render.1,
                        properties.upscale.0,
                        properties.upscale.1
                    );
                }
                Err(error) => {
                    log::error!("upscaler {}: engine recreation failed: {error:?}", self.id);
                    backend.end_command_buffer(command_buffer);
                    return;
                }
            }
        }

        let jitter = frame.camera_jitter;
        let dispatch = UpscaleDispatch {
            input: self.pair(backend, frame.input, false),
            output: self.pair(backend, frame.output, true),
            guides: UpscaleGuides {
                motion: self.pair(backend, frame.motion, false),
                depth: self.pair(backend, frame.depth, false),
                diffuse_albedo: self.pair(backend, frame.diffuse_albedo, false),
                specular_albedo: self.pair(backend, frame.specular_albedo, false),
                normal_roughness: self.pair(backend, frame.normal_roughness, false),
                specular_motion_or_hit: self.pair(backend, frame.specular_motion_or_hit, false),
            },
            current_resolution: (frame.current_width, frame.current_height),
            camera_jitter: [-jitter[0], -jitter[1]],
            motion_vector_scale: [1.0, 1.0],
            world_to_view: frame.world_to_view,
            view_to_clip: frame.view_to_clip,
        };

        if let Err(error) = self.engine.dispatch(command_buffer, &dispatch) {
            log::error!("upscaler {}: dispatch failed: {error:?}", self.id);
        }

        backend.end_command_buffer(command_buffer);
    }

    /// Releases every cached view back to the abstraction. Called by the
    /// owner before the instance is dropped.
    pub fn release_views(&mut self, backend: &dyn RenderBackend) {
        for (_, view) in self.views.drain() {
            backend.release_texture_view(view);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::engine::{
        BackendError, CommandBuffer, DenoiseEngine, EngineError, RecordingState,
        UpscalerProperties,
    };

    #[derive(Default)]
    struct EngineCalls {
        recreates: Vec<UpscalerSetup>,
        dispatches: Vec<UpscaleDispatch>,
    }

    struct MockEngine(Arc<Mutex<EngineCalls>>);

    impl UpscaleEngine for MockEngine {
        fn recreate(
            &mut self,
            setup: &UpscalerSetup,
            _command_buffer: CommandBuffer,
        ) -> Result<(), EngineError> {
            self.0.lock().recreates.push(*setup);
            Ok(())
        }

        fn properties(&self) -> UpscalerProperties {
            let setup = self.0.lock().recreates.last().copied();
            let (w, h) = setup.map(|s| (s.output_width, s.output_height)).unwrap_or_default();
            UpscalerProperties { render: (w / 2, h / 2), upscale: (w, h) }
        }

        fn dispatch(
            &mut self,
            _command_buffer: CommandBuffer,
            desc: &UpscaleDispatch,
        ) -> Result<(), EngineError> {
            self.0.lock().dispatches.push(*desc);
            Ok(())
        }
    }

    #[derive(Default)]
    struct BackendCalls {
        views_created: Vec<(Texture, bool)>,
        views_released: Vec<TextureView>,
        next_view: TextureView,
    }

    struct MockBackend {
        recording: Option<RecordingState>,
        calls: Arc<Mutex<BackendCalls>>,
    }

    impl MockBackend {
        fn recording() -> Self {
            Self {
                recording: Some(RecordingState { command_list: 0xC0DE }),
                calls: Arc::default(),
            }
        }
    }

    impl RenderBackend for MockBackend {
        fn recording_state(&self) -> Option<RecordingState> {
            self.recording
        }

        fn begin_command_buffer(
            &self,
            _recording: &RecordingState,
        ) -> Result<CommandBuffer, BackendError> {
            Ok(CommandBuffer { raw: 0xB0F })
        }

        fn end_command_buffer(&self, _command_buffer: CommandBuffer) {}

        fn create_denoiser(&self) -> Result<Box<dyn DenoiseEngine>, BackendError> {
            Err(BackendError::WrapFailed)
        }

        fn create_upscaler(&self) -> Result<Box<dyn UpscaleEngine>, BackendError> {
            Err(BackendError::WrapFailed)
        }

        fn wrap_texture(&self, _resource: usize, _format: u32) -> Result<Texture, BackendError> {
            Err(BackendError::WrapFailed)
        }

        fn release_texture(&self, _texture: Texture) {}

        fn texture_native(&self, texture: Texture) -> u64 {
            texture
        }

        fn create_texture_view(
            &self,
            texture: Texture,
            storage: bool,
        ) -> Result<TextureView, BackendError> {
            let mut calls = self.calls.lock();
            calls.views_created.push((texture, storage));
            calls.next_view += 1;
            Ok(calls.next_view)
        }

        fn release_texture_view(&self, view: TextureView) {
            self.calls.lock().views_released.push(view);
        }

        fn transition(
            &self,
            _recording: &RecordingState,
            _resource: usize,
            _before: u32,
            _after: u32,
        ) {
        }
    }

    fn frame(width: u16, height: u16) -> UpscaleFrame {
        let mut frame: UpscaleFrame = unsafe { std::mem::zeroed() };
        frame.output_width = width;
        frame.output_height = height;
        frame.current_width = width / 2;
        frame.current_height = height / 2;
        frame
    }

    fn instance() -> (UpscalerInstance, Arc<Mutex<EngineCalls>>) {
        let calls = Arc::new(Mutex::new(EngineCalls::default()));
        (UpscalerInstance::new(1, Box::new(MockEngine(calls.clone()))), calls)
    }

    #[test]
    fn storage_bit_distinguishes_views_of_one_texture() {
        assert_ne!(view_key(0x1234, false), view_key(0x1234, true));
        assert_eq!(view_key(0x1234, false), view_key(0x1234, false));
        // The top bit of the native handle never collides with the storage bit.
        assert_eq!(view_key(u64::MAX, false) >> 63, 0);
    }

    #[test]
    fn views_are_cached_by_native_identity() {
        let (mut upscaler, calls) = instance();
        let backend = MockBackend::recording();

        let mut descriptor = frame(1280, 720);
        descriptor.input = 0x10;
        descriptor.output = 0x20;
        descriptor.motion = 0x30;

        upscaler.dispatch(&descriptor, &backend);
        upscaler.dispatch(&descriptor, &backend);

        // One view per unique (texture, storage) pair, created once.
        assert_eq!(
            backend.calls.lock().views_created,
            vec![(0x10, false), (0x20, true), (0x30, false)]
        );
        assert_eq!(calls.lock().dispatches.len(), 2);
    }

    #[test]
    fn recreates_on_output_size_change_with_fixed_flags() {
        let (mut upscaler, calls) = instance();
        let backend = MockBackend::recording();

        upscaler.dispatch(&frame(1280, 720), &backend);
        upscaler.dispatch(&frame(1280, 720), &backend);
        upscaler.dispatch(&frame(2560, 1440), &backend);

        let recreates = calls.lock().recreates.clone();
        assert_eq!(recreates.len(), 2);
        assert_eq!((recreates[0].output_width, recreates[0].output_height), (1280, 720));
        assert_eq!((recreates[1].output_width, recreates[1].output_height), (2560, 1440));
        for setup in recreates {
            assert_eq!(
                setup.flags,
                upscaler_flags::DEPTH_INFINITE | upscaler_flags::HDR | upscaler_flags::DEPTH_INVERTED
            );
        }
    }

    #[test]
    fn jitter_is_negated_and_current_resolution_forwarded() {
        let (mut upscaler, calls) = instance();
        let backend = MockBackend::recording();

        let mut descriptor = frame(1280, 720);
        descriptor.camera_jitter = [0.25, -0.5];
        upscaler.dispatch(&descriptor, &backend);

        let dispatches = calls.lock().dispatches.clone();
        assert_eq!(dispatches[0].camera_jitter, [-0.25, 0.5]);
        assert_eq!(dispatches[0].current_resolution, (640, 360));
        assert_eq!(dispatches[0].motion_vector_scale, [1.0, 1.0]);
    }

    #[test]
    fn null_textures_produce_null_pairs() {
        let (mut upscaler, calls) = instance();
        let backend = MockBackend::recording();

        upscaler.dispatch(&frame(64, 64), &backend);
        let dispatches = calls.lock().dispatches.clone();
        assert_eq!(dispatches[0].input, TexturePair::default());
        assert_eq!(dispatches[0].guides.depth, TexturePair::default());
        assert!(backend.calls.lock().views_created.is_empty());
    }

    #[test]
    fn release_views_drains_the_cache() {
        let (mut upscaler, _calls) = instance();
        let backend = MockBackend::recording();

        let mut descriptor = frame(64, 64);
        descriptor.input = 0x10;
        descriptor.output = 0x20;
        upscaler.dispatch(&descriptor, &backend);

        upscaler.release_views(&backend);
        assert_eq!(backend.calls.lock().views_released.len(), 2);

        upscaler.release_views(&backend);
        assert_eq!(backend.calls.lock().views_released.len(), 2);
    }

    #[test]
    fn zero_sized_frame_is_skipped() {
        let (mut upscaler, calls) = instance();
        upscaler.dispatch(&frame(0, 0), &MockBackend::recording());
        assert!(calls.lock().recreates.is_empty());
        assert!(calls.lock().dispatches.is_empty());
    }
}
