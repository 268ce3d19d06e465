//! Per-instance denoiser plumbing.

use crate::engine::{
    resource_states, DenoiseEngine, PassId, PassKind, RenderBackend, ResourceSnapshot,
};
use crate::frame::{DenoiseFrame, ResourceInput};

/// Frames the engine may have in flight while denoising.
const QUEUED_FRAMES: u32 = 3;

const SHADOW_PASS: PassId = 0;
const DIFFUSE_PASS: PassId = 1;

/// One logical denoiser, owning its engine context and the cached resource
/// array the managed side updates out of band.
pub struct DenoiserInstance {
    id: i32,
    engine: Box<dyn DenoiseEngine>,
    cached_resources: Vec<ResourceInput>,
    width: u16,
    height: u16,
}

impl DenoiserInstance {
    pub fn new(id: i32, engine: Box<dyn DenoiseEngine>) -> Self {
        Self { id, engine, cached_resources: Vec::new(), width: 0, height: 0 }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Wholesale replacement of the cached resource array; empty input
    /// clears it.
    pub fn update_resources(&mut self, resources: &[ResourceInput]) {
        if resources.is_empty() {
            self.cached_resources.clear();
            return;
        }
        self.cached_resources = resources.to_vec();
        log::trace!("denoiser {} resources updated, count {}", self.id, resources.len());
    }

    /// Runs the denoise passes for one frame. Skips silently when the frame
    /// has no extent or nothing is recording.
    pub fn dispatch(&mut self, frame: &DenoiseFrame, backend: &dyn RenderBackend) {
        let (width, height) = (frame.width, frame.height);
        if width == 0 || height == 0 {
            log::trace!("denoiser {}: zero-sized frame, skipping", self.id);
            return;
        }
        let Some(recording) = backend.recording_state() else {
            return;
        };

        if (self.width, self.height) != (width, height) {
            let common = frame.common;
            if self.width == 0 && self.height == 0 {
                log::info!("denoiser {}: creating engine at {width}x{height}", self.id);
            } else {
                log::info!("denoiser {}: size changed, recreating at {width}x{height}", self.id);
            }
            if common.frame_index != 0 {
                log::warn!(
                    "denoiser {}: recreated mid-sequence at frame {}",
                    self.id,
                    common.frame_index
                );
            }
            let passes =
                [(SHADOW_PASS, PassKind::ShadowSigma), (DIFFUSE_PASS, PassKind::DiffuseReblur)];
            if let Err(error) = self.engine.recreate(width, height, QUEUED_FRAMES, &passes) {
                log::error!("denoiser {}: engine recreation failed: {error:?}", self.id);
                return;
            }
            self.width = width;
            self.height = height;
        }

        let command_buffer = match backend.begin_command_buffer(&recording) {
            Ok(command_buffer) => command_buffer,
            Err(error) => {
                log::error!("denoiser {}: command buffer wrap failed: {error:?}", self.id);
                return;
            }
        };

        let common = frame.common;
        let shadow = frame.shadow;
        let diffuse = frame.diffuse;
        self.engine.set_common_settings(&common);
        self.engine.set_shadow_settings(SHADOW_PASS, &shadow);
        self.engine.set_diffuse_settings(DIFFUSE_PASS, &diffuse);
        self.engine.begin_frame();

        let mut snapshot = ResourceSnapshot::default();
        for input in &self.cached_resources {
            if input.texture == 0 {
                continue;
            }
            snapshot.set(*input);
        }

        // Validation output leaves its steady state only for the duration of
        // the workload.
        let validation = frame.validation;
        if validation != 0 {
            backend.transition(
                &recording,
                validation,
                resource_states::PIXEL_SHADER_RESOURCE,
                resource_states::COMMON,
            );
        }

        if let Err(error) =
            self.engine.denoise(&[SHADOW_PASS, DIFFUSE_PASS], command_buffer, &snapshot)
        {
            log::error!("denoiser {}: dispatch failed: {error:?}", self.id);
        }

        if validation != 0 {
            backend.transition(
                &recording,
                validation,
                resource_states::COMMON,
                resource_states::PIXEL_SHADER_RESOURCE,
            );
        }

        backend.end_command_buffer(command_buffer);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::engine::{
        BackendError, CommandBuffer, DenoiseEngine, EngineError, RecordingState, Texture,
        TextureView, UpscaleEngine,
    };
    use crate::frame::{CommonSettings, DiffuseSettings, ResourceState, ShadowSettings};

    #[derive(Default)]
    struct EngineCalls {
        recreates: Vec<(u16, u16, u32)>,
        frames_begun: usize,
        denoises: Vec<usize>,
        fail_recreate: bool,
    }

    struct MockEngine(Arc<Mutex<EngineCalls>>);

    impl DenoiseEngine for MockEngine {
        fn recreate(
            &mut self,
            width: u16,
            height: u16,
            queued_frames: u32,
            passes: &[(PassId, PassKind)],
        ) -> Result<(), EngineError> {
            assert_eq!(passes.len(), 2);
            let mut calls = self.0.lock();
            if calls.fail_recreate {
                return Err(EngineError::Create(-1));
            }
            calls.recreates.push((width, height, queued_frames));
            Ok(())
        }

        fn set_common_settings(&mut self, _settings: &CommonSettings) {}
        fn set_shadow_settings(&mut self, _pass: PassId, _settings: &ShadowSettings) {}
        fn set_diffuse_settings(&mut self, _pass: PassId, _settings: &DiffuseSettings) {}

        fn begin_frame(&mut self) {
            self.0.lock().frames_begun += 1;
        }

        fn denoise(
            &mut self,
            passes: &[PassId],
            _command_buffer: CommandBuffer,
            snapshot: &ResourceSnapshot,
        ) -> Result<(), EngineError> {
            assert_eq!(passes, &[SHADOW_PASS, DIFFUSE_PASS]);
            self.0.lock().denoises.push(snapshot.len());
            Ok(())
        }
    }

    #[derive(Default)]
    struct BackendCalls {
        transitions: Vec<(usize, u32, u32)>,
        buffers_open: i32,
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

        fn idle() -> Self {
            Self { recording: None, calls: Arc::default() }
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
            self.calls.lock().buffers_open += 1;
            Ok(CommandBuffer { raw: 0xB0F })
        }

        fn end_command_buffer(&self, _command_buffer: CommandBuffer) {
            self.calls.lock().buffers_open -= 1;
        }

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
            _texture: Texture,
            _storage: bool,
        ) -> Result<TextureView, BackendError> {
            Err(BackendError::WrapFailed)
        }

        fn release_texture_view(&self, _view: TextureView) {}

        fn transition(
            &self,
            _recording: &RecordingState,
            resource: usize,
            before: u32,
            after: u32,
        ) {
            self.calls.lock().transitions.push((resource, before, after));
        }
    }

    fn frame(width: u16, height: u16) -> DenoiseFrame {
        // Packed struct; zeroed is a valid all-null descriptor.
        let mut frame: DenoiseFrame = unsafe { std::mem::zeroed() };
        frame.width = width;
        frame.height = height;
        frame
    }

    fn instance() -> (DenoiserInstance, Arc<Mutex<EngineCalls>>) {
        let calls = Arc::new(Mutex::new(EngineCalls::default()));
        (DenoiserInstance::new(1, Box::new(MockEngine(calls.clone()))), calls)
    }

    #[test]
    fn zero_sized_frame_is_skipped() {
        let (mut denoiser, calls) = instance();
        denoiser.dispatch(&frame(0, 720), &MockBackend::recording());
        denoiser.dispatch(&frame(1280, 0), &MockBackend::recording());
        assert!(calls.lock().recreates.is_empty());
        assert!(calls.lock().denoises.is_empty());
    }

    #[test]
    fn not_recording_is_skipped() {
        let (mut denoiser, calls) = instance();
        denoiser.dispatch(&frame(1280, 720), &MockBackend::idle());
        assert!(calls.lock().denoises.is_empty());
    }

    #[test]
    fn engine_recreates_only_on_size_change() {
        let (mut denoiser, calls) = instance();
        let backend = MockBackend::recording();

        denoiser.dispatch(&frame(1280, 720), &backend);
        denoiser.dispatch(&frame(1280, 720), &backend);
        denoiser.dispatch(&frame(1920, 1080), &backend);

        assert_eq!(
            calls.lock().recreates,
            vec![(1280, 720, QUEUED_FRAMES), (1920, 1080, QUEUED_FRAMES)]
        );
        assert_eq!(calls.lock().denoises.len(), 3);
        assert_eq!(calls.lock().frames_begun, 3);
        // Every opened command buffer was released.
        assert_eq!(backend.calls.lock().buffers_open, 0);
    }

    #[test]
    fn failed_recreation_skips_dispatch_and_retries() {
        let (mut denoiser, calls) = instance();
        let backend = MockBackend::recording();

        calls.lock().fail_recreate = true;
        denoiser.dispatch(&frame(1280, 720), &backend);
        assert!(calls.lock().denoises.is_empty());

        calls.lock().fail_recreate = false;
        denoiser.dispatch(&frame(1280, 720), &backend);
        assert_eq!(calls.lock().recreates, vec![(1280, 720, QUEUED_FRAMES)]);
        assert_eq!(calls.lock().denoises.len(), 1);
    }

    #[test]
    fn cached_resources_feed_the_snapshot() {
        let (mut denoiser, calls) = instance();
        let backend = MockBackend::recording();

        denoiser.update_resources(&[
            ResourceInput { slot: 0, texture: 11, state: ResourceState::default() },
            ResourceInput { slot: 1, texture: 0, state: ResourceState::default() },
            ResourceInput { slot: 2, texture: 13, state: ResourceState::default() },
        ]);
        denoiser.dispatch(&frame(64, 64), &backend);
        // Null textures are dropped from the snapshot.
        assert_eq!(calls.lock().denoises, vec![2]);

        denoiser.update_resources(&[]);
        denoiser.dispatch(&frame(64, 64), &backend);
        assert_eq!(calls.lock().denoises, vec![2, 0]);
    }

    #[test]
    fn validation_barriers_are_symmetric() {
        let (mut denoiser, _calls) = instance();
        let backend = MockBackend::recording();

        let mut descriptor = frame(64, 64);
        descriptor.validation = 0x55;
        denoiser.dispatch(&descriptor, &backend);

        let transitions = backend.calls.lock().transitions.clone();
        assert_eq!(
            transitions,
            vec![
                (0x55, resource_states::PIXEL_SHADER_RESOURCE, resource_states::COMMON),
                (0x55, resource_states::COMMON, resource_states::PIXEL_SHADER_RESOURCE),
            ]
        );
    }

    #[test]
    fn missing_validation_texture_records_no_barriers() {
        let (mut denoiser, _calls) = instance();
        let backend = MockBackend::recording();
        denoiser.dispatch(&frame(64, 64), &backend);
        assert!(backend.calls.lock().transitions.is_empty());
    }
}
