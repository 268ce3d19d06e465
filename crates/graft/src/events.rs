//! Render-event dispatch.
//!
//! The host engine issues plugin events on its render thread with an opaque
//! data pointer; the event id selects the frame-descriptor layout and the
//! descriptor's embedded instance id routes it. Unknown events and ids are
//! ignored.

use std::ffi::c_void;

use filters::{DenoiseFrame, UpscaleFrame};

pub const EVENT_DENOISE: i32 = 1;
pub const EVENT_UPSCALE: i32 = 2;

pub unsafe extern "system" fn on_render_event(event_id: i32, data: *mut c_void) {
    if data.is_null() {
        return;
    }
    let Some(backend) = crate::backend() else {
        return;
    };

    match event_id {
        EVENT_DENOISE => {
            let frame = &*(data as *const DenoiseFrame);
            let instance_id = frame.instance_id;
            let mut registry = crate::denoisers().lock();
            if let Some(instance) = registry.get_mut(instance_id) {
                instance.dispatch(frame, backend.as_ref());
            }
        }
        EVENT_UPSCALE => {
            let frame = &*(data as *const UpscaleFrame);
            let instance_id = frame.instance_id;
            let mut registry = crate::upscalers().lock();
            if let Some(instance) = registry.get_mut(instance_id) {
                instance.dispatch(frame, backend.as_ref());
            }
        }
        other => log::trace!("render event {other} ignored"),
    }
}
