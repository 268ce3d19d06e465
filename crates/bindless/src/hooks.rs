//! Hook installation and the intercepting thunks.
//!
//! Original function pointers are read out of the vtables *before* the slots
//! are patched, so a thunk can always delegate. Each thunk reproduces the
//! original call's parameter and return contract exactly; with no installed
//! context, or when any lookup comes up empty, every thunk degrades to a
//! plain delegate.

use std::ffi::c_void;
use std::mem::{self, ManuallyDrop};
use std::sync::{Arc, OnceLock};

use smallvec::SmallVec;
use windows::core::{Interface, GUID, HRESULT};
use windows::Win32::Foundation::E_FAIL;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12DescriptorHeap, ID3D12Device, D3D12_COMMAND_LIST_TYPE, D3D12_DESCRIPTOR_HEAP_DESC,
    D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE, D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
    D3D12_GPU_DESCRIPTOR_HANDLE,
};

use crate::context::{Augmentation, BindlessContext, HeapsDecision};
use crate::convert::{rewrite_blob, BlobRewrite};
use crate::heaps::{classify, ExtendedHeap, HeapClass};
use crate::rewrite::BINDLESS_CAPACITY;
use crate::tracker::Pipeline;

type CreateDescriptorHeapFn = unsafe extern "system" fn(
    this: *mut c_void,
    desc: *const D3D12_DESCRIPTOR_HEAP_DESC,
    riid: *const GUID,
    heap: *mut *mut c_void,
) -> HRESULT;

type CreateRootSignatureFn = unsafe extern "system" fn(
    this: *mut c_void,
    node_mask: u32,
    blob: *const c_void,
    blob_len: usize,
    riid: *const GUID,
    signature: *mut *mut c_void,
) -> HRESULT;

type CreatePipelineStateFn = unsafe extern "system" fn(
    this: *mut c_void,
    desc: *const c_void,
    riid: *const GUID,
    pipeline: *mut *mut c_void,
) -> HRESULT;

type CreateCommandListFn = unsafe extern "system" fn(
    this: *mut c_void,
    node_mask: u32,
    list_type: D3D12_COMMAND_LIST_TYPE,
    allocator: *mut c_void,
    initial_state: *mut c_void,
    riid: *const GUID,
    list: *mut *mut c_void,
) -> HRESULT;

type ResetFn = unsafe extern "system" fn(
    this: *mut c_void,
    allocator: *mut c_void,
    initial_state: *mut c_void,
) -> HRESULT;

type SetPipelineStateFn = unsafe extern "system" fn(this: *mut c_void, pipeline: *mut c_void);

type ExecuteBundleFn = unsafe extern "system" fn(this: *mut c_void, bundle: *mut c_void);

type SetDescriptorHeapsFn =
    unsafe extern "system" fn(this: *mut c_void, count: u32, heaps: *const *mut c_void);

type SetRootSignatureFn = unsafe extern "system" fn(this: *mut c_void, signature: *mut c_void);

type SetRootDescriptorTableFn = unsafe extern "system" fn(
    this: *mut c_void,
    index: u32,
    base_descriptor: D3D12_GPU_DESCRIPTOR_HANDLE,
);

struct DeviceOriginals {
    create_descriptor_heap: CreateDescriptorHeapFn,
    create_root_signature: CreateRootSignatureFn,
    create_compute_pipeline_state: CreatePipelineStateFn,
    create_graphics_pipeline_state: CreatePipelineStateFn,
    create_command_list: CreateCommandListFn,
}

struct CommandListOriginals {
    reset: ResetFn,
    set_pipeline_state: SetPipelineStateFn,
    execute_bundle: ExecuteBundleFn,
    set_descriptor_heaps: SetDescriptorHeapsFn,
    set_compute_root_signature: SetRootSignatureFn,
    set_graphics_root_signature: SetRootSignatureFn,
    set_compute_root_descriptor_table: SetRootDescriptorTableFn,
    set_graphics_root_descriptor_table: SetRootDescriptorTableFn,
}

static CONTEXT: OnceLock<Arc<BindlessContext>> = OnceLock::new();
static DEVICE_ORIGINALS: OnceLock<DeviceOriginals> = OnceLock::new();
static LIST_ORIGINALS: OnceLock<CommandListOriginals> = OnceLock::new();

/// The context the hooks report into, once a device has been hooked.
pub fn context() -> Option<&'static Arc<BindlessContext>> {
    CONTEXT.get()
}

/// Hooks the device creation functions. The first call installs `context`
/// process-wide; later calls (or devices) reuse it. Idempotent.
pub fn hook_device(device: *mut c_void, context: Arc<BindlessContext>) {
    if device.is_null() {
        log::warn!("hook_device called with a null device");
        return;
    }
    let context = CONTEXT.get_or_init(|| context);
    context.set_device(device as usize);

    if DEVICE_ORIGINALS.get().is_some() {
        log::trace!("device hooks already installed");
        return;
    }

    let offsets = vtbl::device();
    unsafe {
        // Originals are published before any slot is patched so a concurrent
        // caller entering a thunk always finds them.
        let originals = DeviceOriginals {
            create_descriptor_heap: mem::transmute(vtbl::read(device, offsets.create_descriptor_heap)),
            create_root_signature: mem::transmute(vtbl::read(device, offsets.create_root_signature)),
            create_compute_pipeline_state: mem::transmute(vtbl::read(
                device,
                offsets.create_compute_pipeline_state,
            )),
            create_graphics_pipeline_state: mem::transmute(vtbl::read(
                device,
                offsets.create_graphics_pipeline_state,
            )),
            create_command_list: mem::transmute(vtbl::read(device, offsets.create_command_list)),
        };
        if DEVICE_ORIGINALS.set(originals).is_err() {
            return;
        }

        vtbl::install(
            device,
            offsets.create_descriptor_heap,
            hooked_create_descriptor_heap as *const c_void,
        );
        vtbl::install(
            device,
            offsets.create_root_signature,
            hooked_create_root_signature as *const c_void,
        );
        vtbl::install(
            device,
            offsets.create_compute_pipeline_state,
            hooked_create_compute_pipeline_state as *const c_void,
        );
        vtbl::install(
            device,
            offsets.create_graphics_pipeline_state,
            hooked_create_graphics_pipeline_state as *const c_void,
        );
        vtbl::install(device, offsets.create_command_list, hooked_create_command_list as *const c_void);
    }
    log::trace!("device hooks installed on {device:p}");
}

/// Hooks the command-list recording functions (once; all graphics command
/// lists share the vtable) and gives `list` a fresh tracking record.
pub fn hook_command_list(list: *mut c_void) {
    if list.is_null() {
        log::warn!("hook_command_list called with a null list");
        return;
    }
    if let Some(context) = CONTEXT.get() {
        context.on_create_list(list as usize);
    }

    if LIST_ORIGINALS.get().is_some() {
        return;
    }

    let offsets = vtbl::command_list();
    unsafe {
        let originals = CommandListOriginals {
            reset: mem::transmute(vtbl::read(list, offsets.reset)),
            set_pipeline_state: mem::transmute(vtbl::read(list, offsets.set_pipeline_state)),
            execute_bundle: mem::transmute(vtbl::read(list, offsets.execute_bundle)),
            set_descriptor_heaps: mem::transmute(vtbl::read(list, offsets.set_descriptor_heaps)),
            set_compute_root_signature: mem::transmute(vtbl::read(
                list,
                offsets.set_compute_root_signature,
            )),
            set_graphics_root_signature: mem::transmute(vtbl::read(
                list,
                offsets.set_graphics_root_signature,
            )),
            set_compute_root_descriptor_table: mem::transmute(vtbl::read(
                list,
                offsets.set_compute_root_descriptor_table,
            )),
            set_graphics_root_descriptor_table: mem::transmute(vtbl::read(
                list,
                offsets.set_graphics_root_descriptor_table,
            )),
        };
        if LIST_ORIGINALS.set(originals).is_err() {
            return;
        }

        vtbl::install(list, offsets.reset, hooked_reset as *const c_void);
        vtbl::install(list, offsets.set_pipeline_state, hooked_set_pipeline_state as *const c_void);
        vtbl::install(list, offsets.execute_bundle, hooked_execute_bundle as *const c_void);
        vtbl::install(list, offsets.set_descriptor_heaps, hooked_set_descriptor_heaps as *const c_void);
        vtbl::install(
            list,
            offsets.set_compute_root_signature,
            hooked_set_compute_root_signature as *const c_void,
        );
        vtbl::install(
            list,
            offsets.set_graphics_root_signature,
            hooked_set_graphics_root_signature as *const c_void,
        );
        vtbl::install(
            list,
            offsets.set_compute_root_descriptor_table,
            hooked_set_compute_root_descriptor_table as *const c_void,
        );
        vtbl::install(
            list,
            offsets.set_graphics_root_descriptor_table,
            hooked_set_graphics_root_descriptor_table as *const c_void,
        );
    }
    log::trace!("command list hooks installed via {list:p}");
}

unsafe extern "system" fn hooked_create_descriptor_heap(
    this: *mut c_void,
    desc_ptr: *const D3D12_DESCRIPTOR_HEAP_DESC,
    riid: *const GUID,
    out_heap: *mut *mut c_void,
) -> HRESULT {
    let Some(originals) = DEVICE_ORIGINALS.get() else {
        return E_FAIL;
    };
    let Some(context) = CONTEXT.get() else {
        return (originals.create_descriptor_heap)(this, desc_ptr, riid, out_heap);
    };
    if desc_ptr.is_null() {
        return (originals.create_descriptor_heap)(this, desc_ptr, riid, out_heap);
    }

    let mut desc = *desc_ptr;
    let class = classify(
        desc.Type == D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
        desc.Flags.contains(D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE),
        desc.NumDescriptors,
    );
    if let HeapClass::Extended { extended_count, base_offset } = class {
        log::trace!(
            "extending view heap from {} to {extended_count} descriptors (reserved at {base_offset})",
            desc.NumDescriptors
        );
        desc.NumDescriptors = extended_count;
    }

    let hr = (originals.create_descriptor_heap)(this, &desc, riid, out_heap);
    if hr.is_ok() && !out_heap.is_null() && !(*out_heap).is_null() {
        let heap_ptr = *out_heap;
        match class {
            HeapClass::Ignored => {}
            HeapClass::Tracked => context.track_heap(heap_ptr as usize),
            HeapClass::Extended { base_offset, .. } => {
                let heap = ManuallyDrop::new(ID3D12DescriptorHeap::from_raw(heap_ptr));
                let device = ManuallyDrop::new(ID3D12Device::from_raw(this));
                let increment =
                    device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV);
                context.register_extended_heap(ExtendedHeap {
                    heap: heap_ptr as usize,
                    base_offset,
                    cpu_start: heap.GetCPUDescriptorHandleForHeapStart().ptr,
                    gpu_start: heap.GetGPUDescriptorHandleForHeapStart().ptr,
                    increment,
                });
            }
        }
    }
    hr
}

unsafe extern "system" fn hooked_create_root_signature(
    this: *mut c_void,
    node_mask: u32,
    blob: *const c_void,
    blob_len: usize,
    riid: *const GUID,
    out_signature: *mut *mut c_void,
) -> HRESULT {
    let Some(originals) = DEVICE_ORIGINALS.get() else {
        return E_FAIL;
    };
    let Some(context) = CONTEXT.get() else {
        return (originals.create_root_signature)(this, node_mask, blob, blob_len, riid, out_signature);
    };
    if blob.is_null() || blob_len == 0 {
        return (originals.create_root_signature)(this, node_mask, blob, blob_len, riid, out_signature);
    }

    let bytes = std::slice::from_raw_parts(blob as *const u8, blob_len);
    match rewrite_blob(bytes) {
        BlobRewrite::PassThrough => {
            (originals.create_root_signature)(this, node_mask, blob, blob_len, riid, out_signature)
        }
        BlobRewrite::Rewritten { bytes, table_index } => {
            let hr = (originals.create_root_signature)(
                this,
                node_mask,
                bytes.as_ptr().cast(),
                bytes.len(),
                riid,
                out_signature,
            );
            if hr.is_ok() && !out_signature.is_null() && !(*out_signature).is_null() {
                context.record_signature(
                    *out_signature as usize,
                    Augmentation { table_index, max_bindings: BINDLESS_CAPACITY },
                );
                log::trace!(
                    "augmented root signature {:p}, bindless table at parameter {table_index}",
                    *out_signature
                );
            }
            hr
        }
    }
}

unsafe extern "system" fn hooked_create_compute_pipeline_state(
    this: *mut c_void,
    desc: *const c_void,
    riid: *const GUID,
    out_pipeline: *mut *mut c_void,
) -> HRESULT {
    let Some(originals) = DEVICE_ORIGINALS.get() else {
        return E_FAIL;
    };
    log::trace!("CreateComputePipelineState");
    (originals.create_compute_pipeline_state)(this, desc, riid, out_pipeline)
}

unsafe extern "system" fn hooked_create_graphics_pipeline_state(
    this: *mut c_void,
    desc: *const c_void,
    riid: *const GUID,
    out_pipeline: *mut *mut c_void,
) -> HRESULT {
    let Some(originals) = DEVICE_ORIGINALS.get() else {
        return E_FAIL;
    };
    log::trace!("CreateGraphicsPipelineState");
    (originals.create_graphics_pipeline_state)(this, desc, riid, out_pipeline)
}

unsafe extern "system" fn hooked_create_command_list(
    this: *mut c_void,
    node_mask: u32,
    list_type: D3D12_COMMAND_LIST_TYPE,
    allocator: *mut c_void,
    initial_state: *mut c_void,
    riid: *const GUID,
    out_list: *mut *mut c_void,
) -> HRESULT {
    let Some(originals) = DEVICE_ORIGINALS.get() else {
        return E_FAIL;
    };
    let hr = (originals.create_command_list)(
        this,
        node_mask,
        list_type,
        allocator,
        initial_state,
        riid,
        out_list,
    );
    if hr.is_ok() && !out_list.is_null() && !(*out_list).is_null() {
        hook_command_list(*out_list);
    }
    hr
}

unsafe extern "system" fn hooked_reset(
    this: *mut c_void,
    allocator: *mut c_void,
    initial_state: *mut c_void,
) -> HRESULT {
    let Some(originals) = LIST_ORIGINALS.get() else {
        return E_FAIL;
    };
    if let Some(context) = CONTEXT.get() {
        context.on_reset(this as usize);
    }
    (originals.reset)(this, allocator, initial_state)
}

unsafe extern "system" fn hooked_set_pipeline_state(this: *mut c_void, pipeline: *mut c_void) {
    let Some(originals) = LIST_ORIGINALS.get() else {
        return;
    };
    log::trace!("SetPipelineState {pipeline:p}");
    (originals.set_pipeline_state)(this, pipeline)
}

unsafe extern "system" fn hooked_execute_bundle(this: *mut c_void, bundle: *mut c_void) {
    let Some(originals) = LIST_ORIGINALS.get() else {
        return;
    };
    log::trace!("ExecuteBundle {bundle:p}");
    (originals.execute_bundle)(this, bundle)
}

unsafe extern "system" fn hooked_set_descriptor_heaps(
    this: *mut c_void,
    count: u32,
    heaps: *const *mut c_void,
) {
    let Some(originals) = LIST_ORIGINALS.get() else {
        return;
    };
    let Some(context) = CONTEXT.get() else {
        return (originals.set_descriptor_heaps)(this, count, heaps);
    };

    if count == 0 || heaps.is_null() {
        context.on_set_descriptor_heaps(this as usize, &[]);
        return (originals.set_descriptor_heaps)(this, count, heaps);
    }

    let supplied = std::slice::from_raw_parts(heaps, count as usize);
    let identities: SmallVec<[usize; 4]> = supplied.iter().map(|&heap| heap as usize).collect();
    match context.on_set_descriptor_heaps(this as usize, &identities) {
        HeapsDecision::PassThrough => (originals.set_descriptor_heaps)(this, count, heaps),
        HeapsDecision::Append(extended) => {
            let mut forwarded: SmallVec<[*mut c_void; 4]> = supplied.iter().copied().collect();
            forwarded.push(extended as *mut c_void);
            log::trace!("appending extended heap {extended:#x} to SetDescriptorHeaps");
            (originals.set_descriptor_heaps)(this, forwarded.len() as u32, forwarded.as_ptr())
        }
    }
}

unsafe extern "system" fn hooked_set_compute_root_signature(
    this: *mut c_void,
    signature: *mut c_void,
) {
    let Some(originals) = LIST_ORIGINALS.get() else {
        return;
    };
    if let Some(context) = CONTEXT.get() {
        context.on_set_root_signature(this as usize, Pipeline::Compute, signature as usize);
    }
    (originals.set_compute_root_signature)(this, signature)
}

unsafe extern "system" fn hooked_set_graphics_root_signature(
    this: *mut c_void,
    signature: *mut c_void,
) {
    let Some(originals) = LIST_ORIGINALS.get() else {
        return;
    };
    if let Some(context) = CONTEXT.get() {
        context.on_set_root_signature(this as usize, Pipeline::Graphics, signature as usize);
    }
    (originals.set_graphics_root_signature)(this, signature)
}

unsafe extern "system" fn hooked_set_compute_root_descriptor_table(
    this: *mut c_void,
    index: u32,
    base_descriptor: D3D12_GPU_DESCRIPTOR_HANDLE,
) {
    let Some(originals) = LIST_ORIGINALS.get() else {
        return;
    };
    // The application's own bindings at other indices must land first.
    (originals.set_compute_root_descriptor_table)(this, index, base_descriptor);
    if let Some(context) = CONTEXT.get() {
        if let Some(forced) = context.on_set_descriptor_table(this as usize, Pipeline::Compute, index)
        {
            (originals.set_compute_root_descriptor_table)(
                this,
                forced.table_index,
                D3D12_GPU_DESCRIPTOR_HANDLE { ptr: forced.gpu_handle },
            );
        }
    }
}

unsafe extern "system" fn hooked_set_graphics_root_descriptor_table(
    this: *mut c_void,
    index: u32,
    base_descriptor: D3D12_GPU_DESCRIPTOR_HANDLE,
) {
    let Some(originals) = LIST_ORIGINALS.get() else {
        return;
    };
    (originals.set_graphics_root_descriptor_table)(this, index, base_descriptor);
    if let Some(context) = CONTEXT.get() {
        if let Some(forced) = context.on_set_descriptor_table(this as usize, Pipeline::Graphics, index)
        {
            (originals.set_graphics_root_descriptor_table)(
                this,
                forced.table_index,
                D3D12_GPU_DESCRIPTOR_HANDLE { ptr: forced.gpu_handle },
            );
        }
    }
}
