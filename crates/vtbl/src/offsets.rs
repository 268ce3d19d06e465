use std::mem::offset_of;
use std::sync::OnceLock;

use windows::Win32::Graphics::Direct3D12::{ID3D12Device_Vtbl, ID3D12GraphicsCommandList_Vtbl};

/// Byte offsets of the hooked `ID3D12Device` virtual functions inside the
/// device dispatch table.
#[derive(Clone, Copy, Debug)]
pub struct DeviceOffsets {
    pub create_descriptor_heap: usize,
    pub create_root_signature: usize,
    pub create_compute_pipeline_state: usize,
    pub create_graphics_pipeline_state: usize,
    pub create_command_list: usize,
}

/// Byte offsets of the hooked `ID3D12GraphicsCommandList` virtual functions.
#[derive(Clone, Copy, Debug)]
pub struct CommandListOffsets {
    pub reset: usize,
    pub set_pipeline_state: usize,
    pub execute_bundle: usize,
    pub set_descriptor_heaps: usize,
    pub set_compute_root_signature: usize,
    pub set_graphics_root_signature: usize,
    pub set_compute_root_descriptor_table: usize,
    pub set_graphics_root_descriptor_table: usize,
}

/// Resolves the device offset table. Computed once, from the `windows`
/// crate's generated vtable struct, and immutable afterwards.
pub fn device() -> &'static DeviceOffsets {
    static TABLE: OnceLock<DeviceOffsets> = OnceLock::new();
    TABLE.get_or_init(|| DeviceOffsets {
        create_descriptor_heap: offset_of!(ID3D12Device_Vtbl, CreateDescriptorHeap),
        create_root_signature: offset_of!(ID3D12Device_Vtbl, CreateRootSignature),
        create_compute_pipeline_state: offset_of!(ID3D12Device_Vtbl, CreateComputePipelineState),
        create_graphics_pipeline_state: offset_of!(ID3D12Device_Vtbl, CreateGraphicsPipelineState),
        create_command_list: offset_of!(ID3D12Device_Vtbl, CreateCommandList),
    })
}

/// Resolves the command-list offset table.
pub fn command_list() -> &'static CommandListOffsets {
    static TABLE: OnceLock<CommandListOffsets> = OnceLock::new();
    TABLE.get_or_init(|| CommandListOffsets {
        reset: offset_of!(ID3D12GraphicsCommandList_Vtbl, Reset),
        set_pipeline_state: offset_of!(ID3D12GraphicsCommandList_Vtbl, SetPipelineState),
        execute_bundle: offset_of!(ID3D12GraphicsCommandList_Vtbl, ExecuteBundle),
        set_descriptor_heaps: offset_of!(ID3D12GraphicsCommandList_Vtbl, SetDescriptorHeaps),
        set_compute_root_signature: offset_of!(
            ID3D12GraphicsCommandList_Vtbl,
            SetComputeRootSignature
        ),
        set_graphics_root_signature: offset_of!(
            ID3D12GraphicsCommandList_Vtbl,
            SetGraphicsRootSignature
        ),
        set_compute_root_descriptor_table: offset_of!(
            ID3D12GraphicsCommandList_Vtbl,
            SetComputeRootDescriptorTable
        ),
        set_graphics_root_descriptor_table: offset_of!(
            ID3D12GraphicsCommandList_Vtbl,
            SetGraphicsRootDescriptorTable
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PTR: usize = std::mem::size_of::<usize>();

    // IUnknown occupies the first three slots of every COM vtable.
    const IUNKNOWN_END: usize = 3 * PTR;

    #[test]
    fn device_offsets_past_iunknown_and_distinct() {
        let t = device();
        let all = [
            t.create_descriptor_heap,
            t.create_root_signature,
            t.create_compute_pipeline_state,
            t.create_graphics_pipeline_state,
            t.create_command_list,
        ];
        for offset in all {
            assert!(offset >= IUNKNOWN_END);
            assert_eq!(offset % PTR, 0);
        }
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn command_list_offsets_past_iunknown_and_distinct() {
        let t = command_list();
        let all = [
            t.reset,
            t.set_pipeline_state,
            t.execute_bundle,
            t.set_descriptor_heaps,
            t.set_compute_root_signature,
            t.set_graphics_root_signature,
            t.set_compute_root_descriptor_table,
            t.set_graphics_root_descriptor_table,
        ];
        for offset in all {
            assert!(offset >= IUNKNOWN_END);
            assert_eq!(offset % PTR, 0);
        }
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
