//! Shader-resource-view writes into the reserved heap region.

use std::ffi::c_void;
use std::mem::ManuallyDrop;

use windows::core::Interface;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12Device, ID3D12Resource, D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
    D3D12_SHADER_RESOURCE_VIEW_DESC, D3D12_SHADER_RESOURCE_VIEW_DESC_0, D3D12_SRV_DIMENSION_TEXTURE2D,
    D3D12_TEX2D_SRV,
};
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT;

use crate::context::BindlessContext;
use crate::rewrite::BINDLESS_CAPACITY;

/// One entry of the texture batch handed across the managed boundary.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct BindlessTexture {
    /// Raw `ID3D12Resource` pointer.
    pub resource: usize,
    /// Raw `DXGI_FORMAT` value to view the texture as; 0 takes the
    /// resource's own format.
    pub format: u32,
    pub mip_start: u32,
    /// 0 views all remaining mips.
    pub mip_count: u32,
}

/// Writes SRVs for `textures` into the current frame bank of every extended
/// heap's reserved region, starting `offset` descriptors in. Out-of-window
/// entries are dropped with a warning.
pub fn set_bindless_textures(context: &BindlessContext, offset: u32, textures: &[BindlessTexture]) {
    let device = context.device();
    if device == 0 {
        log::warn!("SetBindlessTextures before a device was hooked");
        return;
    }
    let heaps = context.extended_heaps();
    if heaps.is_empty() {
        log::warn!("SetBindlessTextures with no extended heap registered");
        return;
    }
    if offset >= BINDLESS_CAPACITY {
        log::warn!("SetBindlessTextures offset {offset} outside the bindless window");
        return;
    }

    let mut count = textures.len();
    let room = (BINDLESS_CAPACITY - offset) as usize;
    if count > room {
        log::warn!("SetBindlessTextures batch of {count} truncated to {room}");
        count = room;
    }

    let frame_offset = context.frame_offset();
    let device = ManuallyDrop::new(unsafe { ID3D12Device::from_raw(device as *mut c_void) });

    for heap in &heaps {
        for (i, texture) in textures[..count].iter().enumerate() {
            if texture.resource == 0 {
                continue;
            }
            let resource =
                ManuallyDrop::new(unsafe { ID3D12Resource::from_raw(texture.resource as *mut c_void) });
            let format = if texture.format == 0 {
                unsafe { resource.GetDesc() }.Format
            } else {
                DXGI_FORMAT(texture.format as i32)
            };
            let desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
                Format: format,
                ViewDimension: D3D12_SRV_DIMENSION_TEXTURE2D,
                Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
                Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                    Texture2D: D3D12_TEX2D_SRV {
                        MostDetailedMip: texture.mip_start,
                        MipLevels: if texture.mip_count == 0 { u32::MAX } else { texture.mip_count },
                        PlaneSlice: 0,
                        ResourceMinLODClamp: 0.0,
                    },
                },
            };
            let destination = D3D12_CPU_DESCRIPTOR_HANDLE {
                ptr: heap.cpu_handle(frame_offset + offset + i as u32),
            };
            unsafe { device.CreateShaderResourceView(&*resource, Some(&desc), destination) };
        }
    }
    log::trace!("wrote {count} bindless SRVs at offset {offset} into {} heap(s)", heaps.len());
}
