//! Blob ⇄ model conversion.
//!
//! Incoming root-signature blobs are deserialized with the D3D12 version-1.0
//! deserializer, copied into the owned [`SignatureDesc`] model (the
//! deserializer's buffers do not outlive it), run through the rewriter, and
//! re-serialized. Any failure along the way degrades to forwarding the
//! original bytes.

use std::ffi::CStr;

use windows::core::Error;
use windows::Win32::Foundation::E_FAIL;
use windows::Win32::Graphics::Direct3D::ID3DBlob;
use windows::Win32::Graphics::Direct3D12::{
    D3D12CreateRootSignatureDeserializer, D3D12SerializeRootSignature, ID3D12RootSignatureDeserializer,
    D3D12_DESCRIPTOR_RANGE, D3D12_DESCRIPTOR_RANGE_TYPE, D3D12_DESCRIPTOR_RANGE_TYPE_CBV,
    D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER, D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
    D3D12_DESCRIPTOR_RANGE_TYPE_UAV, D3D12_ROOT_CONSTANTS, D3D12_ROOT_DESCRIPTOR,
    D3D12_ROOT_DESCRIPTOR_TABLE, D3D12_ROOT_PARAMETER, D3D12_ROOT_PARAMETER_0,
    D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS, D3D12_ROOT_PARAMETER_TYPE_CBV,
    D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE, D3D12_ROOT_PARAMETER_TYPE_SRV,
    D3D12_ROOT_PARAMETER_TYPE_UAV, D3D12_ROOT_SIGNATURE_DESC, D3D12_ROOT_SIGNATURE_FLAGS,
    D3D12_SHADER_VISIBILITY, D3D12_STATIC_SAMPLER_DESC, D3D12_COMPARISON_FUNC, D3D12_FILTER,
    D3D12_STATIC_BORDER_COLOR, D3D12_TEXTURE_ADDRESS_MODE, D3D_ROOT_SIGNATURE_VERSION_1,
};

use crate::rewrite::{augment, Outcome};
use crate::signature::{
    DescriptorRange, ParameterKind, RangeKind, RootParameter, SignatureDesc, StaticSampler,
};

/// Result of running a creation blob through the rewriter.
pub(crate) enum BlobRewrite {
    /// Forward the caller's bytes untouched (ineligible signature or any
    /// conversion failure).
    PassThrough,
    /// Create from the rewritten bytes and record the augmentation.
    Rewritten { bytes: Vec<u8>, table_index: u32 },
}

pub(crate) fn rewrite_blob(bytes: &[u8]) -> BlobRewrite {
    let mut deserializer: Option<ID3D12RootSignatureDeserializer> = None;
    if let Err(error) = unsafe {
        D3D12CreateRootSignatureDeserializer(bytes.as_ptr().cast(), bytes.len(), &mut deserializer)
    } {
        log::warn!("root signature blob did not deserialize (version 1.0): {error}");
        return BlobRewrite::PassThrough;
    }
    let Some(deserializer) = deserializer else {
        return BlobRewrite::PassThrough;
    };

    let desc = unsafe { deserializer.GetRootSignatureDesc() };
    if desc.is_null() {
        return BlobRewrite::PassThrough;
    }
    let model = unsafe { from_d3d(&*desc) };

    match augment(&model) {
        Outcome::Untouched => BlobRewrite::PassThrough,
        Outcome::Rejected { register_end } => {
            log::warn!(
                "signature claims SRV registers up to t{} past the bindless window, left untouched",
                register_end - 1
            );
            BlobRewrite::PassThrough
        }
        Outcome::Augmented { desc, table_index } => match serialize(&desc) {
            Ok(blob) => {
                let bytes = unsafe {
                    std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
                }
                .to_vec();
                BlobRewrite::Rewritten { bytes, table_index }
            }
            Err(error) => {
                log::error!("augmented signature failed to serialize: {error}");
                BlobRewrite::PassThrough
            }
        },
    }
}

unsafe fn slice_or_empty<'a, T>(data: *const T, len: u32) -> &'a [T] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(data, len as usize)
    }
}

fn range_kind(raw: D3D12_DESCRIPTOR_RANGE_TYPE) -> RangeKind {
    if raw == D3D12_DESCRIPTOR_RANGE_TYPE_SRV {
        RangeKind::Srv
    } else if raw == D3D12_DESCRIPTOR_RANGE_TYPE_UAV {
        RangeKind::Uav
    } else if raw == D3D12_DESCRIPTOR_RANGE_TYPE_CBV {
        RangeKind::Cbv
    } else {
        debug_assert_eq!(raw, D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER);
        RangeKind::Sampler
    }
}

fn raw_range_kind(kind: RangeKind) -> D3D12_DESCRIPTOR_RANGE_TYPE {
    match kind {
        RangeKind::Srv => D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
        RangeKind::Uav => D3D12_DESCRIPTOR_RANGE_TYPE_UAV,
        RangeKind::Cbv => D3D12_DESCRIPTOR_RANGE_TYPE_CBV,
        RangeKind::Sampler => D3D12_DESCRIPTOR_RANGE_TYPE_SAMPLER,
    }
}

/// Deep-copies the deserializer's structures into owned storage.
unsafe fn from_d3d(desc: &D3D12_ROOT_SIGNATURE_DESC) -> SignatureDesc {
    let raw_parameters = slice_or_empty(desc.pParameters, desc.NumParameters);
    let mut parameters = Vec::with_capacity(raw_parameters.len());
    for parameter in raw_parameters {
        let kind = if parameter.ParameterType == D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE {
            let table = &parameter.Anonymous.DescriptorTable;
            let ranges = slice_or_empty(table.pDescriptorRanges, table.NumDescriptorRanges)
                .iter()
                .map(|range| DescriptorRange {
                    kind: range_kind(range.RangeType),
                    count: range.NumDescriptors,
                    base_register: range.BaseShaderRegister,
                    register_space: range.RegisterSpace,
                    table_offset: range.OffsetInDescriptorsFromTableStart,
                })
                .collect();
            ParameterKind::Table { ranges }
        } else if parameter.ParameterType == D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS {
            let constants = &parameter.Anonymous.Constants;
            ParameterKind::Constants {
                shader_register: constants.ShaderRegister,
                register_space: constants.RegisterSpace,
                num_32bit_values: constants.Num32BitValues,
            }
        } else {
            let descriptor = &parameter.Anonymous.Descriptor;
            let (shader_register, register_space) =
                (descriptor.ShaderRegister, descriptor.RegisterSpace);
            if parameter.ParameterType == D3D12_ROOT_PARAMETER_TYPE_CBV {
                ParameterKind::Cbv { shader_register, register_space }
            } else if parameter.ParameterType == D3D12_ROOT_PARAMETER_TYPE_SRV {
                ParameterKind::Srv { shader_register, register_space }
            } else {
                debug_assert_eq!(parameter.ParameterType, D3D12_ROOT_PARAMETER_TYPE_UAV);
                ParameterKind::Uav { shader_register, register_space }
            }
        };
        parameters.push(RootParameter { kind, visibility: parameter.ShaderVisibility.0 });
    }

    let static_samplers = slice_or_empty(desc.pStaticSamplers, desc.NumStaticSamplers)
        .iter()
        .map(|sampler| StaticSampler {
            filter: sampler.Filter.0,
            address_u: sampler.AddressU.0,
            address_v: sampler.AddressV.0,
            address_w: sampler.AddressW.0,
            mip_lod_bias: sampler.MipLODBias,
            max_anisotropy: sampler.MaxAnisotropy,
            comparison_func: sampler.ComparisonFunc.0,
            border_color: sampler.BorderColor.0,
            min_lod: sampler.MinLOD,
            max_lod: sampler.MaxLOD,
            shader_register: sampler.ShaderRegister,
            register_space: sampler.RegisterSpace,
            visibility: sampler.ShaderVisibility.0,
        })
        .collect();

    SignatureDesc { parameters, static_samplers, flags: desc.Flags.0 }
}

/// Serializes the model back to a version-1.0 blob. On failure the error
/// blob's message is logged and the error is returned for the caller to
/// fall back on.
fn serialize(model: &SignatureDesc) -> windows::core::Result<ID3DBlob> {
    // Range storage must be fully built before parameters take pointers into
    // it; the inner buffers never move afterwards.
    let range_storage: Vec<Vec<D3D12_DESCRIPTOR_RANGE>> = model
        .parameters
        .iter()
        .map(|parameter| match &parameter.kind {
            ParameterKind::Table { ranges } => ranges
                .iter()
                .map(|range| D3D12_DESCRIPTOR_RANGE {
                    RangeType: raw_range_kind(range.kind),
                    NumDescriptors: range.count,
                    BaseShaderRegister: range.base_register,
                    RegisterSpace: range.register_space,
                    OffsetInDescriptorsFromTableStart: range.table_offset,
                })
                .collect(),
            _ => Vec::new(),
        })
        .collect();

    let parameters: Vec<D3D12_ROOT_PARAMETER> = model
        .parameters
        .iter()
        .zip(&range_storage)
        .map(|(parameter, ranges)| {
            let (parameter_type, payload) = match &parameter.kind {
                ParameterKind::Table { .. } => (
                    D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
                    D3D12_ROOT_PARAMETER_0 {
                        DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                            NumDescriptorRanges: ranges.len() as u32,
                            pDescriptorRanges: if ranges.is_empty() {
                                std::ptr::null()
                            } else {
                                ranges.as_ptr()
                            },
                        },
                    },
                ),
                ParameterKind::Constants { shader_register, register_space, num_32bit_values } => (
                    D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
                    D3D12_ROOT_PARAMETER_0 {
                        Constants: D3D12_ROOT_CONSTANTS {
                            ShaderRegister: *shader_register,
                            RegisterSpace: *register_space,
                            Num32BitValues: *num_32bit_values,
                        },
                    },
                ),
                ParameterKind::Cbv { shader_register, register_space } => (
                    D3D12_ROOT_PARAMETER_TYPE_CBV,
                    root_descriptor(*shader_register, *register_space),
                ),
                ParameterKind::Srv { shader_register, register_space } => (
                    D3D12_ROOT_PARAMETER_TYPE_SRV,
                    root_descriptor(*shader_register, *register_space),
                ),
                ParameterKind::Uav { shader_register, register_space } => (
                    D3D12_ROOT_PARAMETER_TYPE_UAV,
                    root_descriptor(*shader_register, *register_space),
                ),
            };
            D3D12_ROOT_PARAMETER {
                ParameterType: parameter_type,
                Anonymous: payload,
                ShaderVisibility: D3D12_SHADER_VISIBILITY(parameter.visibility),
            }
        })
        .collect();

    let static_samplers: Vec<D3D12_STATIC_SAMPLER_DESC> = model
        .static_samplers
        .iter()
        .map(|sampler| D3D12_STATIC_SAMPLER_DESC {
            Filter: D3D12_FILTER(sampler.filter),
            AddressU: D3D12_TEXTURE_ADDRESS_MODE(sampler.address_u),
            AddressV: D3D12_TEXTURE_ADDRESS_MODE(sampler.address_v),
            AddressW: D3D12_TEXTURE_ADDRESS_MODE(sampler.address_w),
            MipLODBias: sampler.mip_lod_bias,
            MaxAnisotropy: sampler.max_anisotropy,
            ComparisonFunc: D3D12_COMPARISON_FUNC(sampler.comparison_func),
            BorderColor: D3D12_STATIC_BORDER_COLOR(sampler.border_color),
            MinLOD: sampler.min_lod,
            MaxLOD: sampler.max_lod,
            ShaderRegister: sampler.shader_register,
            RegisterSpace: sampler.register_space,
            ShaderVisibility: D3D12_SHADER_VISIBILITY(sampler.visibility),
        })
        .collect();

    let desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: parameters.len() as u32,
        pParameters: if parameters.is_empty() { std::ptr::null() } else { parameters.as_ptr() },
        NumStaticSamplers: static_samplers.len() as u32,
        pStaticSamplers: if static_samplers.is_empty() {
            std::ptr::null()
        } else {
            static_samplers.as_ptr()
        },
        Flags: D3D12_ROOT_SIGNATURE_FLAGS(model.flags),
    };

    let mut blob: Option<ID3DBlob> = None;
    let mut error_blob: Option<ID3DBlob> = None;
    let result = unsafe {
        D3D12SerializeRootSignature(
            &desc,
            D3D_ROOT_SIGNATURE_VERSION_1,
            &mut blob,
            Some(&mut error_blob),
        )
    };

    match result {
        Ok(()) => blob.ok_or_else(|| Error::from(E_FAIL)),
        Err(error) => {
            if let Some(error_blob) = &error_blob {
                let message =
                    unsafe { CStr::from_ptr(error_blob.GetBufferPointer() as *const i8) };
                log::error!("root signature serializer said: {}", message.to_string_lossy());
            }
            Err(error)
        }
    }
}

fn root_descriptor(shader_register: u32, register_space: u32) -> D3D12_ROOT_PARAMETER_0 {
    D3D12_ROOT_PARAMETER_0 {
        Descriptor: D3D12_ROOT_DESCRIPTOR {
            ShaderRegister: shader_register,
            RegisterSpace: register_space,
        },
    }
}
