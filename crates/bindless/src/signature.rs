//! Owned model of a deserialized root signature.
//!
//! The D3D12 deserializer hands back structures whose buffers do not outlive
//! the deserializer object, so the rewriter copies everything it needs into
//! this model before mutating it. `Vec`-backed throughout; parameter and
//! range counts are whatever the blob says they are.
//!
//! Raw numeric values (visibility, flags, sampler fields) are carried
//! through untouched so parameters the rewriter does not modify round-trip
//! bit-for-bit.

/// Raw `D3D12_SHADER_VISIBILITY` value, carried through unchanged.
pub type Visibility = i32;

/// `D3D12_SHADER_VISIBILITY_ALL`.
pub const VISIBILITY_ALL: Visibility = 0;

/// Descriptor range type inside a table parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeKind {
    /// Read-only resource view (SRV).
    Srv,
    /// Read-write resource view (UAV).
    Uav,
    /// Constant-buffer view.
    Cbv,
    Sampler,
}

/// One descriptor range of a table parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorRange {
    pub kind: RangeKind,
    pub count: u32,
    pub base_register: u32,
    pub register_space: u32,
    /// Raw `OffsetInDescriptorsFromTableStart`; `u32::MAX` is the D3D12
    /// "append" sentinel.
    pub table_offset: u32,
}

/// Payload of a root parameter. Non-table parameters are opaque to the
/// rewriter but must be preserved exactly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    Table { ranges: Vec<DescriptorRange> },
    Constants { shader_register: u32, register_space: u32, num_32bit_values: u32 },
    Cbv { shader_register: u32, register_space: u32 },
    Srv { shader_register: u32, register_space: u32 },
    Uav { shader_register: u32, register_space: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootParameter {
    pub kind: ParameterKind,
    pub visibility: Visibility,
}

/// Verbatim copy of a `D3D12_STATIC_SAMPLER_DESC`. The rewriter never looks
/// inside; every field is a raw value so the copy is exact.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticSampler {
    pub filter: i32,
    pub address_u: i32,
    pub address_v: i32,
    pub address_w: i32,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    pub comparison_func: i32,
    pub border_color: i32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub shader_register: u32,
    pub register_space: u32,
    pub visibility: Visibility,
}

/// The whole deserialized signature.
#[derive(Clone, Debug, PartialEq)]
pub struct SignatureDesc {
    pub parameters: Vec<RootParameter>,
    pub static_samplers: Vec<StaticSampler>,
    /// Raw `D3D12_ROOT_SIGNATURE_FLAGS` value.
    pub flags: i32,
}

impl SignatureDesc {
    pub fn new() -> Self {
        Self { parameters: Vec::new(), static_samplers: Vec::new(), flags: 0 }
    }
}

impl Default for SignatureDesc {
    fn default() -> Self {
        Self::new()
    }
}
