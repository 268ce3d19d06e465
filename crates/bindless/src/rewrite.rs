//! Root-signature augmentation.
//!
//! The host engine lays its material SRV table out so that its last register
//! lands exactly on the reserved boundary register. That boundary slot is
//! reclaimed here: the matched range shrinks by one (or disappears when the
//! boundary was all it covered), and one new descriptor-table parameter is
//! appended exposing [`BINDLESS_CAPACITY`] SRVs from [`BINDLESS_REGISTER`]
//! upward. Everything else in the signature is carried through unchanged.

use crate::signature::{
    DescriptorRange, ParameterKind, RangeKind, RootParameter, SignatureDesc, VISIBILITY_ALL,
};

/// First shader register of the bindless window (t100).
pub const BINDLESS_REGISTER: u32 = 100;

/// Descriptors in the appended range; also the size of one per-frame bank in
/// the reserved heap region.
pub const BINDLESS_CAPACITY: u32 = 4096;

/// Raw `D3D12_DESCRIPTOR_RANGE_OFFSET_APPEND`.
const OFFSET_APPEND: u32 = u32::MAX;

/// Result of scanning a signature for augmentation.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// No range touches the boundary register; the original blob passes
    /// through byte-identical.
    Untouched,
    /// An SRV range claims registers beyond the reserved window; the
    /// signature cannot safely share it. Pass the original through.
    Rejected {
        /// One past the last register the offending range covers.
        register_end: u32,
    },
    /// The signature was rewritten.
    Augmented {
        desc: SignatureDesc,
        /// Root-parameter index of the appended bindless table.
        table_index: u32,
    },
}

/// One-past-the-end register of the reserved window's boundary slot.
const BOUNDARY_END: u32 = BINDLESS_REGISTER + 1;

/// Scans `desc` and, when eligible, produces a rewritten copy with the
/// bindless table appended. The input is never modified.
pub fn augment(desc: &SignatureDesc) -> Outcome {
    let mut matched: Option<(usize, usize)> = None;

    for (param_index, parameter) in desc.parameters.iter().enumerate() {
        let ParameterKind::Table { ranges } = &parameter.kind else {
            continue;
        };
        for (range_index, range) in ranges.iter().enumerate() {
            if range.kind != RangeKind::Srv || range.register_space != 0 {
                continue;
            }
            let end = range.base_register.saturating_add(range.count);
            if end > BOUNDARY_END {
                return Outcome::Rejected { register_end: end };
            }
            if end == BOUNDARY_END && matched.is_none() {
                matched = Some((param_index, range_index));
            }
        }
    }

    let Some((param_index, range_index)) = matched else {
        return Outcome::Untouched;
    };

    let mut rewritten = desc.clone();
    {
        let ParameterKind::Table { ranges } = &mut rewritten.parameters[param_index].kind else {
            unreachable!("matched parameter is a descriptor table");
        };
        if ranges[range_index].count == 1 {
            // The range existed solely at the boundary register.
            ranges.remove(range_index);
        } else {
            ranges[range_index].count -= 1;
        }
    }

    let table_index = rewritten.parameters.len() as u32;
    rewritten.parameters.push(RootParameter {
        kind: ParameterKind::Table {
            ranges: vec![DescriptorRange {
                kind: RangeKind::Srv,
                count: BINDLESS_CAPACITY,
                base_register: BINDLESS_REGISTER,
                register_space: 0,
                table_offset: OFFSET_APPEND,
            }],
        },
        visibility: VISIBILITY_ALL,
    });

    Outcome::Augmented { desc: rewritten, table_index }
}
