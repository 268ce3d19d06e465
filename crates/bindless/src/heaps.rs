//! Descriptor-heap classification and tracking.
//!
//! The host engine allocates one big shader-visible CBV/SRV/UAV heap for all
//! of its resource views. A creation request of that shape is grown by
//! [`RESERVED_MARGIN`] descriptors; the pre-extension count becomes the base
//! offset of the reserved bindless region inside that heap. Each extended
//! heap keeps its own base offset and table-start handles.

use crate::rewrite::BINDLESS_CAPACITY;
use crate::FRAMES_IN_FLIGHT;

/// Minimum requested descriptor count for a shader-visible CBV/SRV/UAV heap
/// to be treated as the engine's main view heap.
pub const LARGE_HEAP_THRESHOLD: u32 = 4096;

/// Extra descriptors reserved at the end of an extended heap: one bank of
/// [`BINDLESS_CAPACITY`] per in-flight frame.
pub const RESERVED_MARGIN: u32 = BINDLESS_CAPACITY * FRAMES_IN_FLIGHT;

/// What a heap-creation request means to the extender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapClass {
    /// Not a shader-visible resource-view heap; forwarded untouched and not
    /// tracked.
    Ignored,
    /// Shader-visible resource-view heap below the threshold; forwarded
    /// untouched but remembered for membership tests.
    Tracked,
    /// The large-heap shape; create with `extended_count` descriptors and
    /// register the reserved region at `base_offset`.
    Extended { base_offset: u32, extended_count: u32 },
}

/// Classifies a heap-creation request. `resource_view` is true for the
/// CBV/SRV/UAV heap type, `shader_visible` for the shader-visible flag.
pub fn classify(resource_view: bool, shader_visible: bool, count: u32) -> HeapClass {
    if !resource_view || !shader_visible {
        return HeapClass::Ignored;
    }
    if count < LARGE_HEAP_THRESHOLD {
        return HeapClass::Tracked;
    }
    HeapClass::Extended {
        base_offset: count,
        extended_count: count.saturating_add(RESERVED_MARGIN),
    }
}

/// A heap that received reserved bindless capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtendedHeap {
    /// Raw heap pointer, used only as an identity.
    pub heap: usize,
    /// First descriptor index of the reserved region.
    pub base_offset: u32,
    /// CPU handle of the heap's table start.
    pub cpu_start: usize,
    /// GPU handle of the heap's table start.
    pub gpu_start: u64,
    /// Device descriptor increment for this heap type.
    pub increment: u32,
}

impl ExtendedHeap {
    /// GPU handle of the reserved region at `frame_offset` descriptors into
    /// the current frame bank.
    pub fn gpu_handle(&self, frame_offset: u32) -> u64 {
        self.gpu_start + u64::from(self.base_offset + frame_offset) * u64::from(self.increment)
    }

    /// CPU handle of the reserved descriptor at `index` descriptors into the
    /// reserved region.
    pub fn cpu_handle(&self, index: u32) -> usize {
        self.cpu_start + (self.base_offset + index) as usize * self.increment as usize
    }
}

/// Ordered lists of all tracked view heaps and of the extended subset.
#[derive(Debug, Default)]
pub struct HeapRegistry {
    tracked: Vec<usize>,
    extended: Vec<ExtendedHeap>,
}

impl HeapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers a plain shader-visible view heap.
    pub fn track(&mut self, heap: usize) {
        if !self.tracked.contains(&heap) {
            self.tracked.push(heap);
        }
    }

    /// Registers an extended heap. The heap is also tracked.
    pub fn register_extended(&mut self, record: ExtendedHeap) {
        self.track(record.heap);
        if !self.extended.iter().any(|e| e.heap == record.heap) {
            self.extended.push(record);
        }
    }

    pub fn is_tracked(&self, heap: usize) -> bool {
        self.tracked.contains(&heap)
    }

    /// Slot (index + 1) of the first supplied heap that is extended.
    pub fn find_extended(&self, heaps: &[usize]) -> Option<u32> {
        for &heap in heaps {
            if let Some(index) = self.extended.iter().position(|e| e.heap == heap) {
                return Some(index as u32 + 1);
            }
        }
        None
    }

    /// Slot of the first registered extended heap, if any.
    pub fn first_extended(&self) -> Option<u32> {
        if self.extended.is_empty() {
            None
        } else {
            Some(1)
        }
    }

    /// Record behind a slot previously returned by [`find_extended`] or
    /// [`first_extended`].
    ///
    /// [`find_extended`]: Self::find_extended
    /// [`first_extended`]: Self::first_extended
    pub fn get(&self, slot: u32) -> Option<&ExtendedHeap> {
        slot.checked_sub(1).and_then(|i| self.extended.get(i as usize))
    }

    pub fn extended(&self) -> &[ExtendedHeap] {
        &self.extended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extended(heap: usize, base_offset: u32) -> ExtendedHeap {
        ExtendedHeap { heap, base_offset, cpu_start: 0x1000, gpu_start: 0x8000, increment: 32 }
    }

    #[test]
    fn only_large_shader_visible_view_heaps_extend() {
        assert_eq!(classify(false, true, 100_000), HeapClass::Ignored);
        assert_eq!(classify(true, false, 100_000), HeapClass::Ignored);
        assert_eq!(classify(true, true, LARGE_HEAP_THRESHOLD - 1), HeapClass::Tracked);
        assert_eq!(
            classify(true, true, LARGE_HEAP_THRESHOLD),
            HeapClass::Extended {
                base_offset: LARGE_HEAP_THRESHOLD,
                extended_count: LARGE_HEAP_THRESHOLD + RESERVED_MARGIN,
            }
        );
    }

    #[test]
    fn extended_heap_registers_exactly_once() {
        let mut registry = HeapRegistry::new();
        registry.register_extended(extended(0xA0, 4096));
        registry.register_extended(extended(0xA0, 4096));
        assert_eq!(registry.extended().len(), 1);
        assert!(registry.is_tracked(0xA0));
    }

    #[test]
    fn find_extended_prefers_supplied_order() {
        let mut registry = HeapRegistry::new();
        registry.register_extended(extended(0xA0, 4096));
        registry.register_extended(extended(0xB0, 8192));
        registry.track(0xC0);

        assert_eq!(registry.find_extended(&[0xC0, 0xB0, 0xA0]), Some(2));
        assert_eq!(registry.find_extended(&[0xC0]), None);
        assert_eq!(registry.first_extended(), Some(1));
        assert_eq!(registry.get(2).map(|e| e.heap), Some(0xB0));
        assert_eq!(registry.get(0), None);
    }

    #[test]
    fn handles_derive_from_own_base_offset() {
        let record = extended(0xA0, 4096);
        assert_eq!(record.gpu_handle(0), 0x8000 + 4096 * 32);
        assert_eq!(record.gpu_handle(10), 0x8000 + 4106 * 32);
        assert_eq!(record.cpu_handle(2), 0x1000 + 4098 * 32);
    }
}
