//! The context object owning every bindless registry.
//!
//! One `BindlessContext` exists per hooked device, created by the embedding
//! plugin and shared with the hook thunks. Keeping all mutable state here,
//! rather than in process-wide singletons, lets several devices or tests
//! coexist without leaking state into each other.
//!
//! Locks are never held across calls into the driver, and no method takes
//! two locks at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::heaps::{ExtendedHeap, HeapRegistry};
use crate::rewrite::BINDLESS_CAPACITY;
use crate::tracker::{ListState, Phase, Pipeline, TableAction};
use crate::FRAMES_IN_FLIGHT;

/// Metadata recorded against an augmented root signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Augmentation {
    /// Root-parameter index of the appended bindless table.
    pub table_index: u32,
    /// Number of bindings the appended range exposes.
    pub max_bindings: u32,
}

/// What the `SetDescriptorHeaps` hook must forward to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapsDecision {
    /// Forward the caller's array untouched.
    PassThrough,
    /// Forward the caller's array with this heap appended.
    Append(usize),
}

/// A binding the descriptor-table hook must force after delegating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForcedTable {
    pub table_index: u32,
    pub gpu_handle: u64,
}

pub struct BindlessContext {
    device: AtomicUsize,
    /// Augmentation records keyed by signature identity. Entries are never
    /// removed; the leak is bounded by the total signature count.
    signatures: Mutex<HashMap<usize, Augmentation>>,
    heaps: Mutex<HeapRegistry>,
    /// Per-command-list scratch state, keyed by list identity.
    lists: Mutex<HashMap<usize, ListState>>,
    frame_bank: AtomicU32,
}

impl BindlessContext {
    pub fn new() -> Self {
        Self {
            device: AtomicUsize::new(0),
            signatures: Mutex::new(HashMap::new()),
            heaps: Mutex::new(HeapRegistry::new()),
            lists: Mutex::new(HashMap::new()),
            frame_bank: AtomicU32::new(0),
        }
    }

    pub fn set_device(&self, device: usize) {
        self.device.store(device, Ordering::Release);
    }

    pub fn device(&self) -> usize {
        self.device.load(Ordering::Acquire)
    }

    /// Selects the per-frame descriptor bank for subsequent writes and
    /// forced bindings.
    pub fn set_frame_index(&self, frame: u32) {
        self.frame_bank.store(frame % FRAMES_IN_FLIGHT, Ordering::Release);
    }

    /// Offset of the current frame bank, in descriptors from the reserved
    /// region's base.
    pub fn frame_offset(&self) -> u32 {
        self.frame_bank.load(Ordering::Acquire) * BINDLESS_CAPACITY
    }

    pub fn record_signature(&self, signature: usize, augmentation: Augmentation) {
        self.signatures.lock().insert(signature, augmentation);
    }

    pub fn augmentation(&self, signature: usize) -> Option<Augmentation> {
        self.signatures.lock().get(&signature).copied()
    }

    pub fn track_heap(&self, heap: usize) {
        self.heaps.lock().track(heap);
    }

    pub fn register_extended_heap(&self, record: ExtendedHeap) {
        self.heaps.lock().register_extended(record);
    }

    /// Snapshot of the extended heaps, for descriptor writes.
    pub fn extended_heaps(&self) -> Vec<ExtendedHeap> {
        self.heaps.lock().extended().to_vec()
    }

    /// A command list was created (or hooked for the first time); give it a
    /// fresh state record.
    pub fn on_create_list(&self, list: usize) {
        self.lists.lock().insert(list, ListState::default());
    }

    /// A root signature was bound on `pipeline`.
    pub fn on_set_root_signature(&self, list: usize, pipeline: Pipeline, signature: usize) {
        let augmentation =
            if signature == 0 { None } else { self.augmentation(signature).map(|a| a.table_index) };
        self.lists.lock().entry(list).or_default().bind_signature(pipeline, augmentation);
    }

    /// The descriptor-heap set is changing. Decides what to forward and
    /// updates the list's heap dimension.
    pub fn on_set_descriptor_heaps(&self, list: usize, supplied: &[usize]) -> HeapsDecision {
        if supplied.is_empty() {
            self.lists.lock().entry(list).or_default().assign_heaps(None);
            return HeapsDecision::PassThrough;
        }

        let (slot, decision) = {
            let registry = self.heaps.lock();
            for &heap in supplied {
                if registry.is_tracked(heap) {
                    log::trace!("tracked view heap {heap:#x} bound");
                    break;
                }
            }
            match registry.find_extended(supplied) {
                Some(slot) => (Some(slot), HeapsDecision::PassThrough),
                None => match registry.first_extended() {
                    Some(slot) => {
                        let heap = registry.get(slot).map(|e| e.heap).unwrap_or_default();
                        (Some(slot), HeapsDecision::Append(heap))
                    }
                    None => {
                        log::warn!("no extended descriptor heap known, bindless inactive");
                        (None, HeapsDecision::PassThrough)
                    }
                },
            }
        };

        self.lists.lock().entry(list).or_default().assign_heaps(slot);
        decision
    }

    /// A descriptor-table call at `index` was delegated; returns the forced
    /// binding to apply, if any.
    pub fn on_set_descriptor_table(
        &self,
        list: usize,
        pipeline: Pipeline,
        index: u32,
    ) -> Option<ForcedTable> {
        let action = self.lists.lock().entry(list).or_default().descriptor_table(pipeline, index);
        match action {
            TableAction::PassThrough => None,
            TableAction::Overridden => {
                log::warn!(
                    "application overrode the bindless table at root parameter {index} on list {list:#x}"
                );
                None
            }
            TableAction::Force { table_index, heap_slot } => {
                let gpu_handle = {
                    let registry = self.heaps.lock();
                    registry.get(heap_slot).map(|record| record.gpu_handle(self.frame_offset()))
                };
                match gpu_handle {
                    Some(gpu_handle) => Some(ForcedTable { table_index, gpu_handle }),
                    None => {
                        log::warn!("assigned extended heap slot {heap_slot} vanished");
                        None
                    }
                }
            }
        }
    }

    /// The list is being reset for a new recording pass.
    pub fn on_reset(&self, list: usize) {
        if let Some(state) = self.lists.lock().get_mut(&list) {
            state.reset();
        }
    }

    /// Observable phase of a list's pipeline, mainly for tests and
    /// diagnostics.
    pub fn list_phase(&self, list: usize, pipeline: Pipeline) -> Phase {
        self.lists.lock().get(&list).map(|s| s.phase(pipeline)).unwrap_or(Phase::Unbound)
    }
}

impl Default for BindlessContext {
    fn default() -> Self {
        Self::new()
    }
}
