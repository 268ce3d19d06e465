//! Per-command-list bindless binding state.
//!
//! The engine's own binding code never sets the appended descriptor table,
//! so the hooks must inject it exactly once per signature-set/draw sequence.
//! Each recording command list carries one [`ListState`]; compute and
//! graphics pipelines are tracked independently, the heap dimension is
//! shared. A missing record behaves like [`Phase::Unbound`]; absent state
//! always degrades to pass-through.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pipeline {
    Compute,
    Graphics,
}

/// Externally observable state of one pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No augmented signature bound; everything passes through.
    Unbound,
    /// Augmented signature bound, bindless table not yet force-assigned this
    /// pass.
    SignatureBound,
    /// Bindless table force-assigned.
    TableAssigned,
}

/// What a descriptor-table call requires of the hook, evaluated after the
/// original call has been delegated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableAction {
    PassThrough,
    /// Rewrite root parameter `table_index` to the reserved region of the
    /// extended heap in `heap_slot`.
    Force { table_index: u32, heap_slot: u32 },
    /// The application wrote the bindless index itself; its binding stands
    /// and the forced state reverts to [`Phase::SignatureBound`].
    Overridden,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListState {
    in_compute_signature: bool,
    in_graphics_signature: bool,
    compute_assigned: bool,
    graphics_assigned: bool,
    /// Index + 1 of the assigned extended heap; 0 = none.
    heap_slot: u32,
    compute_table: u32,
    graphics_table: u32,
}

impl ListState {
    pub fn phase(&self, pipeline: Pipeline) -> Phase {
        let (in_signature, assigned) = match pipeline {
            Pipeline::Compute => (self.in_compute_signature, self.compute_assigned),
            Pipeline::Graphics => (self.in_graphics_signature, self.graphics_assigned),
        };
        match (in_signature, assigned) {
            (false, _) => Phase::Unbound,
            (true, false) => Phase::SignatureBound,
            (true, true) => Phase::TableAssigned,
        }
    }

    pub fn heap_slot(&self) -> u32 {
        self.heap_slot
    }

    /// A root signature was bound on `pipeline`. `augmentation` is the
    /// bindless table index recorded for that signature, absent for plain
    /// signatures.
    pub fn bind_signature(&mut self, pipeline: Pipeline, augmentation: Option<u32>) {
        let (in_signature, assigned, table) = match pipeline {
            Pipeline::Compute => {
                (&mut self.in_compute_signature, &mut self.compute_assigned, &mut self.compute_table)
            }
            Pipeline::Graphics => (
                &mut self.in_graphics_signature,
                &mut self.graphics_assigned,
                &mut self.graphics_table,
            ),
        };
        match augmentation {
            Some(index) => {
                *in_signature = true;
                *assigned = false;
                *table = index;
            }
            None => {
                *in_signature = false;
                *assigned = false;
                *table = 0;
            }
        }
    }

    /// The descriptor-heap set changed. `slot` is the extended heap now
    /// visible to the list (supplied or force-appended), `None` when the
    /// heap list was cleared or no extended heap exists. Either way any
    /// previously forced table is stale.
    pub fn assign_heaps(&mut self, slot: Option<u32>) {
        self.heap_slot = slot.unwrap_or(0);
        self.compute_assigned = false;
        self.graphics_assigned = false;
    }

    /// A descriptor-table call at root parameter `index` was delegated;
    /// decides whether the bindless table must be (re)forced.
    pub fn descriptor_table(&mut self, pipeline: Pipeline, index: u32) -> TableAction {
        if self.heap_slot == 0 {
            return TableAction::PassThrough;
        }
        let (in_signature, assigned, table) = match pipeline {
            Pipeline::Compute => {
                (self.in_compute_signature, &mut self.compute_assigned, self.compute_table)
            }
            Pipeline::Graphics => {
                (self.in_graphics_signature, &mut self.graphics_assigned, self.graphics_table)
            }
        };
        if !in_signature {
            return TableAction::PassThrough;
        }
        if !*assigned {
            *assigned = true;
            return TableAction::Force { table_index: table, heap_slot: self.heap_slot };
        }
        if index == table {
            *assigned = false;
            return TableAction::Overridden;
        }
        TableAction::PassThrough
    }

    /// Recording-pass state must not leak across list reuse.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_unbound_and_passes_through() {
        let mut state = ListState::default();
        assert_eq!(state.phase(Pipeline::Compute), Phase::Unbound);
        assert_eq!(state.phase(Pipeline::Graphics), Phase::Unbound);
        assert_eq!(state.descriptor_table(Pipeline::Compute, 0), TableAction::PassThrough);
    }

    #[test]
    fn table_forced_once_per_signature_set() {
        let mut state = ListState::default();
        state.bind_signature(Pipeline::Compute, Some(3));
        state.assign_heaps(Some(1));
        assert_eq!(state.phase(Pipeline::Compute), Phase::SignatureBound);

        assert_eq!(
            state.descriptor_table(Pipeline::Compute, 0),
            TableAction::Force { table_index: 3, heap_slot: 1 }
        );
        assert_eq!(state.phase(Pipeline::Compute), Phase::TableAssigned);

        // Calls at other indices no longer touch the bindless table.
        assert_eq!(state.descriptor_table(Pipeline::Compute, 1), TableAction::PassThrough);
    }

    #[test]
    fn application_write_at_target_index_wins() {
        let mut state = ListState::default();
        state.bind_signature(Pipeline::Graphics, Some(2));
        state.assign_heaps(Some(1));
        assert!(matches!(
            state.descriptor_table(Pipeline::Graphics, 5),
            TableAction::Force { .. }
        ));

        assert_eq!(state.descriptor_table(Pipeline::Graphics, 2), TableAction::Overridden);
        assert_eq!(state.phase(Pipeline::Graphics), Phase::SignatureBound);

        // The next table call re-forces.
        assert!(matches!(
            state.descriptor_table(Pipeline::Graphics, 0),
            TableAction::Force { table_index: 2, heap_slot: 1 }
        ));
    }

    #[test]
    fn no_heap_assigned_means_pass_through() {
        let mut state = ListState::default();
        state.bind_signature(Pipeline::Compute, Some(1));
        assert_eq!(state.descriptor_table(Pipeline::Compute, 1), TableAction::PassThrough);
        assert_eq!(state.phase(Pipeline::Compute), Phase::SignatureBound);
    }

    #[test]
    fn plain_signature_clears_augmentation_flags() {
        let mut state = ListState::default();
        state.bind_signature(Pipeline::Compute, Some(4));
        state.assign_heaps(Some(2));
        state.descriptor_table(Pipeline::Compute, 0);
        assert_eq!(state.phase(Pipeline::Compute), Phase::TableAssigned);

        state.bind_signature(Pipeline::Compute, None);
        assert_eq!(state.phase(Pipeline::Compute), Phase::Unbound);
        assert_eq!(state.descriptor_table(Pipeline::Compute, 4), TableAction::PassThrough);
        // Heap dimension survives a signature change.
        assert_eq!(state.heap_slot(), 2);
    }

    #[test]
    fn clearing_heaps_keeps_signature_dimension() {
        let mut state = ListState::default();
        state.bind_signature(Pipeline::Compute, Some(4));
        state.bind_signature(Pipeline::Graphics, Some(5));
        state.assign_heaps(Some(1));
        state.descriptor_table(Pipeline::Compute, 0);
        state.descriptor_table(Pipeline::Graphics, 0);

        state.assign_heaps(None);
        assert_eq!(state.heap_slot(), 0);
        assert_eq!(state.phase(Pipeline::Compute), Phase::SignatureBound);
        assert_eq!(state.phase(Pipeline::Graphics), Phase::SignatureBound);
    }

    #[test]
    fn rebinding_heaps_invalidates_forced_tables() {
        let mut state = ListState::default();
        state.bind_signature(Pipeline::Compute, Some(1));
        state.assign_heaps(Some(1));
        state.descriptor_table(Pipeline::Compute, 0);
        assert_eq!(state.phase(Pipeline::Compute), Phase::TableAssigned);

        state.assign_heaps(Some(2));
        assert_eq!(state.phase(Pipeline::Compute), Phase::SignatureBound);
        assert_eq!(
            state.descriptor_table(Pipeline::Compute, 0),
            TableAction::Force { table_index: 1, heap_slot: 2 }
        );
    }

    #[test]
    fn pipelines_are_independent() {
        let mut state = ListState::default();
        state.bind_signature(Pipeline::Compute, Some(1));
        state.assign_heaps(Some(1));
        state.descriptor_table(Pipeline::Compute, 0);

        assert_eq!(state.phase(Pipeline::Graphics), Phase::Unbound);
        assert_eq!(state.phase(Pipeline::Compute), Phase::TableAssigned);

        state.bind_signature(Pipeline::Graphics, Some(7));
        assert_eq!(state.phase(Pipeline::Compute), Phase::TableAssigned);
        assert_eq!(state.phase(Pipeline::Graphics), Phase::SignatureBound);
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = ListState::default();
        state.bind_signature(Pipeline::Compute, Some(1));
        state.bind_signature(Pipeline::Graphics, Some(2));
        state.assign_heaps(Some(1));
        state.descriptor_table(Pipeline::Compute, 0);

        state.reset();
        assert_eq!(state, ListState::default());
        assert_eq!(state.phase(Pipeline::Compute), Phase::Unbound);
        assert_eq!(state.phase(Pipeline::Graphics), Phase::Unbound);
    }
}
