use std::ffi::c_void;

use windows::Win32::System::Memory::{VirtualProtect, PAGE_PROTECTION_FLAGS, PAGE_READWRITE};

const PAGE_SIZE: usize = 4096;

/// Makes the page containing `addr` writable. The previous protection is not
/// restored; the table stays writable for the life of the process.
unsafe fn unprotect(addr: *const c_void) -> bool {
    let page = (addr as usize / PAGE_SIZE * PAGE_SIZE) as *const c_void;
    let mut old = PAGE_PROTECTION_FLAGS::default();
    VirtualProtect(page, PAGE_SIZE, PAGE_READWRITE, &mut old).is_ok()
}

/// Reads the virtual-function slot at `offset` bytes into `object`'s
/// dispatch table without modifying it.
///
/// # Safety
///
/// Same requirements as [`install`], minus the replacement.
pub unsafe fn read(object: *mut c_void, offset: usize) -> *const c_void {
    let vtable = *(object as *const *const u8);
    *(vtable.add(offset) as *const *const c_void)
}

/// Overwrites the virtual-function slot at `offset` bytes into `object`'s
/// dispatch table and returns the pointer previously stored there.
///
/// If the containing page cannot be made writable the slot is left
/// unmodified, a warning is logged, and the prior pointer is still returned
/// so the caller can delegate unconditionally.
///
/// # Safety
///
/// `object` must point at a live COM-style object whose first machine word
/// is its vtable pointer, `offset` must lie within that table, and
/// `replacement` must have the exact ABI of the function it replaces.
pub unsafe fn install(
    object: *mut c_void,
    offset: usize,
    replacement: *const c_void,
) -> *const c_void {
    let vtable = *(object as *const *const u8);
    let slot = vtable.add(offset) as *mut *const c_void;
    let original = *slot;
    if unprotect(slot.cast()) {
        *slot = replacement;
    } else {
        log::warn!("vtable slot at {slot:p} could not be made writable, hook left uninstalled");
    }
    original
}

#[cfg(test)]
mod tests {
    use super::*;

    // A fake COM object: one machine word pointing at a table we own.
    #[test]
    fn swaps_slot_and_returns_prior_pointer() {
        let mut table: [usize; 4] = [0x1000, 0x2000, 0x3000, 0x4000];
        let mut object = table.as_mut_ptr();
        let object_ptr = &mut object as *mut *mut usize as *mut c_void;

        let offset = 2 * std::mem::size_of::<usize>();
        let original = unsafe { install(object_ptr, offset, 0xABCD_usize as *const c_void) };

        assert_eq!(original as usize, 0x3000);
        assert_eq!(table[2], 0xABCD);
        assert_eq!(table[1], 0x2000);
        assert_eq!(table[3], 0x4000);
    }

    #[test]
    fn reinstall_overwrites_again() {
        let mut table: [usize; 2] = [0x1000, 0x2000];
        let mut object = table.as_mut_ptr();
        let object_ptr = &mut object as *mut *mut usize as *mut c_void;

        let first = unsafe { install(object_ptr, 0, 0xAAAA_usize as *const c_void) };
        let second = unsafe { install(object_ptr, 0, 0xBBBB_usize as *const c_void) };

        assert_eq!(first as usize, 0x1000);
        assert_eq!(second as usize, 0xAAAA);
        assert_eq!(table[0], 0xBBBB);
    }
}
