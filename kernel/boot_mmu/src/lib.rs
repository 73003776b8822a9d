//! Builds the kernel's very first page table and switches the MMU on.
//!
//! Before this point, the kernel runs wherever the bootloader left it: on
//! most architectures that's either an identity-mapped address space or no
//! paging at all. [`build_boot_page_table`] constructs a table that maps
//! the low region of physical memory twice, once 1:1 and once again at
//! [`kernel_config::memory::KERNEL_OFFSET`], so that execution survives the
//! switchover no matter which of the two addresses the next instruction
//! fetch uses. [`enable_mmu`] then installs that table and turns the MMU
//! on, one architecture-specific register write at a time.
//!
//! Once a fuller page table exists (built by the rest of the kernel's boot
//! sequence), it replaces this one via the ordinary `PageTable::switch`
//! path; nothing here is meant to stay the active table for long.

#![no_std]

mod arch;

use frame_allocator::allocate_frames_at;
use kernel_config::memory::{HARDWARE_END, HARDWARE_START, KERNEL_OFFSET, PAGE_SIZE};
use log::debug;
use memory_structs::{Frame, Page, PhysicalAddress, VirtualAddress};
pub use page_table::PageTable;
use page_table::PteFlags;

/// Builds a fresh page table identity-mapping `[0, identity_size_in_bytes)`
/// and double-mapping the same range at `KERNEL_OFFSET`.
///
/// Each identity-mapped physical frame is first reserved through
/// [`allocate_frames_at`] so the general-purpose allocator never hands it
/// out again later; this table keeps those frames mapped for as long as it
/// is in use, so their handles are deliberately leaked rather than freed.
///
/// Each page is marked [`PteFlags::NO_CACHE`] if it falls inside
/// `kernel_config::memory::HARDWARE_START..HARDWARE_END`, cacheable
/// otherwise; this boot-time map only ever covers the fixed low-memory MMIO
/// window reported by that range, not any MMIO later mapped on demand by
/// device drivers.
pub fn build_boot_page_table(identity_size_in_bytes: usize) -> Result<PageTable, &'static str> {
    let mut table = PageTable::new()?;
    let num_pages = identity_size_in_bytes.div_ceil(PAGE_SIZE);

    for page_number in 0..num_pages {
        let phys_addr = PhysicalAddress::new_canonical(page_number * PAGE_SIZE);
        let reserved = allocate_frames_at(phys_addr, 1)?;
        let frame = *reserved.start();
        core::mem::forget(reserved);

        let flags = flags_for(phys_addr);

        let identity_page = Page::containing_address(VirtualAddress::new_canonical(phys_addr.value()));
        unsafe { table.map_insert(identity_page, frame, flags)? };

        let high_half_page =
            Page::containing_address(VirtualAddress::new_canonical(KERNEL_OFFSET + phys_addr.value()));
        unsafe { table.map_insert(high_half_page, frame, flags)? };
    }

    debug!("boot_mmu: identity-mapped and high-half double-mapped {num_pages} pages");
    Ok(table)
}

/// Present, writable, and non-cacheable if `phys_addr`'s page overlaps the
/// fixed MMIO window; cacheable otherwise.
fn flags_for(phys_addr: PhysicalAddress) -> PteFlags {
    let start = phys_addr.value() as u64;
    let end = start + PAGE_SIZE as u64;
    let overlaps_hardware = start < HARDWARE_END && end > HARDWARE_START;

    let mut flags = PteFlags::present().writable();
    if overlaps_hardware {
        flags |= PteFlags::NO_CACHE;
    }
    flags
}

/// Installs `table` as the active page table and turns the MMU on.
///
/// # Safety
/// `table` must already hold every mapping execution will touch the instant
/// the MMU goes live: at minimum the current instruction pointer and the
/// current stack, which is exactly what [`build_boot_page_table`]'s
/// identity and high-half double map guarantee as long as the kernel itself
/// sits inside `[0, identity_size_in_bytes)`.
pub unsafe fn enable_mmu(table: &PageTable) {
    arch::enable_mmu(table.root_frame());
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;

    fn ensure_frame_allocator_initialized() {
        static INIT: self::std::sync::Once = self::std::sync::Once::new();
        INIT.call_once(|| {
            let area = memory_structs::PhysicalMemoryArea::new(
                PhysicalAddress::new_canonical(0),
                16 * 1024 * 1024,
                1,
            );
            let _ = frame_allocator::init(core::iter::once(area));
        });
    }

    #[test]
    fn identity_and_high_half_pages_both_resolve_to_the_same_frame() {
        ensure_frame_allocator_initialized();
        let table = build_boot_page_table(4 * PAGE_SIZE).expect("failed to build boot page table");

        let phys_addr = PhysicalAddress::new_canonical(2 * PAGE_SIZE);
        let expected_frame = Frame::containing_address(phys_addr);

        let identity_page = Page::containing_address(VirtualAddress::new_canonical(phys_addr.value()));
        let high_half_page =
            Page::containing_address(VirtualAddress::new_canonical(KERNEL_OFFSET + phys_addr.value()));

        let mut table = table;
        assert_eq!(unsafe { table.map_find(identity_page) }.and_then(|p| p.frame()), Some(expected_frame));
        assert_eq!(unsafe { table.map_find(high_half_page) }.and_then(|p| p.frame()), Some(expected_frame));
    }

    #[test]
    fn hardware_window_pages_are_marked_non_cacheable() {
        let inside = PhysicalAddress::new_canonical(HARDWARE_START as usize);
        let outside = PhysicalAddress::new_canonical(0);
        assert!(!flags_for(inside).is_cacheable());
        assert!(flags_for(outside).is_cacheable());
    }
}
