//! x86_64 has no single "turn the MMU on" register the way aarch64's
//! `SCTLR_EL1` does: the page-table base, paging enable, and cache-control
//! bits live in separate control registers. This loads them in the order
//! that keeps the currently-executing code mapped at every step: install
//! the new root first, then flip paging and caching on together.

use memory_structs::Frame;

/// # Safety
/// `root_frame` must hold a page table that maps the currently-executing
/// code and stack, identically to how they are already mapped (or not
/// mapped at all, if paging was previously disabled).
pub unsafe fn enable_mmu(root_frame: Frame) {
    #[cfg(target_arch = "x86_64")]
    {
        use core::arch::asm;

        let phys = root_frame.start_address().value() as u64;
        asm!("mov cr3, {}", in(reg) phys, options(nostack, preserves_flags));

        let mut cr0: u64;
        asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        // Paging enable (bit 31) and write-protect (bit 16) go on, cache
        // disable (bit 30) and not-write-through (bit 29) go off, in the
        // same instruction: half-enabled paging with caching still off (or
        // vice versa) is not a state this kernel ever wants to observe.
        cr0 |= 1 << 31;
        cr0 |= 1 << 16;
        cr0 &= !(1 << 30);
        cr0 &= !(1 << 29);
        asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = root_frame;
        unreachable!("boot_mmu::arch::x86_64::enable_mmu called on a non-x86_64 target");
    }
}
