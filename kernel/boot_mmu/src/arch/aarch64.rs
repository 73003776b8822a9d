//! aarch64 keeps every translation parameter in `MAIR_EL1`/`TCR_EL1`, the
//! root in `TTBR0_EL1`, and flips the MMU, data cache, and instruction
//! cache on together in a single `SCTLR_EL1` write, mirroring how
//! `memory_aarch64::configure_translation_registers`/`enable_mmu` set up
//! Theseus's own translation tables.

use cortex_a::asm::barrier;
use cortex_a::registers::*;
use memory_structs::Frame;
use tock_registers::interfaces::{ReadWriteable, Writeable};

/// Theseus-style fixed ASID for the kernel's own address space; user
/// address spaces get their ASID from [`address_space::AsidPool`] instead.
const BOOT_ASID: u64 = 0;

/// # Safety
/// `root_frame` must hold a page table that maps the currently-executing
/// code and stack, identically to how they are already mapped (or not
/// mapped at all, if paging was previously disabled).
pub unsafe fn enable_mmu(root_frame: Frame) {
    invalidate_icache();
    configure_translation_registers();
    set_root(root_frame);

    SCTLR_EL1.modify(SCTLR_EL1::M::Enable + SCTLR_EL1::C::Cacheable + SCTLR_EL1::I::Cacheable);
    barrier::isb(barrier::SY);
}

/// ARMv7 and later require the instruction cache to be explicitly
/// invalidated before it can be trusted to hold translations made under
/// the new page table.
fn invalidate_icache() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        core::arch::asm!("ic iallu");
        barrier::dsb(barrier::ISH);
        barrier::isb(barrier::SY);
    }
}

fn configure_translation_registers() {
    MAIR_EL1.write(
        // Attribute 1: device memory, non-cacheable.
        MAIR_EL1::Attr1_Device::nonGathering_nonReordering_EarlyWriteAck +
        // Attribute 0: normal, cacheable DRAM.
        MAIR_EL1::Attr0_Normal_Outer::WriteBack_NonTransient_ReadWriteAlloc +
        MAIR_EL1::Attr0_Normal_Inner::WriteBack_NonTransient_ReadWriteAlloc,
    );

    TCR_EL1.write(
        TCR_EL1::TBI0::Used
            + TCR_EL1::TG0::KiB_4
            + TCR_EL1::AS::ASID8Bits
            + TCR_EL1::IPS::Bits_48
            + TCR_EL1::EPD0::EnableTTBR0Walks
            + TCR_EL1::A1::TTBR0
            + TCR_EL1::T0SZ.val(16)
            + TCR_EL1::HA::Enable
            + TCR_EL1::HD::Enable,
    );

    unsafe { barrier::isb(barrier::SY) };
}

fn set_root(root_frame: Frame) {
    let phys = root_frame.start_address().value() as u64;
    TTBR0_EL1.write(TTBR0_EL1::ASID.val(BOOT_ASID) + TTBR0_EL1::BADDR.val(phys >> 1));
    unsafe { barrier::isb(barrier::SY) };
}
