//! Invalidate-only TLB management for hardware that walks the page table
//! itself: AMD64 (`invlpg`/full flush) and ARMv8 (`tlbi`).
//!
//! The real instructions are privileged and cannot be issued from a hosted
//! test process, so each implementation's effect is additionally tracked in
//! a `#[cfg(test)]` shadow set that the unit tests below assert against,
//! mirroring how `page_table` stands in for the physical-memory linear map
//! under test.

use super::{Asid, TlbInvalidate};
use kernel_config::memory::PAGE_SIZE;
use memory_structs::VirtualAddress;

#[cfg(target_arch = "aarch64")]
use cortex_a::asm::barrier;

/// The invalidate-only manager selected for this build's target
/// architecture.
#[cfg(target_arch = "aarch64")]
pub type HardwareTlb = Aarch64Tlb;
#[cfg(not(target_arch = "aarch64"))]
pub type HardwareTlb = Amd64Tlb;

#[cfg(test)]
mod shadow {
    //! Records every invalidation request issued by the hardware managers
    //! under test, since the real instructions can't run in a hosted
    //! process.
    extern crate std;

    use self::std::sync::Mutex;
    use self::std::vec::Vec;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        All,
        Asid(u16),
        Pages { asid: u16, start: usize, count: usize },
    }

    static LOG: Mutex<Vec<Event>> = Mutex::new(Vec::new());

    pub fn record(event: Event) {
        LOG.lock().unwrap().push(event);
    }

    pub fn take() -> Vec<Event> {
        core::mem::take(&mut *LOG.lock().unwrap())
    }
}

/// AMD64: no ASID tagging is assumed (PCID support is an optional
/// refinement left to the target's boot negotiation), so `invalidate_asid`
/// degrades to a full flush.
pub struct Amd64Tlb;

impl TlbInvalidate for Amd64Tlb {
    fn invalidate_all(&self) {
        #[cfg(test)]
        shadow::record(shadow::Event::All);
        #[cfg(not(test))]
        #[cfg(target_arch = "x86_64")]
        unsafe {
            // Reloading CR3 with its current value flushes every
            // non-global TLB entry.
            let cr3: u64;
            core::arch::asm!("mov {}, cr3", out(reg) cr3);
            core::arch::asm!("mov cr3, {}", in(reg) cr3);
        }
    }

    fn invalidate_asid(&self, _asid: Asid) {
        self.invalidate_all();
    }

    fn invalidate_pages(&self, _asid: Asid, start: VirtualAddress, count: usize) {
        #[cfg(test)]
        shadow::record(shadow::Event::Pages {
            asid: _asid,
            start: start.value(),
            count,
        });
        #[cfg(not(test))]
        #[cfg(target_arch = "x86_64")]
        for i in 0..count {
            let addr = start.value() + i * PAGE_SIZE;
            unsafe {
                core::arch::asm!("invlpg [{}]", in(reg) addr);
            }
        }
    }
}

/// ARMv8: `tlbi aside1` flushes everything tagged with an ASID in one
/// instruction, so unlike AMD64 this target can do a precise per-ASID
/// invalidation.
pub struct Aarch64Tlb;

impl TlbInvalidate for Aarch64Tlb {
    fn invalidate_all(&self) {
        #[cfg(test)]
        shadow::record(shadow::Event::All);
        #[cfg(not(test))]
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("tlbi vmalle1");
            barrier::dsb(barrier::ISH);
            barrier::isb(barrier::SY);
        }
    }

    fn invalidate_asid(&self, asid: Asid) {
        #[cfg(test)]
        shadow::record(shadow::Event::Asid(asid));
        #[cfg(not(test))]
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("tlbi aside1, {:x}", in(reg) asid as u64);
            barrier::dsb(barrier::ISH);
            barrier::isb(barrier::SY);
        }
    }

    fn invalidate_pages(&self, asid: Asid, start: VirtualAddress, count: usize) {
        #[cfg(test)]
        shadow::record(shadow::Event::Pages {
            asid,
            start: start.value(),
            count,
        });
        #[cfg(not(test))]
        #[cfg(target_arch = "aarch64")]
        unsafe {
            for i in 0..count {
                let vaddr = start.value() + i * PAGE_SIZE;
                // `tlbi vae1` takes a page number tagged with the ASID in
                // its upper bits, per the Armv8 VMSA encoding.
                let operand = ((asid as u64) << 48) | (vaddr as u64 >> 12);
                core::arch::asm!("tlbi vae1, {}", in(reg) operand);
            }
            barrier::dsb(barrier::ISH);
            barrier::isb(barrier::SY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amd64_invalidate_asid_degrades_to_full_flush() {
        shadow::take();
        let tlb = Amd64Tlb;
        tlb.invalidate_asid(3);
        assert_eq!(shadow::take(), alloc::vec![shadow::Event::All]);
    }

    #[test]
    fn aarch64_invalidate_asid_is_precise() {
        shadow::take();
        let tlb = Aarch64Tlb;
        tlb.invalidate_asid(7);
        assert_eq!(shadow::take(), alloc::vec![shadow::Event::Asid(7)]);
    }

    #[test]
    fn invalidate_pages_records_requested_range() {
        shadow::take();
        let tlb = Aarch64Tlb;
        tlb.invalidate_pages(1, VirtualAddress::new_canonical(0x1000), 4);
        assert_eq!(
            shadow::take(),
            alloc::vec![shadow::Event::Pages { asid: 1, start: 0x1000, count: 4 }]
        );
    }
}
