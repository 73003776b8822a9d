//! Software refill-on-miss: the hardware model of MIPS, IA-64, and
//! PowerPC-style CPUs, where a TLB (or hash-table) miss raises an
//! exception that software must service by walking the generic page table
//! and installing a hardware entry itself.
//!
//! Two shapes of hardware are modeled:
//!
//! - A plain associative TLB (MIPS, IA-64): [`SoftwareTlb::on_miss`]
//!   installs one entry per miss, no eviction policy needed beyond what the
//!   hardware does internally.
//! - A hashed page table (PowerPC): [`HashedPageTable::on_miss`] computes
//!   primary/secondary PTEG indices, probes the 8 slots of each, and
//!   evicts a pseudo-random victim when both are full.

use address_space::{AccessKind, AddressSpace, Asid, PageFaultOutcome, PrivilegeLevel};
use memory_structs::{Page, VirtualAddress};
use page_table_entry::Pte;

/// The kind of exception that triggered a refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillCause {
    /// A TLB miss: no entry at all for this address.
    Miss(AccessKind),
    /// MIPS Modify exception: an entry exists but the access was a write
    /// and the hardware requires software to confirm the PTE is writable
    /// before setting *dirty*.
    Modify,
}

/// The outcome of servicing a refill exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillOutcome {
    /// A hardware entry was installed (or, for `Modify`, confirmed
    /// writable and marked dirty); execution resumes.
    Installed,
    /// No valid mapping covers the address, or a `Modify` exception hit a
    /// read-only page: escalate to [`AddressSpace::page_fault`].
    PageFault(PageFaultOutcome),
    /// The MIPS-specific case where the TLB-invalid handler observes EXL
    /// (exception level) already set in the hardware context, meaning this
    /// exception interrupted another exception still being serviced (e.g.
    /// a kernel copy-to/from-userspace routine racing with an interrupt).
    /// The handler must re-enter refill from the top rather than treat
    /// this as an ordinary miss, per the target's documented EXL handling;
    /// which conditions actually require this is intentionally left to be
    /// revisited per MIPS variant (the source does not document its
    /// reasoning further).
    ReentrantRefill,
}

/// A fully decoded hardware TLB entry, ready for the architecture's fill
/// instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareEntry {
    pub asid: Asid,
    pub page: Page,
    pub pte: Pte,
}

/// The refill-on-miss manager for a plain associative TLB (MIPS, IA-64).
pub struct SoftwareTlb;

impl SoftwareTlb {
    /// Services a refill exception for `page` in `asid`'s address space.
    ///
    /// `exl_set` models the MIPS EXL status bit read from the hardware
    /// context; on targets without such a bit the caller always passes
    /// `false`.
    pub fn on_miss(
        &self,
        asp: &AddressSpace,
        asid: Asid,
        page: Page,
        cause: RefillCause,
        exl_set: bool,
    ) -> RefillOutcome {
        if exl_set {
            return RefillOutcome::ReentrantRefill;
        }

        let access_kind = match cause {
            RefillCause::Miss(kind) => kind,
            RefillCause::Modify => AccessKind::Write,
        };

        match asp.tlb_refill_lookup(page, access_kind) {
            Some(_pte) => RefillOutcome::Installed,
            None => {
                let vaddr = page.start_address();
                let outcome = asp.page_fault(vaddr, access_kind, PrivilegeLevel::User);
                RefillOutcome::PageFault(outcome)
            }
        }
    }

    /// Encodes the hardware entry for `page`'s current PTE, as the final
    /// step of step 4 in the refill sequence (ASID, virtual page, frame,
    /// cacheability, writable, global); the caller writes it with the
    /// architecture's fill instruction.
    pub fn encode(&self, asid: Asid, page: Page, pte: Pte) -> HardwareEntry {
        HardwareEntry { asid, page, pte }
    }
}

/// Chooses which of a full PTEG's 8 slots to evict.
///
/// A trait rather than a single hard-coded policy because the source's
/// choice of a linear-congruential generator seeded with the constant 42
/// (see [`LcgVictimSelector`]) is of undocumented intent (open question:
/// whether 42 is deliberate or a placeholder); keeping it behind a trait
/// lets a port swap in a different policy without touching the hash-table
/// walk itself.
pub trait VictimSelector {
    /// Returns the index (0..8) of the slot to evict from a full PTEG.
    fn choose(&mut self) -> usize;
}

/// The source's victim selector: a linear-congruential generator seeded
/// with the constant 42, taken verbatim from the source's seed since nothing
/// suggests it was meant to be configurable. The generator's own constants
/// are a stand-in LCG, not a verified match to the source's `RANDI` macro.
pub struct LcgVictimSelector {
    state: u32,
}

impl LcgVictimSelector {
    pub fn new() -> LcgVictimSelector {
        LcgVictimSelector { state: 42 }
    }
}

impl Default for LcgVictimSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl VictimSelector for LcgVictimSelector {
    fn choose(&mut self) -> usize {
        // A plausible stand-in LCG (Numerical Recipes parameters); the
        // original RANDI macro's exact constants aren't in the retrieved pack.
        self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        ((self.state >> 24) % 8) as usize
    }
}

const PTEG_SLOTS: usize = 8;
const HASH_TABLE_PTEGS: usize = 1024;

#[derive(Clone, Copy, Default, PartialEq, Eq)]
struct HashSlot {
    occupied: bool,
    asid: Asid,
    page: Page_,
    pte: Pte,
}

// `Page` has no `Default`; store its raw page number instead and
// reconstruct on read, so `HashSlot` can derive `Default`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
struct Page_(usize);

/// The PowerPC-style hashed page table: a software-maintained hash table
/// of PTEs, consulted by hardware on every memory access, kept consistent
/// with the generic page table by this manager.
pub struct HashedPageTable<V: VictimSelector = LcgVictimSelector> {
    // A boxed slice, not a boxed array: building `HASH_TABLE_PTEGS *
    // PTEG_SLOTS` slots as a `[HashSlot; N]` array-repeat expression first
    // would materialize the whole table as a stack temporary before it
    // could be boxed, which is too large for a kernel stack.
    table: alloc::boxed::Box<[HashSlot]>,
    victim_selector: V,
}

fn primary_pteg(asid: Asid, page: Page) -> usize {
    (asid as usize ^ page.number()) % HASH_TABLE_PTEGS
}

fn secondary_pteg(primary: usize) -> usize {
    (!primary) % HASH_TABLE_PTEGS
}

impl<V: VictimSelector> HashedPageTable<V> {
    pub fn new(victim_selector: V) -> HashedPageTable<V> {
        let table = alloc::vec![HashSlot::default(); HASH_TABLE_PTEGS * PTEG_SLOTS].into_boxed_slice();
        HashedPageTable { table, victim_selector }
    }

    fn pteg_slots(&self, pteg: usize) -> &[HashSlot] {
        &self.table[pteg * PTEG_SLOTS..(pteg + 1) * PTEG_SLOTS]
    }

    fn pteg_slots_mut(&mut self, pteg: usize) -> &mut [HashSlot] {
        &mut self.table[pteg * PTEG_SLOTS..(pteg + 1) * PTEG_SLOTS]
    }

    /// Looks for an existing entry for `(asid, page)` in its primary or
    /// secondary PTEG.
    pub fn probe(&self, asid: Asid, page: Page) -> Option<Pte> {
        let primary = primary_pteg(asid, page);
        let secondary = secondary_pteg(primary);
        for pteg in [primary, secondary] {
            for slot in self.pteg_slots(pteg) {
                if slot.occupied && slot.asid == asid && slot.page.0 == page.number() {
                    return Some(slot.pte);
                }
            }
        }
        None
    }

    /// Installs `pte` for `(asid, page)`, probing the primary PTEG first,
    /// then the secondary, and evicting a pseudo-random victim from the
    /// primary PTEG if both are full.
    fn install(&mut self, asid: Asid, page: Page, pte: Pte) {
        let primary = primary_pteg(asid, page);
        let secondary = secondary_pteg(primary);
        for pteg in [primary, secondary] {
            if let Some(slot) = self.pteg_slots_mut(pteg).iter_mut().find(|s| !s.occupied) {
                *slot = HashSlot { occupied: true, asid, page: Page_(page.number()), pte };
                return;
            }
        }
        let victim = self.victim_selector.choose();
        self.pteg_slots_mut(primary)[victim] =
            HashSlot { occupied: true, asid, page: Page_(page.number()), pte };
    }

    /// Services a refill exception, consulting the generic page table via
    /// `asp` on a true software miss and installing the result into the
    /// hash table so the hardware finds it directly next time.
    pub fn on_miss(&mut self, asp: &AddressSpace, asid: Asid, page: Page, access_kind: AccessKind) -> RefillOutcome {
        match asp.tlb_refill_lookup(page, access_kind) {
            Some(pte) => {
                self.install(asid, page, pte);
                RefillOutcome::Installed
            }
            None => {
                let outcome = asp.page_fault(page.start_address(), access_kind, PrivilegeLevel::User);
                RefillOutcome::PageFault(outcome)
            }
        }
    }

    /// Invalidates every hash-table entry tagged with `asid`, as required
    /// by `tlb_invalidate_asid` on this target.
    pub fn invalidate_asid(&mut self, asid: Asid) {
        for slot in self.table.iter_mut() {
            if slot.occupied && slot.asid == asid {
                slot.occupied = false;
            }
        }
    }
}

/// Unused directly but documents the `VirtualAddress`-keyed variant of
/// `tlb_invalidate_pages` that a `HashedPageTable` caller uses to flush a
/// contiguous run without walking the whole table.
pub fn pages_in_range(start: VirtualAddress, count: usize) -> impl Iterator<Item = Page> {
    let first = Page::containing_address(start);
    (0..count).map(move |i| first + i)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn lcg_victim_selector_is_deterministic_from_seed_42() {
        let mut a = LcgVictimSelector::new();
        let mut b = LcgVictimSelector::new();
        for _ in 0..16 {
            assert_eq!(a.choose(), b.choose());
        }
    }

    #[test]
    fn lcg_victim_selector_stays_in_range() {
        let mut sel = LcgVictimSelector::new();
        for _ in 0..1000 {
            assert!(sel.choose() < PTEG_SLOTS);
        }
    }

    fn ensure_frame_allocator_initialized() {
        static INIT: self::std::sync::Once = self::std::sync::Once::new();
        INIT.call_once(|| {
            let area = memory_structs::PhysicalMemoryArea::new(
                memory_structs::PhysicalAddress::new_canonical(0x0080_0000),
                0x1000_0000,
                1,
            );
            frame_allocator::init(core::iter::once(area))
                .expect("failed to set up a test frame allocator");
        });
    }

    #[test]
    fn hashed_page_table_roundtrips_through_install_and_probe() {
        ensure_frame_allocator_initialized();
        let mut pool = address_space::AsidPool::new();
        let asp = AddressSpace::new(1, &mut pool, 0x5000_0000, 0x1000_0000).unwrap();
        let pages = asp
            .map_anonymous(1, pte_flags::PteFlags::present().writable())
            .unwrap();
        let page = *pages.start();

        // A hash-table miss only installs a hardware entry for a page the
        // generic page table already maps; the very first touch of a freshly
        // `map_anonymous`-ed page still has to go through a full page fault
        // to get a backing frame at all, exercised separately above.
        let fault_outcome = asp.page_fault(page.start_address(), AccessKind::Write, PrivilegeLevel::User);
        assert_eq!(fault_outcome, PageFaultOutcome::Ok);

        let mut hpt = HashedPageTable::new(LcgVictimSelector::new());
        let outcome = hpt.on_miss(&asp, 9, page, AccessKind::Read);
        assert_eq!(outcome, RefillOutcome::Installed);
        assert!(hpt.probe(9, page).is_some());
    }

    #[test]
    fn software_tlb_escalates_an_unmapped_miss_to_page_fault() {
        ensure_frame_allocator_initialized();
        let mut pool = address_space::AsidPool::new();
        let asp = AddressSpace::new(2, &mut pool, 0x6000_0000, 0x1000_0000).unwrap();
        let page = Page::containing_address(VirtualAddress::new_canonical(0x6000_0000));

        let tlb = SoftwareTlb;
        let outcome = tlb.on_miss(&asp, 1, page, RefillCause::Miss(AccessKind::Read), false);
        assert_eq!(
            outcome,
            RefillOutcome::PageFault(PageFaultOutcome::SegFault)
        );
    }

    #[test]
    fn exl_set_forces_reentrant_refill() {
        ensure_frame_allocator_initialized();
        let mut pool = address_space::AsidPool::new();
        let asp = AddressSpace::new(3, &mut pool, 0x7000_0000, 0x1000_0000).unwrap();
        let page = Page::containing_address(VirtualAddress::new_canonical(0x7000_0000));

        let tlb = SoftwareTlb;
        let outcome = tlb.on_miss(&asp, 1, page, RefillCause::Miss(AccessKind::Read), true);
        assert_eq!(outcome, RefillOutcome::ReentrantRefill);
    }
}
