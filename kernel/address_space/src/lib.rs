//! The per-address-space object: a root page table, an ASID, the region
//! table that backs page-fault dispatch, and the virtual-range allocator
//! carved out of the address space's own span.
//!
//! Everything that walks or mutates the page table goes through
//! [`AddressSpace::lock`], mirroring how the teacher serializes access to a
//! `MappedPages`-owning structure behind a single lock rather than one lock
//! per page table level.

#![no_std]

extern crate alloc;

mod asid;
mod region;

pub use asid::{Asid, AsidAllocation, AsidPool};
pub use pte_flags::AccessKind;
pub use region::{MappedRegion, RegionBackend};

use frame_allocator::allocate_frames;
use log::{error, trace};
use memory_structs::{Page, PageRange, VirtualAddress};
use page_table::PageTable;
use page_table_entry::Pte;
use pte_flags::PteFlags;
use region::RegionTable;
use resource_allocator::Arena;
use spin::Mutex;

/// The privilege level the faulting instruction was executing at, needed to
/// decide whether an unresolvable fault becomes a signal to a process or a
/// kernel panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeLevel {
    User,
    Kernel,
}

/// The result of dispatching a page fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultOutcome {
    /// A mapping was found or established; execution can resume.
    Ok,
    /// The fault occurred inside a user-space copy routine that must abort
    /// and retry rather than have hardware state touched on its behalf.
    Defer,
    /// No region covers the faulting address, or the region's permissions
    /// forbid the attempted access. In `User` mode the caller must signal
    /// the owning process; this layer only reports the outcome; it never
    /// touches process state, which lives outside this core. In `Kernel`
    /// mode this is unconditionally fatal and never returned (see
    /// [`AddressSpace::page_fault`]).
    SegFault,
}

/// One address space: a root page table, its ASID, and the regions mapped
/// into it.
///
/// `lock` serializes every page-table walk and mutation, and also guards
/// the region table, since inserting a region and instantiating its first
/// mapping must be atomic with respect to a concurrent fault on the same
/// address.
pub struct AddressSpace {
    id: u64,
    asid: Mutex<Asid>,
    inner: Mutex<Inner>,
    /// The virtual-range allocator for this address space, backed by the
    /// resource allocator (C2); regions are carved out of here before being
    /// recorded in the region table.
    range_allocator: Arena,
}

struct Inner {
    page_table: PageTable,
    regions: RegionTable,
}

impl AddressSpace {
    /// Creates a new, empty address space with a fresh root page table,
    /// whose virtual ranges are drawn from `[base, base + size)`.
    pub fn new(id: u64, asid_pool: &mut AsidPool, base: usize, size: usize) -> Result<AddressSpace, &'static str> {
        let page_table = PageTable::new()?;
        let range_allocator = Arena::new(base, size)?;
        let asid = match asid_pool.allocate(id) {
            AsidAllocation::Fresh(asid) => asid,
            AsidAllocation::Stolen { asid, evicted_owner } => {
                // The caller is responsible for flushing `evicted_owner`'s
                // TLB entries for `asid` via the TLB manager before this
                // address space's own mappings are used; this layer only
                // surfaces the event.
                trace!(
                    "address_space: ASID {} stolen from address space {} for new address space {}",
                    asid, evicted_owner, id
                );
                asid
            }
        };
        Ok(AddressSpace {
            id,
            asid: Mutex::new(asid),
            inner: Mutex::new(Inner {
                page_table,
                regions: RegionTable::new(),
            }),
            range_allocator,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn asid(&self) -> Asid {
        *self.asid.lock()
    }

    /// Called on every switch into this address space so the ASID pool's
    /// recency order reflects real usage, protecting active address spaces
    /// from having their id stolen.
    pub fn touch(&self, asid_pool: &mut AsidPool) {
        asid_pool.touch(self.asid());
    }

    /// The physical frame holding this address space's root page table,
    /// e.g. to program into CR3/TTBR0 on a context switch.
    pub fn root_frame(&self) -> memory_structs::Frame {
        self.inner.lock().page_table.root_frame()
    }

    /// Allocates `size_in_pages` contiguous pages of virtual address space
    /// and maps an anonymous region over them with `flags`, backing frames
    /// allocated lazily on first fault.
    pub fn map_anonymous(
        &self,
        size_in_pages: usize,
        flags: PteFlags,
    ) -> Result<PageRange, &'static str> {
        let size_in_bytes = size_in_pages
            .checked_mul(kernel_config::memory::PAGE_SIZE)
            .ok_or("address_space: requested size overflows")?;
        let base = self
            .range_allocator
            .allocate(size_in_bytes, kernel_config::memory::PAGE_SIZE)
            .ok_or("address_space: virtual address space exhausted")?;
        let start = Page::containing_address(VirtualAddress::new_canonical(base));
        let end = Page::containing_address(VirtualAddress::new_canonical(
            base + size_in_bytes - kernel_config::memory::PAGE_SIZE,
        ));
        let pages = PageRange::new(start, end);
        self.inner.lock().regions.insert(MappedRegion {
            pages,
            flags,
            backend: RegionBackend::Anonymous,
        })?;
        Ok(pages)
    }

    /// Maps a region whose backing frames are already decided (e.g. device
    /// MMIO or identity-mapped kernel data) at `pages`, establishing every
    /// leaf mapping immediately rather than waiting for a fault.
    pub fn map_fixed(
        &self,
        pages: PageRange,
        first_frame: memory_structs::Frame,
        flags: PteFlags,
    ) -> Result<(), &'static str> {
        let mut inner = self.inner.lock();
        inner.regions.insert(MappedRegion {
            pages,
            flags,
            backend: RegionBackend::Fixed,
        })?;
        let mut frame = first_frame;
        for page in pages.start().number()..=pages.end().number() {
            let page = Page::containing_address(VirtualAddress::new_canonical(
                page * kernel_config::memory::PAGE_SIZE,
            ));
            // SAFETY: the caller holds no conflicting mapping for `page`,
            // guaranteed by `regions.insert`'s overlap check above, and the
            // inner lock is held for the whole walk.
            unsafe {
                inner.page_table.map_insert(page, frame, flags)?;
            }
            frame = frame + 1;
        }
        Ok(())
    }

    /// Dispatches a page fault at `vaddr` with the given access kind,
    /// per the core's page-fault policy:
    ///
    /// 1. no covering region, or a region whose permissions forbid
    ///    `access_kind`, is a segmentation fault;
    /// 2. otherwise the region's backend obtains a frame and the mapping is
    ///    installed.
    ///
    /// In `Kernel` mode a segmentation fault is unconditionally fatal and
    /// this function never returns in that case; in `User` mode it returns
    /// [`PageFaultOutcome::SegFault`] so the caller (outside this core) can
    /// signal the owning process.
    pub fn page_fault(
        &self,
        vaddr: VirtualAddress,
        access_kind: AccessKind,
        privilege: PrivilegeLevel,
    ) -> PageFaultOutcome {
        let page = Page::containing_address(vaddr);
        let mut inner = self.inner.lock();

        let region = match inner.regions.find(page) {
            Some(region) => *region,
            None => return self.segfault(vaddr, privilege, "no region covers this address"),
        };
        if !region.flags.permits(access_kind) {
            return self.segfault(vaddr, privilege, "region permissions forbid this access");
        }

        let frame = match region.backend {
            RegionBackend::Anonymous => match allocate_frames(1) {
                Some(af) => {
                    let frame = *af.start();
                    core::mem::forget(af);
                    frame
                }
                None => return self.segfault(vaddr, privilege, "out of physical memory"),
            },
            RegionBackend::Fixed => {
                // A fault inside a region whose mappings are all
                // established up front at `map_fixed` time means the entry
                // was removed from under us, which never legitimately
                // happens in this workspace.
                return self.segfault(vaddr, privilege, "fault inside a fixed region");
            }
        };

        // SAFETY: `inner`'s lock is held for the whole walk.
        let result = unsafe { inner.page_table.map_insert(page, frame, region.flags) };
        match result {
            Ok(()) => PageFaultOutcome::Ok,
            Err(reason) => {
                error!("address_space: failed to install mapping for {:?}: {}", page, reason);
                self.segfault(vaddr, privilege, reason)
            }
        }
    }

    /// Looks up `page` on behalf of a software-refill TLB miss, setting the
    /// entry's *accessed* flag (and, for a write access, its *dirty* flag).
    /// Returns `None` if there is no present mapping or a write is
    /// attempted against a read-only mapping, in which case the caller
    /// falls back to [`AddressSpace::page_fault`].
    pub fn tlb_refill_lookup(&self, page: Page, access_kind: AccessKind) -> Option<Pte> {
        let mut inner = self.inner.lock();
        // SAFETY: `inner`'s lock is held for the whole lookup.
        let pte = unsafe { inner.page_table.map_find(page) }?;
        if !pte.is_present() {
            return None;
        }
        if access_kind == AccessKind::Write && !pte.flags().is_writable() {
            return None;
        }
        pte.mark_accessed();
        if access_kind == AccessKind::Write {
            pte.mark_dirty();
        }
        Some(*pte)
    }

    fn segfault(
        &self,
        vaddr: VirtualAddress,
        privilege: PrivilegeLevel,
        reason: &'static str,
    ) -> PageFaultOutcome {
        match privilege {
            PrivilegeLevel::User => {
                trace!(
                    "address_space: segmentation fault in address space {} at {:?}: {}",
                    self.id, vaddr, reason
                );
                PageFaultOutcome::SegFault
            }
            PrivilegeLevel::Kernel => {
                panic!("unhandled kernel-mode page fault at {:?}: {}", vaddr, reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    fn ensure_frame_allocator_initialized() {
        static INIT: self::std::sync::Once = self::std::sync::Once::new();
        INIT.call_once(|| {
            let area = memory_structs::PhysicalMemoryArea::new(
                memory_structs::PhysicalAddress::new_canonical(0x0040_0000),
                0x1000_0000,
                1,
            );
            frame_allocator::init(core::iter::once(area))
                .expect("failed to set up a test frame allocator");
        });
    }

    #[test]
    fn map_anonymous_then_fault_installs_a_mapping() {
        ensure_frame_allocator_initialized();
        let mut pool = AsidPool::new();
        let asp = AddressSpace::new(1, &mut pool, 0x1000_0000, 0x1000_0000).unwrap();
        let pages = asp.map_anonymous(4, PteFlags::present().writable()).unwrap();
        let outcome = asp.page_fault(pages.start().start_address(), AccessKind::Write, PrivilegeLevel::User);
        assert_eq!(outcome, PageFaultOutcome::Ok);
    }

    #[test]
    fn fault_outside_any_region_is_a_user_segfault() {
        ensure_frame_allocator_initialized();
        let mut pool = AsidPool::new();
        let asp = AddressSpace::new(2, &mut pool, 0x2000_0000, 0x1000_0000).unwrap();
        let vaddr = VirtualAddress::new_canonical(0x2000_0000);
        let outcome = asp.page_fault(vaddr, AccessKind::Read, PrivilegeLevel::User);
        assert_eq!(outcome, PageFaultOutcome::SegFault);
    }

    #[test]
    #[should_panic(expected = "unhandled kernel-mode page fault")]
    fn fault_outside_any_region_in_kernel_mode_panics() {
        ensure_frame_allocator_initialized();
        let mut pool = AsidPool::new();
        let asp = AddressSpace::new(3, &mut pool, 0x3000_0000, 0x1000_0000).unwrap();
        let vaddr = VirtualAddress::new_canonical(0x3000_0000);
        asp.page_fault(vaddr, AccessKind::Read, PrivilegeLevel::Kernel);
    }

    #[test]
    fn write_fault_on_read_only_region_is_a_segfault() {
        ensure_frame_allocator_initialized();
        let mut pool = AsidPool::new();
        let asp = AddressSpace::new(4, &mut pool, 0x4000_0000, 0x1000_0000).unwrap();
        let pages = asp.map_anonymous(1, PteFlags::present()).unwrap();
        let outcome = asp.page_fault(pages.start().start_address(), AccessKind::Write, PrivilegeLevel::User);
        assert_eq!(outcome, PageFaultOutcome::SegFault);
    }
}
