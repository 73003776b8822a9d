//! The hierarchical page table: `map_insert`, `map_remove`, `map_find`.
//!
//! A page table is a tree of up to [`kernel_config::memory::NUM_PAGE_TABLE_LEVELS`]
//! levels, root first. The entry count at each level is an architecture
//! parameter (see [`level_index`]); a level with zero entries collapses,
//! contributing no address bits and requiring no table of its own, which is
//! how a two-level hardware MMU is modeled without a second code path.
//!
//! Table memory is reached through the kernel's linear map of physical
//! memory (`kernel_config::memory::PHYSICAL_MEMORY_OFFSET`) rather than a
//! recursive self-mapping trick: the frame layer's `KERNEL_ACCESSIBLE`
//! guarantee is exactly this linear map, so every frame this crate
//! allocates for an intermediate table is immediately addressable.

#![no_std]

extern crate alloc;

use alloc::vec::Vec;
use frame_allocator::{allocate_frames, AllocatedFrames};
use hashbrown::HashMap;
use kernel_config::memory::{
    NUM_PAGE_TABLE_LEVELS, PAGE_SHIFT, PAGE_TABLE_LEVEL_ENTRIES, PHYSICAL_MEMORY_OFFSET,
};
use log::trace;
use memory_structs::{Frame, Page, PhysicalAddress};
pub use page_table_entry::{Pte, PteFlags};

/// The number of `Pte` slots materialized for any non-collapsed level.
///
/// All levels the two shipped architectures (x86_64, aarch64) actually use
/// are 512 entries wide; a collapsed level (zero entries) never gets a
/// table of this size in the first place.
const TABLE_ENTRIES: usize = 512;

/// Translates a table's physical frame into a slice of its entries through
/// the kernel's linear map of physical memory.
///
/// # Safety
/// `frame` must be a frame that is currently used as a page table of this
/// hierarchy (i.e., either the root, or a frame previously handed out by
/// [`PageTable::alloc_intermediate_table`]), so that interpreting its
/// contents as `[Pte; TABLE_ENTRIES]` is valid.
#[cfg(not(test))]
unsafe fn table_from_frame<'a>(frame: Frame) -> &'a mut [Pte] {
    let virt = PHYSICAL_MEMORY_OFFSET + frame.start_address().value();
    core::slice::from_raw_parts_mut(virt as *mut Pte, TABLE_ENTRIES)
}

/// Under `cargo test`, there is no real linear map of physical memory to
/// dereference: the hosted test process has its own address space, not the
/// kernel's. `test_backing_memory` stands in for that linear map with
/// ordinary heap buffers, keyed by frame number, so the exact same
/// walk/insert/remove/find logic above can be exercised without a booted
/// kernel.
#[cfg(test)]
unsafe fn table_from_frame<'a>(frame: Frame) -> &'a mut [Pte] {
    test_backing_memory::table_mut(frame)
}

#[cfg(test)]
mod test_backing_memory {
    extern crate std;

    use super::{Pte, TABLE_ENTRIES};
    use alloc::boxed::Box;
    use hashbrown::HashMap;
    use memory_structs::Frame;
    use self::std::sync::Mutex;

    /// A raw pointer is `!Send`; this backing store is only ever touched
    /// from test threads that don't share frames, so asserting `Send` is
    /// safe for this test-only shim.
    struct LeakedTable(*mut Pte);
    unsafe impl Send for LeakedTable {}

    static TABLES: Mutex<Option<HashMap<usize, LeakedTable>>> = Mutex::new(None);

    pub(super) fn table_mut<'a>(frame: Frame) -> &'a mut [Pte] {
        let mut guard = TABLES.lock().unwrap();
        let map = guard.get_or_insert_with(HashMap::new);
        let key = frame.start_address().value();
        let ptr = map
            .entry(key)
            .or_insert_with(|| {
                let boxed: Box<[Pte; TABLE_ENTRIES]> = Box::new([Pte::default(); TABLE_ENTRIES]);
                LeakedTable(Box::into_raw(boxed) as *mut Pte)
            })
            .0;
        unsafe { core::slice::from_raw_parts_mut(ptr, TABLE_ENTRIES) }
    }
}

unsafe fn zero_table(frame: Frame) {
    let table = table_from_frame(frame);
    for pte in table.iter_mut() {
        pte.clear();
    }
}

/// Computes the index into the table at `level` for `vaddr`, given the
/// per-level entry counts (root first). Returns `None` if `level` is
/// collapsed (zero entries), in which case it consumes no address bits and
/// the walk should skip straight to the next level.
///
/// Pure and architecture-agnostic: takes the entry-count table as a
/// parameter rather than reading `kernel_config` directly, so it can be
/// exercised against a hypothetical collapsed layout (e.g. a two-level
/// MMU) without needing a second compiled target.
pub fn level_index(vaddr: usize, level_entries: &[usize], level: usize) -> Option<usize> {
    if level_entries[level] == 0 {
        return None;
    }
    let mut shift = PAGE_SHIFT;
    for &entries in &level_entries[level + 1..] {
        if entries > 0 {
            shift += entries.trailing_zeros() as usize;
        }
    }
    let bits = level_entries[level].trailing_zeros() as usize;
    Some((vaddr >> shift) & ((1 << bits) - 1))
}

/// One address space's page table hierarchy.
///
/// Every intermediate table frame this `PageTable` has allocated is kept
/// alive by an [`AllocatedFrames`] handle in `intermediate_tables`; freeing
/// a table (when `map_remove` empties it) is simply dropping that handle,
/// and destroying the whole `PageTable` frees every table it owns for free
/// via the container's own `Drop`, in root-to-leaf order per the spec's
/// ownership model, though the order is not load-bearing here since
/// freeing a frame is just returning it to the allocator's free list.
pub struct PageTable {
    intermediate_tables: HashMap<usize, AllocatedFrames>,
    root: AllocatedFrames,
}

impl PageTable {
    /// Allocates and zeroes a fresh root table.
    pub fn new() -> Result<PageTable, &'static str> {
        let root = allocate_frames(1).ok_or("page_table: out of memory allocating root table")?;
        unsafe {
            zero_table(*root.start());
        }
        Ok(PageTable {
            intermediate_tables: HashMap::new(),
            root,
        })
    }

    /// The physical frame holding the root table, e.g. for programming
    /// CR3/TTBR0 when this address space is scheduled.
    pub fn root_frame(&self) -> Frame {
        *self.root.start()
    }

    fn alloc_intermediate_table(&mut self) -> Result<Frame, &'static str> {
        let af = allocate_frames(1)
            .ok_or("page_table: out of memory allocating an intermediate table")?;
        let frame = *af.start();
        unsafe {
            zero_table(frame);
        }
        self.intermediate_tables
            .insert(frame.start_address().value(), af);
        Ok(frame)
    }

    /// Walks from the root to the table frame and index holding the leaf
    /// entry for `page`, allocating and zeroing any missing intermediate
    /// tables along the way. Returns the path taken, root first, as
    /// `(table_frame, index_within_that_table)` for every non-collapsed
    /// level.
    fn walk_creating(&mut self, page: Page) -> Result<Vec<(Frame, usize)>, &'static str> {
        let vaddr = page.start_address().value();
        let mut path = Vec::with_capacity(NUM_PAGE_TABLE_LEVELS);
        let mut table_frame = self.root_frame();

        for level in 0..NUM_PAGE_TABLE_LEVELS {
            let idx = match level_index(vaddr, &PAGE_TABLE_LEVEL_ENTRIES, level) {
                Some(idx) => idx,
                None => continue, // collapsed level: no bits consumed, no table
            };
            path.push((table_frame, idx));

            if level == NUM_PAGE_TABLE_LEVELS - 1 {
                break;
            }

            // SAFETY: table_frame is either the root or a frame this
            // PageTable itself allocated and zeroed as a table.
            let pte = unsafe { &mut table_from_frame(table_frame)[idx] };
            if !pte.is_present() {
                let new_frame = self.alloc_intermediate_table()?;
                pte.set(new_frame, PteFlags::intermediate_level());
            }
            table_frame = pte.frame().expect("a just-set present entry must have a frame");
        }
        Ok(path)
    }

    /// Establishes `page -> frame` with `flags`. If any intermediate level
    /// is not present it is materialized with permissive flags; the leaf
    /// entry alone governs access.
    ///
    /// # Safety
    /// The caller must hold the owning address space's page-table lock and
    /// have interrupts disabled.
    pub unsafe fn map_insert(
        &mut self,
        page: Page,
        frame: Frame,
        flags: PteFlags,
    ) -> Result<(), &'static str> {
        let path = self.walk_creating(page)?;
        let &(leaf_table_frame, leaf_idx) = path.last().expect("walk always reaches a leaf");
        table_from_frame(leaf_table_frame)[leaf_idx].set(frame, flags);
        trace!(
            "page_table: mapped {:?} -> {:?} ({:?})",
            page,
            frame,
            flags
        );
        Ok(())
    }

    /// Removes the mapping for `page` if present; a silent no-op otherwise
    /// (the core's `InvalidMapping` kind is not an error at this layer).
    /// Frees every intermediate table that becomes empty as a result,
    /// walking back up no further than the first non-empty level.
    ///
    /// # Safety
    /// The caller must hold the owning address space's page-table lock and
    /// have interrupts disabled.
    pub unsafe fn map_remove(&mut self, page: Page) {
        let vaddr = page.start_address().value();
        let mut path: Vec<(Frame, usize)> = Vec::with_capacity(NUM_PAGE_TABLE_LEVELS);
        let mut table_frame = self.root_frame();

        for level in 0..NUM_PAGE_TABLE_LEVELS {
            let idx = match level_index(vaddr, &PAGE_TABLE_LEVEL_ENTRIES, level) {
                Some(idx) => idx,
                None => continue,
            };
            path.push((table_frame, idx));
            if level == NUM_PAGE_TABLE_LEVELS - 1 {
                break;
            }
            let pte = &table_from_frame(table_frame)[idx];
            if !pte.is_present() {
                return;
            }
            table_frame = pte.frame().expect("a present entry must have a frame");
        }

        let &(leaf_table_frame, leaf_idx) = path.last().expect("walk always reaches a leaf");
        {
            let leaf_table = table_from_frame(leaf_table_frame);
            if !leaf_table[leaf_idx].is_valid() {
                return;
            }
            leaf_table[leaf_idx].clear();
        }
        trace!("page_table: unmapped {:?}", page);

        for i in (1..path.len()).rev() {
            let (table_frame, _) = path[i];
            let is_empty = table_from_frame(table_frame)
                .iter()
                .all(|pte| !pte.is_valid());
            if !is_empty {
                break;
            }
            self.intermediate_tables
                .remove(&table_frame.start_address().value());
            let (parent_frame, parent_idx) = path[i - 1];
            table_from_frame(parent_frame)[parent_idx].clear();
            trace!("page_table: freed now-empty intermediate table at {:?}", table_frame);
        }
    }

    /// Returns the leaf entry for `page`, or `None` if it has never been
    /// mapped (the all-zeroes, invalid state). Returned mutably so the TLB
    /// manager can set accessed/dirty bits in place on a refill.
    ///
    /// # Safety
    /// The caller must hold the owning address space's page-table lock and
    /// have interrupts disabled.
    pub unsafe fn map_find(&mut self, page: Page) -> Option<&mut Pte> {
        let vaddr = page.start_address().value();
        let mut table_frame = self.root_frame();

        for level in 0..NUM_PAGE_TABLE_LEVELS {
            let idx = match level_index(vaddr, &PAGE_TABLE_LEVEL_ENTRIES, level) {
                Some(idx) => idx,
                None => continue,
            };
            if level == NUM_PAGE_TABLE_LEVELS - 1 {
                let pte = &mut table_from_frame(table_frame)[idx];
                return if pte.is_valid() { Some(pte) } else { None };
            }
            let pte = &table_from_frame(table_frame)[idx];
            if !pte.is_present() {
                return None;
            }
            table_frame = pte.frame().expect("a present entry must have a frame");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn level_index_on_four_level_512_wide_layout() {
        let layout = PAGE_TABLE_LEVEL_ENTRIES;
        // Bits 12-20 select the leaf (P1/L3) index on a 4-level, 512-wide
        // hierarchy with a 4 KiB page size.
        assert_eq!(level_index(0x0000_0000_1000, &layout, 3), Some(1));
        assert_eq!(level_index(0x0000_0020_0000, &layout, 2), Some(1));
    }

    #[test]
    fn level_index_skips_collapsed_levels() {
        // A hypothetical two-level layout: PTL0 with 4 entries (covering
        // 4 GiB at 1 MiB granularity) directly above a 256-entry leaf,
        // with the two middle levels collapsed.
        let layout = [4usize, 0, 0, 256];
        assert_eq!(level_index(0, &layout, 1), None);
        assert_eq!(level_index(0, &layout, 2), None);

        let addr = 3 << 20; // selects PTL0 index 3, leaf index 0
        assert_eq!(level_index(addr, &layout, 0), Some(3));
        assert_eq!(level_index(addr, &layout, 3), Some(0));
    }

    fn ensure_frame_allocator_initialized() {
        static INIT: self::std::sync::Once = self::std::sync::Once::new();
        INIT.call_once(|| {
            let area = memory_structs::PhysicalMemoryArea::new(
                PhysicalAddress::new_canonical(0x0040_0000),
                0x1000_0000,
                1,
            );
            frame_allocator::init(core::iter::once(area))
                .expect("failed to set up a test frame allocator");
        });
    }

    #[test]
    fn insert_then_find_then_remove() {
        ensure_frame_allocator_initialized();
        let mut pt = PageTable::new().expect("test frame allocator should not be exhausted");
        let page = Page::containing_address(memory_structs::VirtualAddress::new_canonical(0x1000));
        let frame = Frame::containing_address(PhysicalAddress::new_canonical(0x10000));
        unsafe {
            pt.map_insert(page, frame, PteFlags::present().writable())
                .unwrap();
            assert_eq!(pt.map_find(page).and_then(|p| p.frame()), Some(frame));
            pt.map_remove(page);
            assert!(pt.map_find(page).is_none());
        }
    }
}
