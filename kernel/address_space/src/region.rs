//! An address space's mapped-region table.
//!
//! A region is a contiguous run of pages sharing one set of permissions and
//! one backend. Regions never overlap within an address space; the table
//! is keyed by each region's starting page number so the region covering a
//! faulting address can be found by one predecessor lookup.

use alloc::collections::BTreeMap;
use memory_structs::{Page, PageRange};
use pte_flags::PteFlags;

/// How a region's physical frames are obtained.
///
/// File-backed paging and copy-on-write are out of scope: the only two
/// backends needed are frames allocated on first touch, and frames fixed
/// up front (identity-mapped kernel data, device MMIO).
#[derive(Debug, Clone, Copy)]
pub enum RegionBackend {
    /// Frames are allocated from the frame layer lazily, on first fault.
    Anonymous,
    /// The region's frames are already decided; a fault within it is a
    /// true error (this workspace never unmaps a fixed region out from
    /// under a fault), included so callers can model reserved device or
    /// kernel windows in the same table.
    Fixed,
}

/// One mapped region of an address space.
#[derive(Debug, Clone, Copy)]
pub struct MappedRegion {
    pub pages: PageRange,
    pub flags: PteFlags,
    pub backend: RegionBackend,
}

/// The set of regions mapped into one address space, ordered by starting
/// page number.
#[derive(Default)]
pub struct RegionTable {
    regions: BTreeMap<usize, MappedRegion>,
}

impl RegionTable {
    pub fn new() -> RegionTable {
        RegionTable {
            regions: BTreeMap::new(),
        }
    }

    /// Records a new region. Returns an error if it overlaps an existing one.
    pub fn insert(&mut self, region: MappedRegion) -> Result<(), &'static str> {
        let start = region.pages.start().number();
        let end = region.pages.end().number();
        if let Some((_, before)) = self.regions.range(..=start).next_back() {
            if before.pages.end().number() >= start {
                return Err("address_space: new region overlaps an existing one");
            }
        }
        if let Some((&next_start, _)) = self.regions.range(start..).next() {
            if next_start <= end {
                return Err("address_space: new region overlaps an existing one");
            }
        }
        self.regions.insert(start, region);
        Ok(())
    }

    /// Removes the region starting at `page`, if any.
    pub fn remove(&mut self, page: Page) {
        self.regions.remove(&page.number());
    }

    /// Finds the region covering `page`, if any.
    pub fn find(&self, page: Page) -> Option<&MappedRegion> {
        let (_, region) = self.regions.range(..=page.number()).next_back()?;
        if region.pages.contains(&page) {
            Some(region)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_structs::VirtualAddress;

    fn page(n: usize) -> Page {
        Page::containing_address(VirtualAddress::new_canonical(n * 0x1000))
    }

    fn region(start: usize, end: usize) -> MappedRegion {
        MappedRegion {
            pages: PageRange::new(page(start), page(end)),
            flags: PteFlags::present(),
            backend: RegionBackend::Anonymous,
        }
    }

    #[test]
    fn find_locates_the_covering_region() {
        let mut table = RegionTable::new();
        table.insert(region(10, 20)).unwrap();
        table.insert(region(30, 40)).unwrap();
        assert!(table.find(page(15)).is_some());
        assert!(table.find(page(25)).is_none());
        assert!(table.find(page(35)).is_some());
        assert!(table.find(page(41)).is_none());
    }

    #[test]
    fn overlapping_insert_is_rejected() {
        let mut table = RegionTable::new();
        table.insert(region(10, 20)).unwrap();
        assert!(table.insert(region(15, 25)).is_err());
        assert!(table.insert(region(5, 10)).is_err());
        assert!(table.insert(region(20, 30)).is_err());
    }

    #[test]
    fn adjacent_non_overlapping_regions_are_both_kept() {
        let mut table = RegionTable::new();
        table.insert(region(10, 19)).unwrap();
        table.insert(region(20, 29)).unwrap();
        assert!(table.find(page(19)).is_some());
        assert!(table.find(page(20)).is_some());
    }

    #[test]
    fn remove_drops_the_region_starting_at_that_page() {
        let mut table = RegionTable::new();
        table.insert(region(10, 20)).unwrap();
        table.remove(page(10));
        assert!(table.find(page(15)).is_none());
    }
}
