//! The abstract page table entry (PTE).
//!
//! Every level of the page table hierarchy, on every supported
//! architecture, uses the same opaque 64-bit entry: the frame's physical
//! address in the upper bits, [`pte_flags::PteFlags`] in the lower bits.
//! The level an entry lives at is always known from the walk depth, not
//! from the entry itself, so there is no tagged union and no per-level
//! type, in contrast to the pointer-cast union PTE types of a C
//! implementation.
//!
//! A PTE is *valid* iff its bit pattern is nonzero, and *present* iff its
//! `PRESENT` flag is set. Valid-but-not-present is a legal state: it marks
//! a page that has been swapped out while keeping the entry recognizable as
//! "known absent" rather than "never mapped".

#![no_std]

use bit_field::BitField;
use kernel_config::memory::PAGE_SHIFT;
use memory_structs::{Frame, PhysicalAddress};
pub use pte_flags::PteFlags;

/// Bits below the page shift are reserved for flags; bits at or above it
/// hold the frame's page-aligned physical address (stored right-shifted by
/// `PAGE_SHIFT`, since every frame address is already page-aligned).
const FLAGS_BITS: core::ops::Range<usize> = 0..PAGE_SHIFT;
const FRAME_BITS: core::ops::Range<usize> = PAGE_SHIFT..64;

/// A single page table entry, valid at any level of the hierarchy.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct Pte(u64);

impl Pte {
    /// The zero entry: invalid, not present, never mapped.
    pub const fn unmapped() -> Pte {
        Pte(0)
    }

    /// An entry is valid iff its underlying bit pattern is nonzero.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// An entry is present iff its `PRESENT` flag is set. Note this can be
    /// `false` while [`Pte::is_valid`] is `true`, for a swapped-out page.
    pub fn is_present(&self) -> bool {
        self.flags().is_present()
    }

    /// `true` for a valid entry that is not present: the page has been
    /// swapped out, and the non-flag bits carry a backing-store locator
    /// rather than a live frame address.
    pub fn is_swapped_out(&self) -> bool {
        self.is_valid() && !self.is_present()
    }

    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0.get_bits(FLAGS_BITS))
    }

    /// Returns the mapped frame, if this entry is present.
    pub fn frame(&self) -> Option<Frame> {
        if !self.is_present() {
            return None;
        }
        let addr = PhysicalAddress::new_canonical((self.0.get_bits(FRAME_BITS) << PAGE_SHIFT) as usize);
        Some(Frame::containing_address(addr))
    }

    /// Installs `frame` with `flags`, implicitly setting `PRESENT`.
    pub fn set(&mut self, frame: Frame, flags: PteFlags) {
        let addr = frame.start_address().value() as u64;
        debug_assert_eq!(addr.get_bits(FLAGS_BITS), 0, "frame address is not page-aligned");
        self.0.set_bits(FRAME_BITS, addr >> PAGE_SHIFT);
        self.0.set_bits(FLAGS_BITS, (flags | PteFlags::PRESENT).bits());
    }

    /// Records that the page backing this entry was swapped out to
    /// `backing_store_slot`, an opaque locator interpreted by the memory
    /// object system. Clears `PRESENT` but leaves the entry valid.
    pub fn set_swapped_out(&mut self, backing_store_slot: u64) {
        // A nonzero slot value keeps the entry valid even with PRESENT clear;
        // the caller is responsible for ensuring slot 0 is never used, since
        // it would otherwise alias the zero (unmapped) entry.
        let preserved_flags = self.flags().bits() & !PteFlags::PRESENT.bits();
        self.0 = 0;
        self.0.set_bits(FRAME_BITS, backing_store_slot);
        self.0.set_bits(FLAGS_BITS, preserved_flags);
    }

    /// Writes the all-zeroes pattern: stronger than clearing `PRESENT`
    /// alone, so the entry cannot be mistaken for a swapped-out page.
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Returns this entry with its `ACCESSED` flag set, as done by the TLB
    /// manager on every refill.
    pub fn mark_accessed(&mut self) {
        self.set_flags_preserving_frame(self.flags().accessed());
    }

    /// Returns this entry with its `DIRTY` flag set, as done by the TLB
    /// manager on a write fault.
    pub fn mark_dirty(&mut self) {
        self.set_flags_preserving_frame(self.flags().dirtied());
    }

    fn set_flags_preserving_frame(&mut self, flags: PteFlags) {
        self.0.set_bits(FLAGS_BITS, flags.bits());
    }
}

impl core::fmt::Debug for Pte {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if !self.is_valid() {
            write!(f, "Pte(unmapped)")
        } else if self.is_present() {
            write!(f, "Pte({:?}, {:?})", self.frame(), self.flags())
        } else {
            write!(f, "Pte(swapped out)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_is_invalid() {
        let pte = Pte::unmapped();
        assert!(!pte.is_valid());
        assert!(!pte.is_present());
        assert!(pte.frame().is_none());
    }

    #[test]
    fn set_then_read_roundtrips() {
        let mut pte = Pte::unmapped();
        let frame = Frame::containing_address(PhysicalAddress::new_canonical(0x10000));
        pte.set(frame, PteFlags::present().writable());
        assert!(pte.is_valid());
        assert!(pte.is_present());
        assert_eq!(pte.frame(), Some(frame));
        assert!(pte.flags().is_writable());
    }

    #[test]
    fn clear_makes_entry_invalid_not_just_not_present() {
        let mut pte = Pte::unmapped();
        let frame = Frame::containing_address(PhysicalAddress::new_canonical(0x10000));
        pte.set(frame, PteFlags::present());
        pte.clear();
        assert!(!pte.is_valid());
        assert!(!pte.is_swapped_out());
    }

    #[test]
    fn swapped_out_is_valid_but_not_present() {
        let mut pte = Pte::unmapped();
        pte.set_swapped_out(7);
        assert!(pte.is_valid());
        assert!(!pte.is_present());
        assert!(pte.is_swapped_out());
        assert!(pte.frame().is_none());
    }

    #[test]
    fn mark_accessed_preserves_frame_and_other_flags() {
        let mut pte = Pte::unmapped();
        let frame = Frame::containing_address(PhysicalAddress::new_canonical(0x20000));
        pte.set(frame, PteFlags::present().writable());
        pte.mark_accessed();
        assert_eq!(pte.frame(), Some(frame));
        assert!(pte.flags().is_accessed());
        assert!(pte.flags().is_writable());
    }
}
