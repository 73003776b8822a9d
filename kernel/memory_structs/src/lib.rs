//! Physical and virtual addresses, the `Frame`/`Page` units built on top of
//! them, and the `FrameRange`/`PageRange` intervals used to describe
//! contiguous spans of either.
//!
//! This crate is the foundation that `resource_allocator`, `page_table`,
//! `address_space`, and `tlb` all build on. It is a pure data-model crate:
//! no locks, no allocation, no architecture-conditional logic beyond the
//! page size and canonical-address width pulled in from `kernel_config`.

#![no_std]

use core::{
    cmp::{max, min},
    fmt,
    ops::{Add, AddAssign, Sub, SubAssign},
};
use kernel_config::memory::{KERNEL_OFFSET_BITS_START, PAGE_SIZE};

/// Rounds `addr` down to the nearest multiple of the page size.
const fn page_align_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Truncates a raw virtual address to a canonical one by sign-extending bit
/// `KERNEL_OFFSET_BITS_START - 1` through bit 63, matching how every
/// supported architecture's MMU actually interprets virtual addresses.
const fn canonicalize(addr: usize) -> usize {
    // Shift the value to the left so the sign bit of the canonical address
    // becomes the sign bit of the machine word, then shift right (arithmetic)
    // to sign-extend it back, which duplicates the top bit across the
    // now-ignored high bits, exactly as hardware address-canonicalization
    // does for both x86_64 and aarch64's high-half kernel addresses.
    let shift = 64 - KERNEL_OFFSET_BITS_START as u32;
    (((addr << shift) as isize) >> shift) as usize
}

macro_rules! implement_address {
    ($TypeName:ident, $desc:literal, $is_canonical:expr, $canonicalize:expr) => {
        #[doc = concat!("A ", $desc, " memory address, which is always guaranteed to be canonical.")]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
            derive_more::Binary, derive_more::Octal, derive_more::LowerHex,
        )]
        #[repr(transparent)]
        pub struct $TypeName(usize);

        impl $TypeName {
            #[doc = concat!("Creates a new `", stringify!($TypeName), "`, returning `None` if the address is not canonical.")]
            pub const fn new(addr: usize) -> Option<$TypeName> {
                if $is_canonical(addr) {
                    Some($TypeName(addr))
                } else {
                    None
                }
            }

            #[doc = concat!("Creates a new `", stringify!($TypeName), "`, canonicalizing the address if it is not already canonical.")]
            pub const fn new_canonical(addr: usize) -> $TypeName {
                $TypeName($canonicalize(addr))
            }

            /// Creates a new `Self` that represents the address `0`.
            pub const fn zero() -> $TypeName {
                $TypeName(0)
            }

            /// Returns the underlying `usize` value of this address.
            #[inline]
            pub const fn value(&self) -> usize {
                self.0
            }

            /// Returns the offset from the start of the page that contains this address.
            #[inline]
            pub const fn page_offset(&self) -> usize {
                self.0 & (PAGE_SIZE - 1)
            }
        }

        impl fmt::Debug for $TypeName {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!(stringify!($TypeName), "({:#X})"), self.0)
            }
        }
        impl fmt::Display for $TypeName {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }

        // `Add`/`Sub` are hand-written rather than `derive_more`-derived:
        // every arithmetic op here must saturate and re-canonicalize, which
        // no derive macro expresses. A derived `Add` would do plain wrapping
        // field arithmetic and could hand back a non-canonical address.
        impl Add<usize> for $TypeName {
            type Output = $TypeName;
            fn add(self, rhs: usize) -> $TypeName {
                $TypeName::new_canonical(self.0.saturating_add(rhs))
            }
        }
        impl AddAssign<usize> for $TypeName {
            fn add_assign(&mut self, rhs: usize) {
                *self = $TypeName::new_canonical(self.0.saturating_add(rhs));
            }
        }
        impl Sub<usize> for $TypeName {
            type Output = $TypeName;
            fn sub(self, rhs: usize) -> $TypeName {
                $TypeName::new_canonical(self.0.saturating_sub(rhs))
            }
        }
        impl SubAssign<usize> for $TypeName {
            fn sub_assign(&mut self, rhs: usize) {
                *self = $TypeName::new_canonical(self.0.saturating_sub(rhs));
            }
        }
    };
}

implement_address!(
    PhysicalAddress,
    "physical",
    |_addr: usize| true,
    |addr: usize| addr
);
implement_address!(
    VirtualAddress,
    "virtual",
    |addr: usize| canonicalize(addr) == addr,
    canonicalize
);

macro_rules! implement_page_frame {
    ($TypeName:ident, $address:ident, $desc:literal) => {
        #[doc = concat!("A ", $desc, "-aligned chunk of memory, identified by its ", $desc, " number.")]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $TypeName {
            number: usize,
        }

        impl $TypeName {
            /// Returns the `
            #[doc = stringify!($TypeName)]
            /// ` that contains the given address.
            pub const fn containing_address(addr: $address) -> $TypeName {
                $TypeName {
                    number: addr.value() / PAGE_SIZE,
                }
            }

            /// Returns the address at the start of this `
            #[doc = stringify!($TypeName)]
            /// `.
            pub fn start_address(&self) -> $address {
                $address::new_canonical(self.number * PAGE_SIZE)
            }

            /// Returns the number of this `
            #[doc = stringify!($TypeName)]
            /// `, i.e., its address divided by the page size.
            pub const fn number(&self) -> usize {
                self.number
            }
        }

        impl fmt::Debug for $TypeName {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!(stringify!($TypeName), "(c{:#X})"), self.number * PAGE_SIZE)
            }
        }

        impl Add<usize> for $TypeName {
            type Output = $TypeName;
            fn add(self, rhs: usize) -> $TypeName {
                $TypeName {
                    number: self.number.saturating_add(rhs),
                }
            }
        }
        impl AddAssign<usize> for $TypeName {
            fn add_assign(&mut self, rhs: usize) {
                self.number = self.number.saturating_add(rhs);
            }
        }
        impl Sub<usize> for $TypeName {
            type Output = $TypeName;
            fn sub(self, rhs: usize) -> $TypeName {
                $TypeName {
                    number: self.number.saturating_sub(rhs),
                }
            }
        }
        impl SubAssign<usize> for $TypeName {
            fn sub_assign(&mut self, rhs: usize) {
                self.number = self.number.saturating_sub(rhs);
            }
        }
    };
}

implement_page_frame!(Frame, PhysicalAddress, "frame");
implement_page_frame!(Page, VirtualAddress, "page");

macro_rules! implement_range {
    ($TypeName:ident, $unit:ident, $address:ident, $desc:literal) => {
        #[doc = concat!("An inclusive range of contiguous ", $desc, "s: `[start, end]`.")]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $TypeName {
            start: $unit,
            end: $unit,
        }

        impl $TypeName {
            /// Creates a new range spanning from `start` to `end`, inclusive.
            ///
            /// If `end` is before `start`, the resulting range is empty
            /// (`start() > end()`), matching the behavior of an empty
            /// `RangeInclusive` in the standard library.
            pub const fn new(start: $unit, end: $unit) -> $TypeName {
                $TypeName { start, end }
            }

            #[doc = concat!("Creates a ", $desc, " range covering `size_in_bytes` bytes starting at `start_addr`, rounded up to a whole number of ", $desc, "s.")]
            pub fn from_phys_addr(start_addr: $address, size_in_bytes: usize) -> $TypeName {
                if size_in_bytes == 0 {
                    return $TypeName::empty();
                }
                let start = $unit::containing_address(start_addr);
                let end = $unit::containing_address(start_addr + (size_in_bytes - 1));
                $TypeName::new(start, end)
            }

            /// Returns an empty range that contains no
            #[doc = stringify!($unit)]
            /// s.
            pub const fn empty() -> $TypeName {
                // An empty range is represented canonically by an end that
                // precedes the start by one unit, so `size_in_frames()` is 0
                // without special-casing addition/subtraction at the edges
                // of the address space.
                $TypeName {
                    start: $unit { number: 1 },
                    end: $unit { number: 0 },
                }
            }

            /// Returns `true` if this range contains no units.
            pub fn is_empty(&self) -> bool {
                self.start.number() > self.end.number()
            }

            /// Returns the first unit in this range.
            pub const fn start(&self) -> &$unit {
                &self.start
            }

            /// Returns the last unit in this range (inclusive).
            pub const fn end(&self) -> &$unit {
                &self.end
            }

            /// Returns the number of units covered by this range.
            pub fn size_in_frames(&self) -> usize {
                if self.is_empty() {
                    0
                } else {
                    self.end.number() - self.start.number() + 1
                }
            }

            /// Returns the total size of this range in bytes.
            pub fn size_in_bytes(&self) -> usize {
                self.size_in_frames() * PAGE_SIZE
            }

            #[doc = concat!("Returns `true` if this range contains the given ", $desc, ".")]
            pub fn contains(&self, unit: &$unit) -> bool {
                !self.is_empty() && *unit >= self.start && *unit <= self.end
            }

            /// Returns `true` if this range contains the given address.
            pub fn contains_address(&self, addr: $address) -> bool {
                self.contains(&$unit::containing_address(addr))
            }

            /// Returns `true` if `self` and `other` share at least one unit.
            pub fn overlaps(&self, other: &$TypeName) -> bool {
                !self.is_empty()
                    && !other.is_empty()
                    && max(self.start.number(), other.start.number())
                        <= min(self.end.number(), other.end.number())
            }
        }

        impl fmt::Debug for $TypeName {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{:?} ..= {:?}", self.start, self.end)
            }
        }
    };
}

implement_range!(FrameRange, Frame, PhysicalAddress, "frame");
implement_range!(PageRange, Page, VirtualAddress, "page");

/// A region of physical memory reported by the bootloader/firmware,
/// e.g., via a multiboot2 memory map or a UEFI memory descriptor.
#[derive(Clone, Copy, Debug)]
pub struct PhysicalMemoryArea {
    /// The starting physical address of this area.
    pub base_addr: PhysicalAddress,
    /// The size of this area in bytes.
    pub size_in_bytes: usize,
    /// A bootloader-defined type tag; `1` conventionally means "usable RAM".
    pub typ: u32,
}

impl PhysicalMemoryArea {
    pub fn new(base_addr: PhysicalAddress, size_in_bytes: usize, typ: u32) -> PhysicalMemoryArea {
        PhysicalMemoryArea {
            base_addr,
            size_in_bytes,
            typ,
        }
    }

    pub fn start(&self) -> PhysicalAddress {
        self.base_addr
    }

    pub fn end(&self) -> PhysicalAddress {
        self.base_addr + self.size_in_bytes.saturating_sub(1)
    }

    pub fn contains(&self, addr: PhysicalAddress) -> bool {
        addr >= self.start() && addr <= self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_range_size() {
        let start = Frame::containing_address(PhysicalAddress::new_canonical(0x1000));
        let end = Frame::containing_address(PhysicalAddress::new_canonical(0x3000));
        let range = FrameRange::new(start, end);
        assert_eq!(range.size_in_frames(), 3);
        assert_eq!(range.size_in_bytes(), 3 * PAGE_SIZE);
    }

    #[test]
    fn empty_range_has_zero_size() {
        assert_eq!(FrameRange::empty().size_in_frames(), 0);
        assert!(FrameRange::empty().is_empty());
    }

    #[test]
    fn from_phys_addr_rounds_up() {
        let range = FrameRange::from_phys_addr(PhysicalAddress::new_canonical(0x1234), 1);
        assert_eq!(range.size_in_frames(), 1);
        assert_eq!(*range.start(), Frame::containing_address(PhysicalAddress::new_canonical(0x1000)));
    }

    #[test]
    fn overlap_detection() {
        let a = FrameRange::new(Frame::containing_address(PhysicalAddress::zero()), Frame::containing_address(PhysicalAddress::new_canonical(0x2000)));
        let b = FrameRange::new(Frame::containing_address(PhysicalAddress::new_canonical(0x2000)), Frame::containing_address(PhysicalAddress::new_canonical(0x4000)));
        let c = FrameRange::new(Frame::containing_address(PhysicalAddress::new_canonical(0x3000)), Frame::containing_address(PhysicalAddress::new_canonical(0x4000)));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn virtual_address_canonicalizes() {
        // Bit 48 (KERNEL_OFFSET_BITS_START on every supported target) set
        // should sign-extend everything above it, mirroring bit 47.
        let addr = VirtualAddress::new_canonical(0x0000_8000_0000_0000);
        assert_eq!(addr.value(), 0xFFFF_8000_0000_0000);
    }
}
