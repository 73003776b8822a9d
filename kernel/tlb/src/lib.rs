//! The TLB manager: one interface, three hardware models.
//!
//! - **TLB-managed** (AMD64, ARMv8): the hardware walks the page table
//!   itself; this manager only ever needs to invalidate stale entries after
//!   a mapping changes. See [`hardware`].
//! - **Refill-on-miss** (MIPS, IA-64, PowerPC-style): a miss exception
//!   hands the manager the faulting address; it walks the generic page
//!   table itself and installs a hardware entry. See [`refill`].
//! - **Shootdown**: the protocol for propagating an invalidation to every
//!   CPU that might have cached a translation for the affected address
//!   space. See [`shootdown`].
//!
//! Actual IPI delivery is the interrupt subsystem's job (out of scope here,
//! same as the rest of interrupt handling); this crate models the
//! invalidation side of the protocol and assumes it is invoked once per
//! target CPU.

#![no_std]

extern crate alloc;

pub mod hardware;
pub mod refill;
pub mod shootdown;

pub use address_space::Asid;
use memory_structs::VirtualAddress;

/// The invalidation operations every target exposes, regardless of whether
/// it is TLB-managed or refill-on-miss: a refill-on-miss target still needs
/// to invalidate its software-maintained hash table / TLB shadow on
/// `map_remove`.
pub trait TlbInvalidate {
    /// Flushes every entry, e.g. on a full address-space switch without
    /// per-ASID tagging support.
    fn invalidate_all(&self);

    /// Flushes every entry tagged with `asid`, e.g. when an ASID is
    /// recycled by [`address_space::AsidPool::allocate`] stealing it from
    /// its previous owner.
    fn invalidate_asid(&self, asid: Asid);

    /// Flushes `count` consecutive pages starting at `start`, tagged with
    /// `asid`, e.g. after `map_remove` on a small mapping.
    fn invalidate_pages(&self, asid: Asid, start: VirtualAddress, count: usize);
}
