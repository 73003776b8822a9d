//! Architecture-independent page table entry flags.
//!
//! Every level of the generic page table hierarchy uses the same abstract
//! flags type; each architecture's `page_table_entry` backend is responsible
//! for encoding/decoding these bits into its own hardware PTE format. This
//! crate carries no encoding logic itself, mirroring how the teacher keeps
//! `entryflags_x86_64` a pure flags type with no knowledge of the table
//! structure that stores it.

#![no_std]

#[macro_use]
extern crate bitflags;

bitflags! {
    /// Permission and caching bits attached to a page table entry.
    ///
    /// `PRESENT` is tracked here as well as on the owning `Pte`, because an
    /// entry can be *valid* (nonzero bit pattern) without being *present*
    /// (see the crate-level docs on `page_table_entry` for that distinction).
    #[derive(Default)]
    pub struct PteFlags: u64 {
        const PRESENT         = 1 << 0;
        const WRITABLE        = 1 << 1;
        const USER_ACCESSIBLE = 1 << 2;
        const NO_CACHE        = 1 << 3;
        const ACCESSED        = 1 << 4;
        const DIRTY           = 1 << 5;
        const GLOBAL          = 1 << 6;
        const NO_EXECUTE      = 1 << 7;
    }
}

impl PteFlags {
    /// The minimal flags for an accessible, read-only, kernel-only,
    /// non-executable page.
    pub fn present() -> PteFlags {
        PteFlags::PRESENT
    }

    /// `PRESENT | WRITABLE`.
    pub fn writable(self) -> PteFlags {
        self | PteFlags::PRESENT | PteFlags::WRITABLE
    }

    /// Flags used for an intermediate (non-leaf) page table entry.
    ///
    /// Deliberately the most permissive combination possible: present,
    /// user-accessible, writable, cacheable, executable. Access control is
    /// centralized at the leaf entry; every supported MMU intersects
    /// privileges down the tree, so a restrictive intermediate entry would
    /// only ever narrow what the leaf already governs.
    pub fn intermediate_level() -> PteFlags {
        PteFlags::PRESENT | PteFlags::USER_ACCESSIBLE | PteFlags::WRITABLE
    }

    pub fn is_present(&self) -> bool {
        self.contains(PteFlags::PRESENT)
    }

    pub fn is_writable(&self) -> bool {
        self.contains(PteFlags::WRITABLE)
    }

    pub fn is_user_accessible(&self) -> bool {
        self.contains(PteFlags::USER_ACCESSIBLE)
    }

    /// Returns `true` if these flags permit execution, i.e. `NO_EXECUTE` is
    /// *not* set.
    pub fn is_executable(&self) -> bool {
        !self.contains(PteFlags::NO_EXECUTE)
    }

    pub fn is_cacheable(&self) -> bool {
        !self.contains(PteFlags::NO_CACHE)
    }

    pub fn is_global(&self) -> bool {
        self.contains(PteFlags::GLOBAL)
    }

    pub fn is_accessed(&self) -> bool {
        self.contains(PteFlags::ACCESSED)
    }

    pub fn is_dirty(&self) -> bool {
        self.contains(PteFlags::DIRTY)
    }

    /// Returns these flags with `ACCESSED` set, as done by the TLB manager
    /// on every refill.
    pub fn accessed(self) -> PteFlags {
        self | PteFlags::ACCESSED
    }

    /// Returns these flags with `DIRTY` set, as done by the TLB manager on
    /// a write fault.
    pub fn dirtied(self) -> PteFlags {
        self | PteFlags::DIRTY
    }

    /// Returns the access-kind-appropriate subset of these flags required
    /// for `access_kind` to be permitted; `None` means permission denied.
    pub fn permits(&self, access_kind: AccessKind) -> bool {
        if !self.is_present() {
            return false;
        }
        match access_kind {
            AccessKind::Read => true,
            AccessKind::Write => self.is_writable(),
            AccessKind::Execute => self.is_executable(),
        }
    }
}

/// The kind of access that triggered a page fault or TLB miss, as reported
/// by the architecture's trap frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intermediate_flags_are_permissive() {
        let flags = PteFlags::intermediate_level();
        assert!(flags.is_present());
        assert!(flags.is_writable());
        assert!(flags.is_user_accessible());
        assert!(flags.is_executable());
        assert!(flags.is_cacheable());
    }

    #[test]
    fn permits_respects_access_kind() {
        let ro = PteFlags::present();
        assert!(ro.permits(AccessKind::Read));
        assert!(!ro.permits(AccessKind::Write));

        let rw = ro.writable();
        assert!(rw.permits(AccessKind::Write));

        let nx = rw | PteFlags::NO_EXECUTE;
        assert!(!nx.permits(AccessKind::Execute));
    }

    #[test]
    fn not_present_denies_everything() {
        let flags = PteFlags::empty();
        assert!(!flags.permits(AccessKind::Read));
    }
}
