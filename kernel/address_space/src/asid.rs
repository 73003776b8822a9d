//! The bounded ASID pool.
//!
//! Every hardware target this workspace supports tags TLB/hash-table
//! entries with an address-space identifier of limited width
//! ([`kernel_config::NUM_ASIDS`] entries). When every id is in use, the
//! least-recently-used one is stolen from its current owner, who must have
//! its TLB entries flushed for that id before the id is handed to anyone
//! else — the actual flush is the TLB manager's job, so stealing here only
//! reports which address space lost its id.

use kernel_config::NUM_ASIDS;

/// An address-space identifier, as programmed into the hardware context
/// register (e.g. x86_64 PCID, ARM ASID, MIPS EntryHi ASID field).
pub type Asid = u16;

/// The outcome of [`AsidPool::allocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsidAllocation {
    /// An id that was never assigned, or was returned by [`AsidPool::release`].
    Fresh(Asid),
    /// `asid` was reassigned; `evicted_owner` previously held it and must
    /// have every TLB/hash-table entry tagged with `asid` invalidated
    /// before it runs again.
    Stolen { asid: Asid, evicted_owner: u64 },
}

struct Slot {
    owner: u64,
}

/// A fixed-size pool of ASIDs shared by every address space on this core.
///
/// Recency is tracked as a simple ring of occupied slots in
/// least-recently-used-first order; `allocate` always looks at the front of
/// that ring, and `touch` (called on every address-space switch) moves an
/// id to the back.
pub struct AsidPool {
    free: alloc::vec::Vec<Asid>,
    /// Occupied ids, oldest use first.
    lru: alloc::collections::VecDeque<Asid>,
    owners: alloc::collections::BTreeMap<Asid, Slot>,
}

impl AsidPool {
    pub fn new() -> AsidPool {
        let free = (0..NUM_ASIDS as Asid).rev().collect::<alloc::vec::Vec<_>>();
        AsidPool {
            free,
            lru: alloc::collections::VecDeque::new(),
            owners: alloc::collections::BTreeMap::new(),
        }
    }

    /// Assigns an id to `owner` (an opaque address-space identifier chosen
    /// by the caller, e.g. a pointer or sequence number). Returns
    /// [`AsidAllocation::Stolen`] if the pool was exhausted and the
    /// least-recently-used id had to be reassigned.
    pub fn allocate(&mut self, owner: u64) -> AsidAllocation {
        if let Some(asid) = self.free.pop() {
            self.owners.insert(asid, Slot { owner });
            self.lru.push_back(asid);
            return AsidAllocation::Fresh(asid);
        }

        let asid = self
            .lru
            .pop_front()
            .expect("NUM_ASIDS must be nonzero, so the pool is never both full and empty");
        let evicted_owner = self
            .owners
            .insert(asid, Slot { owner })
            .expect("every id in `lru` has a matching entry in `owners`")
            .owner;
        self.lru.push_back(asid);
        AsidAllocation::Stolen { asid, evicted_owner }
    }

    /// Marks `asid` as most-recently-used, e.g. on every address-space
    /// switch, so that stealing targets true idle address spaces first.
    pub fn touch(&mut self, asid: Asid) {
        if let Some(pos) = self.lru.iter().position(|&a| a == asid) {
            self.lru.remove(pos);
            self.lru.push_back(asid);
        }
    }

    /// Returns `asid` to the free list, e.g. when its address space is
    /// destroyed. The caller must have already flushed every TLB entry
    /// tagged with `asid`.
    pub fn release(&mut self, asid: Asid) {
        if let Some(pos) = self.lru.iter().position(|&a| a == asid) {
            self.lru.remove(pos);
        }
        self.owners.remove(&asid);
        self.free.push(asid);
    }
}

impl Default for AsidPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_handed_out_before_anything_is_stolen() {
        let mut pool = AsidPool::new();
        for owner in 0..NUM_ASIDS as u64 {
            assert!(matches!(pool.allocate(owner), AsidAllocation::Fresh(_)));
        }
    }

    #[test]
    fn exhausted_pool_steals_the_least_recently_used_id() {
        let mut pool = AsidPool::new();
        let mut ids = alloc::vec::Vec::new();
        for owner in 0..NUM_ASIDS as u64 {
            match pool.allocate(owner) {
                AsidAllocation::Fresh(asid) => ids.push(asid),
                AsidAllocation::Stolen { .. } => panic!("pool should not be exhausted yet"),
            }
        }
        // `ids[0]` was allocated first and never touched again, so it's the
        // least-recently-used id and must be the one reassigned.
        match pool.allocate(NUM_ASIDS as u64) {
            AsidAllocation::Stolen { asid, evicted_owner } => {
                assert_eq!(asid, ids[0]);
                assert_eq!(evicted_owner, 0);
            }
            AsidAllocation::Fresh(_) => panic!("pool should be exhausted"),
        }
    }

    #[test]
    fn touching_an_id_protects_it_from_theft() {
        let mut pool = AsidPool::new();
        let mut ids = alloc::vec::Vec::new();
        for owner in 0..NUM_ASIDS as u64 {
            match pool.allocate(owner) {
                AsidAllocation::Fresh(asid) => ids.push(asid),
                AsidAllocation::Stolen { .. } => panic!("pool should not be exhausted yet"),
            }
        }
        pool.touch(ids[0]);
        match pool.allocate(NUM_ASIDS as u64) {
            AsidAllocation::Stolen { asid, .. } => assert_eq!(asid, ids[1]),
            AsidAllocation::Fresh(_) => panic!("pool should be exhausted"),
        }
    }

    #[test]
    fn released_ids_are_fresh_again() {
        let mut pool = AsidPool::new();
        let first = match pool.allocate(0) {
            AsidAllocation::Fresh(asid) => asid,
            _ => unreachable!(),
        };
        pool.release(first);
        let mut saw_reused = false;
        for owner in 1..=NUM_ASIDS as u64 {
            if let AsidAllocation::Fresh(asid) = pool.allocate(owner) {
                if asid == first {
                    saw_reused = true;
                }
            }
        }
        assert!(saw_reused);
    }
}
