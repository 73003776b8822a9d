//! TLB shootdown: propagating one CPU's invalidation to every other CPU
//! that might have cached a translation for the affected address space.
//!
//! Triggering the actual cross-CPU notification (an inter-processor
//! interrupt) is the interrupt subsystem's job, same as the rest of
//! interrupt delivery, which this core treats as an external black box.
//! What belongs here is the bookkeeping: which CPUs to target, and running
//! each one's local [`TlbInvalidate`] once the IPI lands.

use super::{Asid, TlbInvalidate};
use alloc::vec::Vec;
use memory_structs::VirtualAddress;
use spin::Mutex;

/// One pending invalidation, broadcast to every registered CPU.
#[derive(Debug, Clone, Copy)]
enum Request {
    All,
    Asid(Asid),
    Pages { asid: Asid, start: VirtualAddress, count: usize },
}

/// Coordinates shootdown across every CPU whose local TLB manager has been
/// registered with [`Coordinator::register_cpu`].
///
/// A CPU's IPI handler calls [`Coordinator::service_local`] with its own
/// index once the interrupt subsystem delivers the shootdown IPI; this
/// applies every request enqueued since the last call to that CPU's local
/// manager and clears the queue.
pub struct Coordinator {
    queues: Mutex<Vec<Vec<Request>>>,
}

impl Coordinator {
    pub fn new() -> Coordinator {
        Coordinator { queues: Mutex::new(Vec::new()) }
    }

    /// Registers a new CPU, returning its index for later use with
    /// [`Coordinator::service_local`].
    pub fn register_cpu(&self) -> usize {
        let mut queues = self.queues.lock();
        queues.push(Vec::new());
        queues.len() - 1
    }

    fn enqueue_for_every_other(&self, local_cpu: usize, request: Request) {
        let mut queues = self.queues.lock();
        for (cpu, queue) in queues.iter_mut().enumerate() {
            if cpu != local_cpu {
                queue.push(request);
            }
        }
    }

    /// Invalidates `asid` everywhere. The caller has already run the
    /// equivalent invalidation on its own local TLB; this only queues the
    /// request for every *other* CPU, to be applied once the IPI lands.
    pub fn shootdown_asid(&self, local_cpu: usize, asid: Asid) {
        self.enqueue_for_every_other(local_cpu, Request::Asid(asid));
    }

    pub fn shootdown_pages(&self, local_cpu: usize, asid: Asid, start: VirtualAddress, count: usize) {
        self.enqueue_for_every_other(local_cpu, Request::Pages { asid, start, count });
    }

    pub fn shootdown_all(&self, local_cpu: usize) {
        self.enqueue_for_every_other(local_cpu, Request::All);
    }

    /// Applies every request queued for `cpu` to `local_tlb`, then clears
    /// the queue. Called from `cpu`'s shootdown-IPI handler.
    pub fn service_local(&self, cpu: usize, local_tlb: &dyn TlbInvalidate) {
        let pending = core::mem::take(&mut self.queues.lock()[cpu]);
        for request in pending {
            match request {
                Request::All => local_tlb.invalidate_all(),
                Request::Asid(asid) => local_tlb.invalidate_asid(asid),
                Request::Pages { asid, start, count } => {
                    local_tlb.invalidate_pages(asid, start, count)
                }
            }
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Amd64Tlb;

    #[test]
    fn a_shootdown_reaches_every_cpu_but_the_requester() {
        let coord = Coordinator::new();
        let cpu0 = coord.register_cpu();
        let cpu1 = coord.register_cpu();
        let cpu2 = coord.register_cpu();

        coord.shootdown_asid(cpu0, 5);

        let tlb = Amd64Tlb;
        coord.service_local(cpu0, &tlb);
        assert!(coord.queues.lock()[cpu0].is_empty());
        assert_eq!(coord.queues.lock()[cpu1].len(), 1);
        assert_eq!(coord.queues.lock()[cpu2].len(), 1);
    }

    #[test]
    fn servicing_drains_the_queue() {
        let coord = Coordinator::new();
        let cpu0 = coord.register_cpu();
        let cpu1 = coord.register_cpu();
        coord.shootdown_all(cpu0);
        coord.shootdown_asid(cpu0, 1);
        assert_eq!(coord.queues.lock()[cpu1].len(), 2);

        let tlb = Amd64Tlb;
        coord.service_local(cpu1, &tlb);
        assert!(coord.queues.lock()[cpu1].is_empty());
    }
}
