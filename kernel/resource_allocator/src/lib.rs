//! A generic resource allocator: arenas of spans of segments.
//!
//! This is the allocator underneath every range of integers the kernel
//! hands out that isn't itself a physical frame: kernel virtual address
//! ranges, I/O port ranges, and any other tagged interval resource. It is
//! loosely based on the vmem allocator (Bonwick & Adams, USENIX 2001),
//! simplified to first-fit with power-of-two-order freelists.
//!
//! An [`Arena`] owns an ordered list of [`Span`]s. A span is a contiguous
//! interval subdivided into adjacent FREE and USED segments; adjacent FREE
//! segments are always coalesced, so the segment list never has two FREE
//! segments in a row. Each span additionally keeps a freelist per
//! power-of-two order (order `k` holds FREE segments of size in
//! `[2^k, 2^(k+1))`) and a hash index of USED segments keyed by their base,
//! for O(1) lookup on free.

#![no_std]

extern crate alloc;

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashSet;
use log::{error, trace};
use spin::Mutex;

/// Returns `floor(log2(x))`. `x` must be nonzero.
const fn floor_log2(x: usize) -> usize {
    (usize::BITS - 1 - x.leading_zeros()) as usize
}

/// Returns the order of the smallest freelist whose smallest member is
/// guaranteed to satisfy a request of `needed` bytes.
const fn search_order(needed: usize) -> usize {
    if needed.is_power_of_two() {
        floor_log2(needed)
    } else {
        floor_log2(needed) + 1
    }
}

const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SegmentState {
    Free,
    Used,
}

/// One segment of a span: `[base, base + size)`, either FREE or USED.
///
/// Segments are keyed by `base` in the span's `segments` map, which plays
/// the role of the ordered segment list; the map's ordering gives the
/// predecessor/successor needed for coalescing, and the next key gives the
/// segment's end without a dedicated sentinel entry.
struct Segment {
    size: usize,
    state: SegmentState,
}

/// A contiguous interval subdivided into FREE/USED segments.
struct Span {
    base: usize,
    size: usize,
    max_order: usize,
    segments: BTreeMap<usize, Segment>,
    free_lists: Vec<VecDeque<usize>>,
    used: HashSet<usize>,
}

impl Span {
    fn new(base: usize, size: usize) -> Result<Span, &'static str> {
        if base == 0 {
            return Err("resource_allocator: a span may not start at address 0");
        }
        if size == 0 {
            return Err("resource_allocator: a span may not have size 0");
        }
        let max_order = floor_log2(size);
        let mut segments = BTreeMap::new();
        segments.insert(
            base,
            Segment {
                size,
                state: SegmentState::Free,
            },
        );
        let mut free_lists = vec![VecDeque::new(); max_order + 1];
        free_lists[max_order].push_back(base);
        Ok(Span {
            base,
            size,
            max_order,
            segments,
            free_lists,
            used: HashSet::new(),
        })
    }

    fn end(&self) -> usize {
        self.base + self.size
    }

    fn overlaps(&self, base: usize, size: usize) -> bool {
        base < self.end() && self.base < base + size
    }

    /// True if `[base, base + size)` lies entirely within this span.
    fn contains_interval(&self, base: usize, size: usize) -> bool {
        base >= self.base && base + size <= self.end()
    }

    fn unlink_from_freelist(&mut self, segment_base: usize, segment_size: usize) {
        let order = floor_log2(segment_size);
        if let Some(pos) = self.free_lists[order]
            .iter()
            .position(|&b| b == segment_base)
        {
            self.free_lists[order].remove(pos);
        }
    }

    /// Implements `Allocate` from a single span: returns the allocated base
    /// address, or `None` if no free segment in this span can satisfy the
    /// request.
    fn allocate(&mut self, size: usize, align: usize) -> Option<usize> {
        let needed = size + align - 1;
        let mut order = search_order(needed);

        while order <= self.max_order {
            let seg_base = match self.free_lists[order].front() {
                Some(&b) => b,
                None => {
                    order += 1;
                    continue;
                }
            };
            let seg_size = self.segments.get(&seg_base).expect("freelist/segment map out of sync").size;

            let newbase = align_up(seg_base, align);
            debug_assert!(newbase + size <= seg_base + seg_size);

            self.free_lists[order].pop_front();
            self.segments.remove(&seg_base);

            if newbase > seg_base {
                let pred_size = newbase - seg_base;
                self.segments.insert(
                    seg_base,
                    Segment {
                        size: pred_size,
                        state: SegmentState::Free,
                    },
                );
                self.free_lists[floor_log2(pred_size)].push_back(seg_base);
            }
            if newbase + size < seg_base + seg_size {
                let succ_base = newbase + size;
                let succ_size = seg_base + seg_size - succ_base;
                self.segments.insert(
                    succ_base,
                    Segment {
                        size: succ_size,
                        state: SegmentState::Free,
                    },
                );
                self.free_lists[floor_log2(succ_size)].push_back(succ_base);
            }

            self.segments.insert(
                newbase,
                Segment {
                    size,
                    state: SegmentState::Used,
                },
            );
            self.used.insert(newbase);
            trace!(
                "resource_allocator: span [{:#x}, {:#x}) allocated [{:#x}, {:#x})",
                self.base,
                self.end(),
                newbase,
                newbase + size
            );
            return Some(newbase);
        }
        None
    }

    /// Implements `Free` from a single span. Panics (Fatal, per the core's
    /// error model) if `base` does not name a currently-USED segment of
    /// exactly `size`, which is an invariant violation rather than a
    /// recoverable condition.
    fn free(&mut self, base: usize, size: usize) {
        if !self.used.remove(&base) {
            panic!(
                "resource_allocator: freeing segment not known to be used (base={:#x}, size={:#x})",
                base, size
            );
        }
        let seg_size = match self.segments.get(&base) {
            Some(seg) if seg.state == SegmentState::Used => seg.size,
            _ => panic!(
                "resource_allocator: used-index out of sync with segment map (base={:#x})",
                base
            ),
        };
        if seg_size != size {
            panic!(
                "resource_allocator: size mismatch freeing base={:#x}: segment is {:#x} bytes, caller passed {:#x}",
                base, seg_size, size
            );
        }

        let mut new_base = base;
        let mut new_size = seg_size;

        if let Some((&pred_base, pred)) = self.segments.range(..base).next_back() {
            if pred.state == SegmentState::Free {
                let pred_size = pred.size;
                self.unlink_from_freelist(pred_base, pred_size);
                self.segments.remove(&pred_base);
                new_base = pred_base;
                new_size += pred_size;
            }
        }

        let succ_base = base + seg_size;
        if succ_base < self.end() {
            if let Some(succ) = self.segments.get(&succ_base) {
                if succ.state == SegmentState::Free {
                    let succ_size = succ.size;
                    self.unlink_from_freelist(succ_base, succ_size);
                    self.segments.remove(&succ_base);
                    new_size += succ_size;
                }
            }
        }

        self.segments.remove(&base);
        self.segments.insert(
            new_base,
            Segment {
                size: new_size,
                state: SegmentState::Free,
            },
        );
        self.free_lists[floor_log2(new_size)].push_back(new_base);
        trace!(
            "resource_allocator: span [{:#x}, {:#x}) freed [{:#x}, {:#x}), coalesced to [{:#x}, {:#x})",
            self.base,
            self.end(),
            base,
            base + seg_size,
            new_base,
            new_base + new_size
        );
    }

    /// Returns `true` if this span is back to its initial state: one FREE
    /// segment covering the whole span and no USED segments.
    fn is_fully_free(&self) -> bool {
        self.used.is_empty() && self.segments.len() == 1 && self.segments.contains_key(&self.base)
    }
}

/// An ordered set of spans that allocations are drawn from first-fit.
///
/// Mirrors how [`frame_allocator`] guards its free list behind a single
/// `Mutex`: all span bookkeeping for an arena is protected by one lock,
/// appropriate for a sleep-lock-style mutex since splitting/coalescing
/// segments may itself need to allocate heap memory for collection nodes.
pub struct Arena {
    spans: Mutex<Vec<Span>>,
}

impl Arena {
    /// Creates an arena with a single initial span `[base, base + size)`.
    ///
    /// Returns an error if `base` is 0: address 0 is reserved as a null
    /// sentinel by address-space callers and must never be handed out.
    pub fn new(base: usize, size: usize) -> Result<Arena, &'static str> {
        let span = Span::new(base, size)?;
        Ok(Arena {
            spans: Mutex::new({
                let mut v = Vec::with_capacity(1);
                v.push(span);
                v
            }),
        })
    }

    /// Registers an additional, disjoint span with this arena.
    pub fn add_span(&self, base: usize, size: usize) -> Result<(), &'static str> {
        let span = Span::new(base, size)?;
        let mut spans = self.spans.lock();
        if spans.iter().any(|s| s.overlaps(base, base + size)) {
            return Err("resource_allocator: new span overlaps an existing span in this arena");
        }
        spans.push(span);
        Ok(())
    }

    /// Allocates `size` bytes aligned to `align` (a power of two) from the
    /// first span that can satisfy the request. Returns `None` if no span
    /// has a large-enough free segment.
    pub fn allocate(&self, size: usize, align: usize) -> Option<usize> {
        assert!(size >= 1);
        assert!(align >= 1 && align.is_power_of_two());
        let mut spans = self.spans.lock();
        for span in spans.iter_mut() {
            if let Some(base) = span.allocate(size, align) {
                return Some(base);
            }
        }
        None
    }

    /// Returns `[base, base + size)` to whichever span contains it.
    ///
    /// # Panics
    /// Panics if no span in this arena contains the given interval, or if
    /// the interval does not name a currently-allocated segment of exactly
    /// `size` bytes: both are invariant violations (the `Fatal` error kind),
    /// not conditions a caller can recover from.
    pub fn free(&self, base: usize, size: usize) {
        let mut spans = self.spans.lock();
        for span in spans.iter_mut() {
            if span.contains_interval(base, size) {
                span.free(base, size);
                return;
            }
        }
        error!(
            "resource_allocator: freeing [{:#x}, {:#x}) to an arena with no containing span",
            base,
            base + size
        );
        panic!(
            "resource_allocator: freeing [{:#x}, {:#x}) to an arena with no containing span",
            base,
            base + size
        );
    }

    /// Returns `true` if every span in this arena has returned to its
    /// initial fully-free state.
    pub fn is_fully_free(&self) -> bool {
        self.spans.lock().iter().all(Span::is_fully_free)
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;

    #[test]
    fn simple_alloc_free_roundtrip() {
        let arena = Arena::new(0x1000, 0x1000).unwrap();
        let base = arena.allocate(0x100, 0x100).unwrap();
        assert_eq!(base, 0x1000);
        arena.free(base, 0x100);
        assert!(arena.is_fully_free());
    }

    #[test]
    fn base_zero_is_rejected() {
        assert!(Arena::new(0, 0x1000).is_err());
    }

    #[test]
    fn alignment_forces_a_gap() {
        // Scenario from the core's alignment walkthrough.
        let arena = Arena::new(0x1000_0000, 0x1000_0000).unwrap();
        let a = arena.allocate(0x1000, 0x1000).unwrap();
        assert_eq!(a, 0x1000_0000);

        let b = arena.allocate(0x1234, 0x1000).unwrap();
        assert_eq!(b, 0x1000_1000);

        arena.free(a, 0x1000);
        let c = arena.allocate(0x1000, 0x4000).unwrap();
        assert_eq!(c, 0x1000_4000);
    }

    #[test]
    fn coalescing_merges_adjacent_frees() {
        let arena = Arena::new(0x2000, 0x3000).unwrap();
        let a = arena.allocate(0x1000, 0x1000).unwrap();
        let b = arena.allocate(0x1000, 0x1000).unwrap();
        let c = arena.allocate(0x1000, 0x1000).unwrap();
        assert_eq!(a, 0x2000);
        assert_eq!(b, 0x3000);
        assert_eq!(c, 0x4000);

        arena.free(a, 0x1000);
        arena.free(c, 0x1000);
        arena.free(b, 0x1000);
        assert!(arena.is_fully_free());

        // A single allocation spanning the whole region should now succeed,
        // proving the three segments coalesced back into one.
        let whole = arena.allocate(0x3000, 0x1000).unwrap();
        assert_eq!(whole, 0x2000);
    }

    #[test]
    #[should_panic(expected = "not known to be used")]
    fn freeing_unknown_segment_is_fatal() {
        let arena = Arena::new(0x1000, 0x1000).unwrap();
        arena.free(0x1000, 0x100);
    }

    #[test]
    fn exhausted_span_returns_none() {
        let arena = Arena::new(0x1000, 0x1000).unwrap();
        assert!(arena.allocate(0x1000, 0x1).is_some());
        assert!(arena.allocate(0x1, 0x1).is_none());
    }

    #[test]
    fn add_span_rejects_overlap() {
        let arena = Arena::new(0x1000, 0x1000).unwrap();
        assert!(arena.add_span(0x1800, 0x1000).is_err());
        assert!(arena.add_span(0x2000, 0x1000).is_ok());
    }
}
