//! Compile-time architecture parameters for the virtual memory subsystem:
//! page size, page-table level widths, and the kernel's virtual memory map.
//!
//! This crate carries no logic, only constants, mirroring how the teacher
//! splits architecture knobs out of the crates that actually use them.

#![no_std]

pub mod memory;

/// The size of the bounded ASID pool shared by every architecture.
///
/// Real hardware ASID/context-ID widths vary (MIPS R4000: 8 bits, ARMv8
/// short-descriptor ASID: 8 bits, AMD64 PCID: 12 bits); 256 is the
/// narrowest of the architectures this workspace targets, so it is the
/// conservative shared bound. An architecture with a wider ID space simply
/// leaves the high bits of its hardware register unused.
pub const NUM_ASIDS: usize = 256;
