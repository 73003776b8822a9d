//! The basic virtual memory map that this build assumes on aarch64,
//! using a 4 KiB translation granule and a 4-level (L0..L3) table walk,
//! which mirrors the x86_64 (P4..P1) layout closely enough that the
//! generic `page_table` crate can treat both as "4 levels of 512 entries".

/// 64-bit architecture results in 8 bytes per address.
pub const BYTES_PER_ADDR: usize = core::mem::size_of::<usize>();

/// The lower 12 bits of a virtual address are the page offset with a 4 KiB granule.
pub const PAGE_SHIFT: usize = 12;
/// Page size is 4096 bytes, 4 KiB pages.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Value: 0. Shift the Page number by this to get the L3 (leaf) index.
pub const L3_INDEX_SHIFT: usize = 0;
/// Value: 9. Shift the Page number by this to get the L2 index.
pub const L2_INDEX_SHIFT: usize = L3_INDEX_SHIFT + 9;
/// Value: 18. Shift the Page number by this to get the L1 index.
pub const L1_INDEX_SHIFT: usize = L2_INDEX_SHIFT + 9;
/// Value: 27. Shift the Page number by this to get the L0 (root) index.
pub const L0_INDEX_SHIFT: usize = L1_INDEX_SHIFT + 9;

pub const MAX_VIRTUAL_ADDRESS: usize = usize::MAX;
pub const MAX_PAGE_NUMBER: usize = MAX_VIRTUAL_ADDRESS / PAGE_SIZE;

/// Value: 512. Number of translation-table descriptors per 4 KiB table.
pub const ENTRIES_PER_PAGE_TABLE: usize = PAGE_SIZE / BYTES_PER_ADDR;

/// The virtual address where the initial kernel (the nano_core) is mapped to on aarch64.
/// Actual value: 0xFFFFFFFF00000000.
/// The UEFI firmware QEMU_EFI.fd loads the kernel to the physical address 0x9C049000.
/// If the kernel offset were 0xFFFF_FFFF_8000_0000 as on x86_64, the virtual address
/// where the kernel is mapped would overflow. An offset of 0xFFFF_FFFF_0000_0000
/// guarantees that the virtual address won't exceed the max address.
pub const KERNEL_OFFSET: usize = 0xFFFF_FFFF_0000_0000;
/// For higher half virtual address the bits from KERNEL_OFFSET_BITS_START to 64 are 1
pub const KERNEL_OFFSET_BITS_START: u8 = 48;
/// The prefix of higher half virtual address.
pub const KERNEL_OFFSET_PREFIX: usize = 0b1111_1111_1111_1111;

pub const KERNEL_HEAP_START: usize = 0xFFFF_FFFE_0000_0000;
#[cfg(not(debug_assertions))]
pub const KERNEL_HEAP_INITIAL_SIZE: usize = 64 * 1024 * 1024;
#[cfg(debug_assertions)]
pub const KERNEL_HEAP_INITIAL_SIZE: usize = 256 * 1024 * 1024;

/// The start of the linear map of all physical memory: every physical frame
/// is accessible at `PHYSICAL_MEMORY_OFFSET + frame.start_address()`. Sits
/// directly below the kernel heap window.
pub const PHYSICAL_MEMORY_OFFSET: usize = 0xFFFF_FF80_0000_0000;
pub const PHYSICAL_MEMORY_MAP_MAX_SIZE: usize = KERNEL_HEAP_START - PHYSICAL_MEMORY_OFFSET;

/// The number of hierarchical levels in this architecture's page table: L0, L1, L2, L3.
pub const NUM_PAGE_TABLE_LEVELS: usize = 4;

/// The number of entries at each level, root (index 0) first.
pub const PAGE_TABLE_LEVEL_ENTRIES: [usize; NUM_PAGE_TABLE_LEVELS] = [
    ENTRIES_PER_PAGE_TABLE, // L0 (root)
    ENTRIES_PER_PAGE_TABLE, // L1
    ENTRIES_PER_PAGE_TABLE, // L2
    ENTRIES_PER_PAGE_TABLE, // L3 (leaf)
];

// Hardware resources https://github.com/qemu/qemu/blob/master/hw/arm/virt.c
//     Hardware Resource            start address  size
//     [VIRT_FLASH] =              {          0, 0x08000000 },
//     [VIRT_CPUPERIPHS] =         { 0x08000000, 0x00020000 },
//     [VIRT_UART] =               { 0x09000000, 0x00001000 },
//     [VIRT_MMIO] =               { 0x0a000000, 0x00000200 },
//     [VIRT_PCIE_MMIO] =          { 0x10000000, 0x2eff0000 },
// `boot_mmu` uses this range to decide which parts of the identity map must
// be marked non-cacheable (MMIO) rather than cacheable (RAM).
pub const HARDWARE_START: u64 = 0x1000;
pub const HARDWARE_END: u64 = 0x4000_0000;
