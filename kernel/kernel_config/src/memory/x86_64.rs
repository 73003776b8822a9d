//! The basic virtual memory map that the kernel assumes.
//!
//! Current P4 (top-level page table) mappings:
//! * 511: kernel text sections.
//! * 510: the linear map of all physical memory (every physical frame is
//!        accessible at `PHYSICAL_MEMORY_OFFSET + frame.start_address()`,
//!        which is how the page-table walker gets a usable pointer to an
//!        intermediate table's frame without a recursive self-mapping).
//! * 509: kernel heap.
//! * 508 down to 0: available for general usage.

/// 64-bit architecture results in 8 bytes per address.
pub const BYTES_PER_ADDR: usize = core::mem::size_of::<usize>();

/// The lower 12 bits of a virtual address correspond to the P1 page frame offset. 
pub const PAGE_SHIFT: usize = 12;
/// Page size is 4096 bytes, 4KiB pages.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Value: 0. Shift the Page number (not the address!) by this to get the P1 index.
pub const P1_INDEX_SHIFT: usize = 0;
/// Value: 9. Shift the Page number (not the address!) by this to get the P2 index.
pub const P2_INDEX_SHIFT: usize = P1_INDEX_SHIFT + 9;
/// Value: 18. Shift the Page number (not the address!) by this to get the P3 index.
pub const P3_INDEX_SHIFT: usize = P2_INDEX_SHIFT + 9;
/// Value: 27. Shift the Page number (not the address!) by this to get the P4 index.
pub const P4_INDEX_SHIFT: usize = P3_INDEX_SHIFT + 9;

/// Value: 512 GiB.
pub const ADDRESSABILITY_PER_P4_ENTRY: usize = 1 << (PAGE_SHIFT + P4_INDEX_SHIFT);

pub const MAX_VIRTUAL_ADDRESS: usize = usize::MAX;

/// Value: 512.
pub const ENTRIES_PER_PAGE_TABLE: usize = PAGE_SIZE / BYTES_PER_ADDR;
/// Value: 511. The 511th entry is used for kernel text sections
pub const KERNEL_TEXT_P4_INDEX: usize = ENTRIES_PER_PAGE_TABLE - 1;
/// Value: 510. The 510th entry holds the linear map of all physical memory.
pub const PHYSICAL_MEMORY_MAP_P4_INDEX: usize = ENTRIES_PER_PAGE_TABLE - 2;
/// Value: 509. The 509th entry is used for the kernel heap
pub const KERNEL_HEAP_P4_INDEX: usize = ENTRIES_PER_PAGE_TABLE - 3;


pub const MAX_PAGE_NUMBER: usize = MAX_VIRTUAL_ADDRESS / PAGE_SIZE;

/// The size in pages of each kernel stack. 
/// If it's too small, complex kernel functions will overflow, causing a page fault / double fault.
#[cfg(not(debug_assertions))]
pub const KERNEL_STACK_SIZE_IN_PAGES: usize = 16;
#[cfg(debug_assertions)]
pub const KERNEL_STACK_SIZE_IN_PAGES: usize = 32; // debug builds require more stack space.

/// The virtual address where the initial kernel (the nano_core) is mapped to.
/// Actual value: 0xFFFFFFFF80000000.
/// i.e., the linear offset between physical memory and kernel memory.
/// So, for example, the VGA buffer will be mapped from 0xb8000 to 0xFFFFFFFF800b8000.
/// This is -2GiB from the end of the 64-bit address space.
pub const KERNEL_OFFSET: usize = 0xFFFF_FFFF_8000_0000;
/// For a higher-half virtual address, bits from `KERNEL_OFFSET_BITS_START` to 64 are 1.
pub const KERNEL_OFFSET_BITS_START: u8 = 48;



/// The kernel text region is where we load kernel modules. 
/// It starts at the 511th P4 entry and goes up until the KERNEL_OFFSET,
/// which is where the nano_core itself starts. 
/// Actual value: 0o177777_777_000_000_000_0000, or 0xFFFF_FF80_0000_0000
pub const KERNEL_TEXT_START: usize = 0xFFFF_0000_0000_0000 | (KERNEL_TEXT_P4_INDEX << (P4_INDEX_SHIFT + PAGE_SHIFT));
/// The size in bytes, not in pages.
pub const KERNEL_TEXT_MAX_SIZE: usize = ADDRESSABILITY_PER_P4_ENTRY - (2 * 1024 * 1024 * 1024); // because the KERNEL_OFFSET starts at -2GiB


/// The higher-half heap gets the 512GB address range starting at the 509th P4 entry,
/// which is the slot right below the recursive P4 entry (510).
/// Actual value: 0o177777_775_000_000_000_0000, or 0xFFFF_FE80_0000_0000
pub const KERNEL_HEAP_START: usize = 0xFFFF_0000_0000_0000 | (KERNEL_HEAP_P4_INDEX << (P4_INDEX_SHIFT + PAGE_SHIFT));
#[cfg(not(debug_assertions))]
pub const KERNEL_HEAP_INITIAL_SIZE: usize = 64 * 1024 * 1024; // 64 MiB
#[cfg(debug_assertions)]
pub const KERNEL_HEAP_INITIAL_SIZE: usize = 256 * 1024 * 1024; // 256 MiB, debug builds require more heap space.
/// the kernel heap gets the whole 509th P4 entry.
pub const KERNEL_HEAP_MAX_SIZE: usize = ADDRESSABILITY_PER_P4_ENTRY;

/// The start of the linear map of all physical memory.
/// Actual value: 0o177777_776_000_000_000_0000, or 0xFFFF_FF00_0000_0000
pub const PHYSICAL_MEMORY_OFFSET: usize = 0xFFFF_0000_0000_0000 | (PHYSICAL_MEMORY_MAP_P4_INDEX << (P4_INDEX_SHIFT + PAGE_SHIFT));
/// The linear map covers the whole 510th P4 entry's worth of physical memory.
pub const PHYSICAL_MEMORY_MAP_MAX_SIZE: usize = ADDRESSABILITY_PER_P4_ENTRY;

/// The legacy VGA/BIOS hole below the 1 MiB mark: the only fixed hardware
/// window inside the boot identity map's low range. Later MMIO (local
/// APIC, I/O APIC, PCI BARs) lives far above any address the boot identity
/// map covers and is marked non-cacheable by the drivers that map it, not
/// by this boot-time map.
pub const HARDWARE_START: u64 = 0x000A_0000;
pub const HARDWARE_END: u64 = 0x0010_0000;

/// The number of hierarchical levels in this architecture's page table: P4, P3, P2, P1.
pub const NUM_PAGE_TABLE_LEVELS: usize = 4;

/// The number of entries at each level, root (index 0) first.
/// All four levels are real hardware-walked levels on x86_64.
pub const PAGE_TABLE_LEVEL_ENTRIES: [usize; NUM_PAGE_TABLE_LEVELS] = [
    ENTRIES_PER_PAGE_TABLE, // P4 (root)
    ENTRIES_PER_PAGE_TABLE, // P3
    ENTRIES_PER_PAGE_TABLE, // P2
    ENTRIES_PER_PAGE_TABLE, // P1 (leaf)
];
