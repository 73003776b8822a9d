//! Architecture-specific MMU control register programming.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::enable_mmu;
    } else {
        mod x86_64;
        pub use self::x86_64::enable_mmu;
    }
}
