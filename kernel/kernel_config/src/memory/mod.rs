//! Architecture-specific virtual memory layout constants.
//!
//! Each supported architecture gets its own submodule; exactly one is
//! re-exported here, selected by `target_arch`, so the rest of the
//! workspace can write `kernel_config::memory::PAGE_SIZE` regardless of
//! which architecture it's built for.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::*;
    } else {
        // x86_64 is the default target for this workspace.
        mod x86_64;
        pub use self::x86_64::*;
    }
}
