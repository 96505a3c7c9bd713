//! Per-architecture register blocks and the switch routine.
//!
//! Each backend provides `Registers` (the callee-saved state of a suspended
//! computation), `Registers::fresh` (an initial frame that enters the shim on
//! first resume) and `switch_context(from, to)`.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub(crate) use self::x86_64::*;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub(crate) use self::aarch64::*;
    } else if #[cfg(all(target_arch = "riscv64", target_feature = "d"))] {
        mod riscv64;
        pub(crate) use self::riscv64::*;
    } else {
        compile_error!(
            "tsl-context supports x86_64, aarch64 and riscv64 (with the `d` extension) only"
        );
    }
}
