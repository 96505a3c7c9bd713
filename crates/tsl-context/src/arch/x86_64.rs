use core::arch::naked_asm;

use crate::context::EntryFn;
use crate::stack::DownwardStack;

/// Default MXCSR: all exceptions masked, round to nearest.
const MXCSR_DEFAULT: u32 = 0x1f80;
/// Default x87 control word: extended precision, all exceptions masked.
const FPUCW_DEFAULT: u16 = 0x037f;

/// System V callee-saved state.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Registers {
    pub rsp: usize,   // 0x00
    pub rbp: usize,   // 0x08
    pub rbx: usize,   // 0x10
    pub r12: usize,   // 0x18
    pub r13: usize,   // 0x20
    pub r14: usize,   // 0x28
    pub r15: usize,   // 0x30
    pub mxcsr: u32,   // 0x38
    pub fpucw: u16,   // 0x3c
    _pad: u16,        // 0x3e
}

impl Registers {
    pub(crate) const ZERO: Self = Self {
        rsp: 0,
        rbp: 0,
        rbx: 0,
        r12: 0,
        r13: 0,
        r14: 0,
        r15: 0,
        mxcsr: 0,
        fpucw: 0,
        _pad: 0,
    };

    /// Frame whose first resume `ret`s into [`entry_shim`] with `r12 = arg`
    /// and `r13 = entry`.
    ///
    /// # Safety
    /// `top` must be the top of a writable stack of at least one word.
    pub(crate) unsafe fn fresh(top: usize, entry: EntryFn, arg: usize) -> Self {
        let mut frame = DownwardStack::<usize>::new(top);
        // Popped by the `ret` in `switch_context`; leaves rsp 16-aligned.
        unsafe { frame.push(entry_shim as usize) };
        Self {
            rsp: frame.sp(),
            r12: arg,
            r13: entry as usize,
            mxcsr: MXCSR_DEFAULT,
            fpucw: FPUCW_DEFAULT,
            ..Self::ZERO
        }
    }

    pub(crate) fn sp(&self) -> usize {
        self.rsp
    }
}

/// # Safety
/// `from` must be writable, `to` must hold a frame produced by
/// [`Registers::fresh`] or by an earlier save through this routine.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch_context(from: *mut Registers, to: *const Registers) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "stmxcsr dword ptr [rdi + 0x38]",
        "fnstcw word ptr [rdi + 0x3c]",

        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        "ldmxcsr dword ptr [rsi + 0x38]",
        "fldcw word ptr [rsi + 0x3c]",
        "ret",
    )
}

/// First code executed on a fresh stack. Entry functions never return.
#[unsafe(naked)]
unsafe extern "C" fn entry_shim() -> ! {
    naked_asm!(
        "mov rdi, r12",
        "call r13",
        "ud2",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoffset::offset_of;

    #[test]
    fn test_register_layout() {
        assert_eq!(offset_of!(Registers, rsp), 0x00);
        assert_eq!(offset_of!(Registers, rbp), 0x08);
        assert_eq!(offset_of!(Registers, rbx), 0x10);
        assert_eq!(offset_of!(Registers, r12), 0x18);
        assert_eq!(offset_of!(Registers, r13), 0x20);
        assert_eq!(offset_of!(Registers, r14), 0x28);
        assert_eq!(offset_of!(Registers, r15), 0x30);
        assert_eq!(offset_of!(Registers, mxcsr), 0x38);
        assert_eq!(offset_of!(Registers, fpucw), 0x3c);
        assert_eq!(core::mem::size_of::<Registers>(), 0x40);
    }

    extern "C" fn never(_: usize) -> ! {
        unreachable!()
    }

    #[test]
    fn test_fresh_frame() {
        let mut backing = [0usize; 16];
        let top = backing.as_mut_ptr() as usize + core::mem::size_of_val(&backing);
        let top = top & !15;
        let regs = unsafe { Registers::fresh(top, never, 7) };
        assert_eq!(regs.rsp, top - 8);
        assert_eq!(unsafe { *(regs.rsp as *const usize) }, entry_shim as usize);
        assert_eq!(regs.r12, 7);
        assert_eq!(regs.r13, never as usize);
        assert_eq!(regs.mxcsr, MXCSR_DEFAULT);
    }
}
