use core::arch::naked_asm;

use crate::context::EntryFn;
use crate::stack::DownwardStack;

/// AAPCS64 callee-saved state: sp, x19-x28, fp, lr and the low halves of v8-v15.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Registers {
    pub sp: usize,       // 0x00
    pub x: [usize; 10],  // 0x08 x19..x28
    pub fp: usize,       // 0x58 x29
    pub lr: usize,       // 0x60 x30
    pub d: [u64; 8],     // 0x68 d8..d15
}

impl Registers {
    pub(crate) const ZERO: Self = Self {
        sp: 0,
        x: [0; 10],
        fp: 0,
        lr: 0,
        d: [0; 8],
    };

    /// Frame whose first resume `ret`s into [`entry_shim`] with `x19 = arg`
    /// and `x20 = entry`.
    ///
    /// # Safety
    /// `top` must be the top of a writable stack.
    pub(crate) unsafe fn fresh(top: usize, entry: EntryFn, arg: usize) -> Self {
        let frame = DownwardStack::<usize>::new(top);
        let mut x = [0; 10];
        x[0] = arg;
        x[1] = entry as usize;
        Self {
            sp: frame.sp(),
            x,
            lr: entry_shim as usize,
            ..Self::ZERO
        }
    }

    pub(crate) fn sp(&self) -> usize {
        self.sp
    }
}

/// # Safety
/// `from` must be writable, `to` must hold a frame produced by
/// [`Registers::fresh`] or by an earlier save through this routine.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch_context(from: *mut Registers, to: *const Registers) {
    naked_asm!(
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "stp x19, x20, [x0, #0x08]",
        "stp x21, x22, [x0, #0x18]",
        "stp x23, x24, [x0, #0x28]",
        "stp x25, x26, [x0, #0x38]",
        "stp x27, x28, [x0, #0x48]",
        "stp x29, x30, [x0, #0x58]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",

        "ldr x9, [x1, #0x00]",
        "mov sp, x9",
        "ldp x19, x20, [x1, #0x08]",
        "ldp x21, x22, [x1, #0x18]",
        "ldp x23, x24, [x1, #0x28]",
        "ldp x25, x26, [x1, #0x38]",
        "ldp x27, x28, [x1, #0x48]",
        "ldp x29, x30, [x1, #0x58]",
        "ldp d8, d9, [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
        "ret",
    )
}

/// First code executed on a fresh stack. Entry functions never return.
#[unsafe(naked)]
unsafe extern "C" fn entry_shim() -> ! {
    naked_asm!(
        "mov x0, x19",
        "blr x20",
        "brk #0",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoffset::offset_of;

    #[test]
    fn test_register_layout() {
        assert_eq!(offset_of!(Registers, sp), 0x00);
        assert_eq!(offset_of!(Registers, x), 0x08);
        assert_eq!(offset_of!(Registers, fp), 0x58);
        assert_eq!(offset_of!(Registers, lr), 0x60);
        assert_eq!(offset_of!(Registers, d), 0x68);
        assert_eq!(core::mem::size_of::<Registers>(), 168);
    }
}
