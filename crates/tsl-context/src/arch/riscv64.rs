use core::arch::naked_asm;

use crate::context::EntryFn;
use crate::stack::DownwardStack;

/// LP64D callee-saved state: sp, ra, s0-s11, fs0-fs11.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Registers {
    pub sp: usize,       // 0x00
    pub ra: usize,       // 0x08
    pub s: [usize; 12],  // 0x10
    pub fs: [u64; 12],   // 0x70
}

impl Registers {
    pub(crate) const ZERO: Self = Self {
        sp: 0,
        ra: 0,
        s: [0; 12],
        fs: [0; 12],
    };

    /// Frame whose first resume `ret`s into [`entry_shim`] with `s1 = arg`
    /// and `s2 = entry`.
    ///
    /// # Safety
    /// `top` must be the top of a writable stack.
    pub(crate) unsafe fn fresh(top: usize, entry: EntryFn, arg: usize) -> Self {
        let frame = DownwardStack::<usize>::new(top);
        let mut s = [0; 12];
        s[1] = arg;
        s[2] = entry as usize;
        Self {
            sp: frame.sp(),
            ra: entry_shim as usize,
            s,
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
        "sd sp, 0(a0)",
        "sd ra, 8(a0)",
        "sd s0, 16(a0)",
        "sd s1, 24(a0)",
        "sd s2, 32(a0)",
        "sd s3, 40(a0)",
        "sd s4, 48(a0)",
        "sd s5, 56(a0)",
        "sd s6, 64(a0)",
        "sd s7, 72(a0)",
        "sd s8, 80(a0)",
        "sd s9, 88(a0)",
        "sd s10, 96(a0)",
        "sd s11, 104(a0)",
        "fsd fs0, 112(a0)",
        "fsd fs1, 120(a0)",
        "fsd fs2, 128(a0)",
        "fsd fs3, 136(a0)",
        "fsd fs4, 144(a0)",
        "fsd fs5, 152(a0)",
        "fsd fs6, 160(a0)",
        "fsd fs7, 168(a0)",
        "fsd fs8, 176(a0)",
        "fsd fs9, 184(a0)",
        "fsd fs10, 192(a0)",
        "fsd fs11, 200(a0)",

        "ld sp, 0(a1)",
        "ld ra, 8(a1)",
        "ld s0, 16(a1)",
        "ld s1, 24(a1)",
        "ld s2, 32(a1)",
        "ld s3, 40(a1)",
        "ld s4, 48(a1)",
        "ld s5, 56(a1)",
        "ld s6, 64(a1)",
        "ld s7, 72(a1)",
        "ld s8, 80(a1)",
        "ld s9, 88(a1)",
        "ld s10, 96(a1)",
        "ld s11, 104(a1)",
        "fld fs0, 112(a1)",
        "fld fs1, 120(a1)",
        "fld fs2, 128(a1)",
        "fld fs3, 136(a1)",
        "fld fs4, 144(a1)",
        "fld fs5, 152(a1)",
        "fld fs6, 160(a1)",
        "fld fs7, 168(a1)",
        "fld fs8, 176(a1)",
        "fld fs9, 184(a1)",
        "fld fs10, 192(a1)",
        "fld fs11, 200(a1)",
        "ret",
    )
}

/// First code executed on a fresh stack. Entry functions never return.
#[unsafe(naked)]
unsafe extern "C" fn entry_shim() -> ! {
    naked_asm!(
        "mv a0, s1",
        "jalr s2",
        "unimp",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoffset::offset_of;

    #[test]
    fn test_register_layout() {
        assert_eq!(offset_of!(Registers, sp), 0);
        assert_eq!(offset_of!(Registers, ra), 8);
        assert_eq!(offset_of!(Registers, s), 16);
        assert_eq!(offset_of!(Registers, fs), 112);
        assert_eq!(core::mem::size_of::<Registers>(), 208);
    }
}
