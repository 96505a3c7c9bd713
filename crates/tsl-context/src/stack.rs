use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ptr::{self, NonNull};

/// Smallest usable stack a thread may be created with.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// Requested size is below [`MIN_STACK_SIZE`] or overflows when rounded to pages.
    InvalidSize(usize),
    /// The kernel refused the mapping.
    OutOfMemory { requested: usize, errno: i32 },
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSize(size) => write!(
                f,
                "invalid stack size {size} (minimum is {MIN_STACK_SIZE} bytes)"
            ),
            Self::OutOfMemory { requested, errno } => {
                write!(f, "failed to map a {requested}-byte stack (errno {errno})")
            }
        }
    }
}

impl std::error::Error for StackError {}

/// An exclusively owned thread stack.
///
/// The mapping is rounded up to whole pages and carries one `PROT_NONE` guard
/// page below the usable area; running off the bottom faults. The mapping is
/// released on drop.
pub struct Stack {
    base: NonNull<u8>,
    len: usize,
    guard: usize,
}

impl Stack {
    pub fn new(size: usize) -> Result<Self, StackError> {
        if size < MIN_STACK_SIZE {
            return Err(StackError::InvalidSize(size));
        }
        let page = page_size();
        let usable = size
            .checked_next_multiple_of(page)
            .ok_or(StackError::InvalidSize(size))?;
        let len = usable
            .checked_add(page)
            .ok_or(StackError::InvalidSize(size))?;

        let mut flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        cfg_if::cfg_if! {
            if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
                flags |= libc::MAP_STACK;
            }
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            let errno = last_errno();
            log::warn!("stack mmap of {len} bytes failed: errno {errno}");
            return Err(StackError::OutOfMemory {
                requested: len,
                errno,
            });
        }

        // Lowest page is the guard; stacks grow down towards it.
        if unsafe { libc::mprotect(addr, page, libc::PROT_NONE) } != 0 {
            let errno = last_errno();
            unsafe { libc::munmap(addr, len) };
            return Err(StackError::OutOfMemory {
                requested: len,
                errno,
            });
        }

        let base = NonNull::new(addr.cast::<u8>()).ok_or(StackError::OutOfMemory {
            requested: len,
            errno: 0,
        })?;
        Ok(Self {
            base,
            len,
            guard: page,
        })
    }

    /// Lowest usable address (just above the guard page).
    pub fn bottom(&self) -> usize {
        self.base.as_ptr() as usize + self.guard
    }

    /// One past the highest usable address; the initial stack pointer.
    pub fn top(&self) -> usize {
        self.base.as_ptr() as usize + self.len
    }

    pub fn usable_size(&self) -> usize {
        self.len - self.guard
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.bottom() && addr < self.top()
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };
        if rc != 0 {
            log::warn!("munmap of stack at {:p} failed: errno {}", self.base, last_errno());
        }
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &format_args!("{:#x}", self.bottom()))
            .field("top", &format_args!("{:#x}", self.top()))
            .field("usable_size", &self.usable_size())
            .finish()
    }
}

fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    }
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Writes values downwards from a stack top while building an initial frame.
pub(crate) struct DownwardStack<T> {
    sp: usize,
    _marker: PhantomData<T>,
}

impl<T> DownwardStack<T> {
    /// The initial sp is aligned down to the ABI stack alignment.
    #[inline]
    pub(crate) fn new(initial_sp: usize) -> Self {
        cfg_if::cfg_if! {
            if #[cfg(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64"))] {
                let min_align = 16;
            } else {
                let min_align = 2 * mem::size_of::<usize>();
            }
        }

        let align = mem::align_of::<T>().max(min_align);
        Self {
            sp: initial_sp & !(align - 1),
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// There must be writable memory for one `T` directly below the current sp.
    #[cfg_attr(not(target_arch = "x86_64"), allow(dead_code))]
    #[inline]
    pub(crate) unsafe fn push(&mut self, value: T) {
        self.sp -= mem::size_of::<T>();
        unsafe { ptr::write(self.sp as *mut T, value) };
    }

    #[inline]
    pub(crate) fn sp(&self) -> usize {
        self.sp
    }
}
