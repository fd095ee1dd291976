//! Error kinds shared across the allocator, scheduler and IPC layers.

use core::ffi::c_int;
use core::fmt;

/// Generates `as_c_int()`/`from_c_int()`/`is_success()`/`is_error()` for a
/// `#[repr(i32)]` error enum that follows the kernel's negative-errno
/// convention (0 = success, negative = specific failure).
macro_rules! impl_kernel_error {
    ($ty:ty, fallback: $fallback:ident, variants: { $($val:literal => $variant:ident),* $(,)? }) => {
        impl $ty {
            #[inline]
            pub fn as_c_int(self) -> c_int {
                self as c_int
            }

            #[inline]
            pub fn from_c_int(val: c_int) -> Self {
                match val {
                    $($val => Self::$variant,)*
                    _ => Self::$fallback,
                }
            }
        }
    };
}

/// Outcome type returned by allocator, scheduler and IPC operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Failure kinds for kernel-core operations.
///
/// Integrity violations (`HeapCorruption`, `DoubleFree`) are reported without
/// mutating shared state; operational failures (`OutOfMemory`, `QueueFull`,
/// ...) leave the structure consistent and are retriable.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    OutOfMemory = -1,
    InvalidArgument = -2,
    HeapCorruption = -3,
    DoubleFree = -4,
    AlreadyExists = -5,
    QueueFull = -6,
    QueueEmpty = -7,
    NotFound = -8,
    WouldBlock = -9,
    Permission = -10,
}

impl_kernel_error!(KernelError, fallback: InvalidArgument, variants: {
    -1 => OutOfMemory,
    -2 => InvalidArgument,
    -3 => HeapCorruption,
    -4 => DoubleFree,
    -5 => AlreadyExists,
    -6 => QueueFull,
    -7 => QueueEmpty,
    -8 => NotFound,
    -9 => WouldBlock,
    -10 => Permission,
});

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::OutOfMemory => "out of memory",
            Self::InvalidArgument => "invalid argument",
            Self::HeapCorruption => "heap corruption detected",
            Self::DoubleFree => "double free detected",
            Self::AlreadyExists => "already exists",
            Self::QueueFull => "queue full",
            Self::QueueEmpty => "queue empty",
            Self::NotFound => "not found",
            Self::WouldBlock => "would block",
            Self::Permission => "permission denied",
        };
        f.write_str(msg)
    }
}
