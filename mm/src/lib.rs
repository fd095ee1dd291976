//! Heap Allocator and Memory Pool: the kernel's single source of dynamic
//! memory. A fixed-size static arena backs a best-fit, boundary-tag
//! coalescing heap; [`MemoryPool`] builds O(1) fixed-block allocation on
//! top of it.
#![no_std]

pub mod heap;
pub mod pool;

pub use heap::{HeapStats, KernelHeap};
pub use pool::MemoryPool;

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use tradekernel_abi::Provenance;
use tradekernel_lib::IrqMutex;

const HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Aligned to 16 bytes so allocations requesting up to 16-byte alignment
/// (e.g. SIMD-sized records) get a correctly aligned base pointer; a raw
/// `[u8; N]` static otherwise only guarantees alignment 1.
#[repr(C, align(16))]
struct AlignedArena([u8; HEAP_SIZE]);

#[unsafe(link_section = ".bss.heap")]
static mut HEAP_ARENA: AlignedArena = AlignedArena([0; HEAP_SIZE]);

/// The process-wide heap, behind the crate's IRQ-safe mutex.
pub static ALLOCATOR: IrqMutex<KernelHeap> = IrqMutex::new(KernelHeap::uninit());

/// Initializes [`ALLOCATOR`] over the static kernel arena. Must run exactly
/// once, before any `#[global_allocator]` request or [`MemoryPool::create`]
/// call. `tick_source` is normally the scheduler's tick counter.
///
/// # Safety
/// Must be called during single-threaded boot, before interrupts are enabled.
pub unsafe fn init_heap(tick_source: fn() -> u64) {
    #[allow(static_mut_refs)]
    let arena: &'static mut [u8] = unsafe { &mut HEAP_ARENA.0 };
    unsafe { ALLOCATOR.lock().init(arena, tick_source) };
}

/// Adapts [`ALLOCATOR`] to `#[global_allocator]`. Provenance for allocations
/// made through `Box`/`Vec`/etc. is recorded as [`Provenance::UNKNOWN`]
/// since `GlobalAlloc` carries no call-site information; call
/// [`KernelHeap::alloc`] directly when provenance matters.
pub struct GlobalHeap;

unsafe impl GlobalAlloc for GlobalHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size().max(layout.align()) as u32;
        match ALLOCATOR.lock().alloc(size, Provenance::UNKNOWN) {
            Ok(p) => p.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(p) = NonNull::new(ptr) {
            ALLOCATOR.lock().free(p, Provenance::UNKNOWN);
        }
    }
}
