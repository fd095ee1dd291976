//! Lock-free single-producer/single-consumer ring buffer.
//!
//! Capacity is always a power of two; one slot is sacrificed to tell full
//! from empty using only masked indices (`next == head` means full,
//! `head == tail` means empty) rather than a separately tracked count.

use core::sync::atomic::{AtomicU32, Ordering};

use tradekernel_abi::{prov, KernelError, KernelResult};
use tradekernel_lib::IrqMutex;
use tradekernel_mm::KernelHeap;

pub struct Ring<T: Copy> {
    slab: *mut T,
    mask: u32,
    head: AtomicU32,
    tail: AtomicU32,
}

// SAFETY: `Ring` enforces single-producer/single-consumer discipline at the
// API level; the slab pointer is exclusively owned by this struct.
unsafe impl<T: Copy + Send> Send for Ring<T> {}
unsafe impl<T: Copy + Send> Sync for Ring<T> {}

impl<T: Copy> Ring<T> {
    /// Rounds `capacity_request` up to the next power of two and allocates
    /// a slab of that many `T` slots from `heap`.
    pub fn create(heap: &IrqMutex<KernelHeap>, capacity_request: u32) -> KernelResult<Self> {
        if capacity_request == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let capacity = capacity_request.next_power_of_two().max(2);
        let bytes = capacity
            .checked_mul(core::mem::size_of::<T>() as u32)
            .ok_or(KernelError::InvalidArgument)?;
        let ptr = heap.lock().alloc(bytes, prov!())?;
        Ok(Self {
            slab: ptr.as_ptr() as *mut T,
            mask: capacity - 1,
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
        })
    }

    fn slot(&self, index: u32) -> *mut T {
        unsafe { self.slab.add(index as usize) }
    }

    /// Producer side: wait-free. Fails with `QueueFull` rather than blocking.
    pub fn push(&self, elem: T) -> KernelResult<()> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let next = (tail + 1) & self.mask;
        if next == head {
            return Err(KernelError::QueueFull);
        }
        unsafe {
            self.slot(tail).write(elem);
        }
        self.tail.store(next, Ordering::Release);
        Ok(())
    }

    /// Consumer side: wait-free. Fails with `QueueEmpty` rather than blocking.
    pub fn pop(&self) -> KernelResult<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return Err(KernelError::QueueEmpty);
        }
        let value = unsafe { self.slot(head).read() };
        let next = (head + 1) & self.mask;
        self.head.store(next, Ordering::Release);
        Ok(value)
    }

    /// Best-effort: may be stale the instant it returns under concurrent access.
    pub fn count(&self) -> u32 {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) & self.mask
    }

    pub fn capacity(&self) -> u32 {
        self.mask + 1
    }

    pub fn destroy(self, heap: &IrqMutex<KernelHeap>) {
        if let Some(ptr) = core::ptr::NonNull::new(self.slab as *mut u8) {
            heap.lock().free(ptr, prov!());
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    fn new_heap(size: usize) -> &'static IrqMutex<KernelHeap> {
        let arena: &'static mut [u8] = std::vec![0u8; size].leak();
        let mut heap = KernelHeap::uninit();
        unsafe { heap.init(arena, || 0) };
        std::boxed::Box::leak(std::boxed::Box::new(IrqMutex::new(heap)))
    }

    #[test]
    fn rounds_capacity_up_to_power_of_two() {
        let heap = new_heap(8192);
        let ring: Ring<u64> = Ring::create(heap, 100).unwrap();
        assert_eq!(ring.capacity(), 128);
    }

    #[test]
    fn fills_to_capacity_minus_one_then_reports_full() {
        let heap = new_heap(8192);
        let ring: Ring<u64> = Ring::create(heap, 100).unwrap();
        for i in 0..127u64 {
            ring.push(i).unwrap();
        }
        assert!(ring.push(999).is_err());
    }

    #[test]
    fn fifo_ordering_preserved() {
        let heap = new_heap(8192);
        let ring: Ring<u64> = Ring::create(heap, 8).unwrap();
        for i in 0..7u64 {
            ring.push(i).unwrap();
        }
        for i in 0..7u64 {
            assert_eq!(ring.pop().unwrap(), i);
        }
        assert!(ring.pop().is_err());
    }

    #[test]
    fn count_never_exceeds_capacity() {
        let heap = new_heap(8192);
        let ring: Ring<u64> = Ring::create(heap, 8).unwrap();
        for i in 0..7u64 {
            ring.push(i).unwrap();
            assert!(ring.count() <= ring.capacity());
        }
    }
}
