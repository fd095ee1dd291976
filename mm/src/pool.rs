//! Fixed-block memory pools for O(1) allocation of uniform records, built
//! on top of [`crate::heap::KernelHeap`].

use core::ptr::NonNull;

use tradekernel_abi::{prov, KernelError, KernelResult};
use tradekernel_lib::IrqMutex;

use crate::heap::KernelHeap;

/// A fixed block size/count pool backed by a bitmap over a heap-allocated slab.
pub struct MemoryPool {
    slab: NonNull<u8>,
    bitmap: NonNull<u8>,
    block_size: u32,
    block_count: u32,
    bitmap_bytes: u32,
    free_count: u32,
}

// SAFETY: access is always mediated through the owning `IrqMutex`.
unsafe impl Send for MemoryPool {}

impl MemoryPool {
    /// `block_size` is rounded up to a multiple of 8. Rolls back the slab
    /// allocation if the bitmap allocation subsequently fails.
    pub fn create(
        heap: &IrqMutex<KernelHeap>,
        block_size: u32,
        block_count: u32,
    ) -> KernelResult<Self> {
        if block_count == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let block_size = (block_size + 7) & !7;
        let block_size = block_size.max(8);
        let bitmap_bytes = block_count.div_ceil(8);

        let mut guard = heap.lock();
        let slab_size = block_size
            .checked_mul(block_count)
            .ok_or(KernelError::InvalidArgument)?;
        let slab = guard.alloc(slab_size, prov!())?;
        let bitmap = match guard.alloc(bitmap_bytes, prov!()) {
            Ok(b) => b,
            Err(e) => {
                guard.free(slab, prov!());
                return Err(e);
            }
        };
        unsafe {
            core::ptr::write_bytes(bitmap.as_ptr(), 0xFF, bitmap_bytes as usize);
        }

        Ok(Self {
            slab,
            bitmap,
            block_size,
            block_count,
            bitmap_bytes,
            free_count: block_count,
        })
    }

    fn bitmap_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.bitmap.as_ptr(), self.bitmap_bytes as usize) }
    }

    fn bitmap_slice_mut(&mut self) -> &mut [u8] {
        unsafe {
            core::slice::from_raw_parts_mut(self.bitmap.as_ptr(), self.bitmap_bytes as usize)
        }
    }

    fn bit_is_free(&self, index: u32) -> bool {
        let byte = self.bitmap_slice()[(index / 8) as usize];
        (byte >> (index % 8)) & 1 != 0
    }

    fn clear_bit(&mut self, index: u32) {
        let (byte_idx, bit) = ((index / 8) as usize, index % 8);
        self.bitmap_slice_mut()[byte_idx] &= !(1 << bit);
    }

    fn set_bit(&mut self, index: u32) {
        let (byte_idx, bit) = ((index / 8) as usize, index % 8);
        self.bitmap_slice_mut()[byte_idx] |= 1 << bit;
    }

    /// Scans for the first free bit and returns a pointer to that block, or
    /// `None` once `free_count` reaches zero.
    pub fn alloc(&mut self) -> Option<NonNull<u8>> {
        if self.free_count == 0 {
            return None;
        }
        for index in 0..self.block_count {
            if self.bit_is_free(index) {
                self.clear_bit(index);
                self.free_count -= 1;
                let offset = index * self.block_size;
                let ptr = unsafe { self.slab.as_ptr().add(offset as usize) };
                return Some(unsafe { NonNull::new_unchecked(ptr) });
            }
        }
        None
    }

    /// Rejects pointers that aren't a block-aligned offset within the slab.
    pub fn free(&mut self, ptr: NonNull<u8>) -> KernelResult<()> {
        let base = self.slab.as_ptr() as usize;
        let p = ptr.as_ptr() as usize;
        if p < base {
            return Err(KernelError::InvalidArgument);
        }
        let delta = (p - base) as u32;
        if delta % self.block_size != 0 {
            return Err(KernelError::InvalidArgument);
        }
        let index = delta / self.block_size;
        if index >= self.block_count {
            return Err(KernelError::InvalidArgument);
        }
        if self.bit_is_free(index) {
            return Err(KernelError::DoubleFree);
        }
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0, self.block_size as usize);
        }
        self.set_bit(index);
        self.free_count += 1;
        Ok(())
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    /// Releases the bitmap and slab back to the owning heap, then consumes
    /// `self`. Must be called at most once.
    pub fn destroy(self, heap: &IrqMutex<KernelHeap>) {
        let mut guard = heap.lock();
        guard.free(self.slab, prov!());
        guard.free(self.bitmap, prov!());
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::heap::KernelHeap;

    fn new_heap(size: usize) -> &'static IrqMutex<KernelHeap> {
        let arena: &'static mut [u8] = std::vec![0u8; size].leak();
        let mut heap = KernelHeap::uninit();
        unsafe { heap.init(arena, || 0) };
        std::boxed::Box::leak(std::boxed::Box::new(IrqMutex::new(heap)))
    }

    #[test]
    fn alloc_free_conserves_count() {
        let heap = new_heap(16 * 1024);
        let mut pool = MemoryPool::create(heap, 32, 8).unwrap();
        assert_eq!(pool.free_count(), 8);
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        assert_eq!(pool.free_count(), 6);
        pool.free(a).unwrap();
        assert_eq!(pool.free_count(), 7);
        pool.free(b).unwrap();
        assert_eq!(pool.free_count(), 8);
    }

    #[test]
    fn exhausts_then_refuses() {
        let heap = new_heap(16 * 1024);
        let mut pool = MemoryPool::create(heap, 16, 2).unwrap();
        let _a = pool.alloc().unwrap();
        let _b = pool.alloc().unwrap();
        assert!(pool.alloc().is_none());
    }

    #[test]
    fn rejects_misaligned_pointer() {
        let heap = new_heap(16 * 1024);
        let mut pool = MemoryPool::create(heap, 32, 4).unwrap();
        let a = pool.alloc().unwrap();
        let bad = unsafe { NonNull::new_unchecked(a.as_ptr().add(1)) };
        assert!(pool.free(bad).is_err());
    }
}
