//! Single-arena heap allocator: best-fit placement, splitting, boundary-tag
//! coalescing, corruption detection and per-allocation provenance.
//!
//! Blocks are addressed by byte offset into the backing arena rather than by
//! raw pointer — only [`KernelHeap::alloc`]/[`KernelHeap::free`] translate
//! between the two, so no heap-internal pointer ever escapes this module.

use core::mem::size_of;
use core::ptr::NonNull;

use tradekernel_abi::{KernelError, KernelResult, Provenance, MAX_ALLOCATION_RECORDS};
use tradekernel_lib::{klog_debug, klog_info, klog_warn};

const ALLOCATED_MAGIC: u32 = 0xA11C_0DED;
const FREED_MAGIC: u32 = 0xF2EE_B10C;
const SCRUB_BYTE: u8 = 0xDD;
const NONE_OFFSET: u32 = u32::MAX;
const MIN_BLOCK_SIZE: u32 = 8;

#[repr(C)]
struct BlockHeader {
    guard: u32,
    size: u32,
    id: u32,
    prev: u32,
    next: u32,
    prov_line: u32,
    prov_file_ptr: *const u8,
    prov_file_len: usize,
}

const HEADER_SIZE: usize = size_of::<BlockHeader>();
/// A block is split only if the remainder leaves room for another header
/// plus this many payload bytes, per the spec's `header + 16` threshold.
const SPLIT_SLACK: u32 = 16;

#[derive(Clone, Copy)]
struct AllocationRecord {
    offset: u32,
    size: u32,
    provenance: Provenance,
    id: u32,
    #[allow(dead_code)]
    creation_tick: u64,
    used: bool,
}

#[derive(Clone, Copy, Default)]
pub struct HeapStats {
    pub total_allocations: u64,
    pub failed_allocations: u64,
    pub total_frees: u64,
    pub coalesce_events: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub largest_free_block: u32,
}

impl HeapStats {
    pub fn fragmentation_ratio(&self) -> u32 {
        if self.free_bytes == 0 {
            return 0;
        }
        ((self.largest_free_block as u64 * 100) / self.free_bytes) as u32
    }
}

pub struct KernelHeap {
    base: *mut u8,
    capacity: u32,
    head: u32,
    next_id: u32,
    tick_source: fn() -> u64,
    records: [AllocationRecord; MAX_ALLOCATION_RECORDS],
    stats: HeapStats,
    initialized: bool,
}

// SAFETY: the heap is only ever touched through an `IrqMutex`/`Spinlock`
// from the crate that owns it; `KernelHeap` itself performs no locking.
unsafe impl Send for KernelHeap {}

impl KernelHeap {
    pub const fn uninit() -> Self {
        Self {
            base: core::ptr::null_mut(),
            capacity: 0,
            head: NONE_OFFSET,
            next_id: 1,
            tick_source: || 0,
            records: [AllocationRecord {
                offset: 0,
                size: 0,
                provenance: Provenance::UNKNOWN,
                id: 0,
                creation_tick: 0,
                used: false,
            }; MAX_ALLOCATION_RECORDS],
            stats: HeapStats {
                total_allocations: 0,
                failed_allocations: 0,
                total_frees: 0,
                coalesce_events: 0,
                used_bytes: 0,
                free_bytes: 0,
                largest_free_block: 0,
            },
            initialized: false,
        }
    }

    /// Initializes the heap over `arena`, installing one free block spanning
    /// the whole region. `tick_source` supplies the creation tick recorded
    /// in allocation records.
    ///
    /// # Safety
    /// `arena` must remain valid and exclusively owned by this heap for the
    /// lifetime of every pointer it hands out.
    pub unsafe fn init(&mut self, arena: &'static mut [u8], tick_source: fn() -> u64) {
        assert!(!self.initialized, "heap already initialized");
        assert!(arena.len() > HEADER_SIZE + MIN_BLOCK_SIZE as usize);
        self.base = arena.as_mut_ptr();
        self.capacity = arena.len() as u32;
        self.tick_source = tick_source;

        let free_size = self.capacity - HEADER_SIZE as u32;
        let header = self.header_mut(0);
        *header = BlockHeader {
            guard: FREED_MAGIC,
            size: free_size,
            id: 0,
            prev: NONE_OFFSET,
            next: NONE_OFFSET,
            prov_line: 0,
            prov_file_ptr: core::ptr::null(),
            prov_file_len: 0,
        };
        self.head = 0;
        self.stats.free_bytes = free_size as u64;
        self.stats.largest_free_block = free_size;
        self.initialized = true;
    }

    fn header(&self, offset: u32) -> &BlockHeader {
        unsafe { &*(self.base.add(offset as usize) as *const BlockHeader) }
    }

    fn header_mut(&mut self, offset: u32) -> &mut BlockHeader {
        unsafe { &mut *(self.base.add(offset as usize) as *mut BlockHeader) }
    }

    fn payload_ptr(&self, offset: u32) -> *mut u8 {
        unsafe { self.base.add(offset as usize + HEADER_SIZE) }
    }

    fn offset_of_payload(&self, payload: *mut u8) -> Option<u32> {
        let base = self.base as usize;
        let p = payload as usize;
        if p < base + HEADER_SIZE || p >= base + self.capacity as usize {
            return None;
        }
        Some((p - base - HEADER_SIZE) as u32)
    }

    fn find_record(&self, offset: u32) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.used && r.offset == offset)
    }

    fn insert_record(&mut self, offset: u32, size: u32, provenance: Provenance, id: u32) {
        if let Some(slot) = self.records.iter_mut().find(|r| !r.used) {
            *slot = AllocationRecord {
                offset,
                size,
                provenance,
                id,
                creation_tick: (self.tick_source)(),
                used: true,
            };
        }
    }

    /// Rounds `size` up to a multiple of 8, per the spec's block-size invariant.
    fn round_size(size: u32) -> u32 {
        ((size + 7) & !7).max(MIN_BLOCK_SIZE)
    }

    /// Best-fit search over the physically-ordered block chain: returns the
    /// smallest free block whose size is at least `need`, ties broken by
    /// first encountered (i.e. lowest offset).
    fn find_best_fit(&self, need: u32) -> Option<u32> {
        let mut cursor = self.head;
        let mut best: Option<(u32, u32)> = None; // (offset, size)
        while cursor != NONE_OFFSET {
            let h = self.header(cursor);
            if h.guard == FREED_MAGIC && h.size >= need {
                match best {
                    Some((_, best_size)) if best_size <= h.size => {}
                    _ => best = Some((cursor, h.size)),
                }
            }
            cursor = h.next;
        }
        best.map(|(offset, _)| offset)
    }

    fn split_if_worthwhile(&mut self, offset: u32, need: u32) {
        let header_size = self.header(offset).size;
        let remainder = header_size as i64 - need as i64 - HEADER_SIZE as i64;
        if remainder < SPLIT_SLACK as i64 {
            return;
        }
        let new_offset = offset + HEADER_SIZE as u32 + need;
        let new_size = remainder as u32;
        let old_next = self.header(offset).next;

        *self.header_mut(new_offset) = BlockHeader {
            guard: FREED_MAGIC,
            size: new_size,
            id: 0,
            prev: offset,
            next: old_next,
            prov_line: 0,
            prov_file_ptr: core::ptr::null(),
            prov_file_len: 0,
        };
        if old_next != NONE_OFFSET {
            self.header_mut(old_next).prev = new_offset;
        }
        let h = self.header_mut(offset);
        h.size = need;
        h.next = new_offset;

        // The new header itself eats into what was free payload a moment ago.
        self.stats.free_bytes = self.stats.free_bytes.saturating_sub(HEADER_SIZE as u64);
    }

    pub fn alloc(&mut self, size: u32, provenance: Provenance) -> KernelResult<NonNull<u8>> {
        if size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let need = Self::round_size(size);
        let Some(offset) = self.find_best_fit(need) else {
            self.stats.failed_allocations += 1;
            return Err(KernelError::OutOfMemory);
        };
        self.split_if_worthwhile(offset, need);

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let (file_ptr, file_len) = (provenance.file.as_ptr(), provenance.file.len());
        let actual_size = self.header(offset).size;
        let h = self.header_mut(offset);
        h.guard = ALLOCATED_MAGIC;
        h.id = id;
        h.prov_line = provenance.line;
        h.prov_file_ptr = file_ptr;
        h.prov_file_len = file_len;

        self.insert_record(offset, actual_size, provenance, id);
        self.stats.total_allocations += 1;
        self.stats.used_bytes += actual_size as u64;
        self.stats.free_bytes = self.stats.free_bytes.saturating_sub(actual_size as u64);
        self.recompute_largest_free();

        let ptr = self.payload_ptr(offset);
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    pub fn free(&mut self, ptr: NonNull<u8>, _provenance: Provenance) {
        let Some(offset) = self.offset_of_payload(ptr.as_ptr()) else {
            klog_warn!("heap free: pointer outside arena");
            return;
        };
        let guard = self.header(offset).guard;
        if guard == FREED_MAGIC {
            klog_warn!("heap free: double free detected at offset {}", offset);
            return;
        }
        if guard != ALLOCATED_MAGIC {
            klog_warn!("heap free: corrupted header at offset {}", offset);
            return;
        }

        let size = self.header(offset).size;
        unsafe {
            core::ptr::write_bytes(self.payload_ptr(offset), SCRUB_BYTE, size as usize);
        }
        let h = self.header_mut(offset);
        h.guard = FREED_MAGIC;
        h.id = 0;

        if let Some(slot) = self.find_record(offset) {
            self.records[slot].used = false;
        }

        self.stats.total_frees += 1;
        self.stats.used_bytes = self.stats.used_bytes.saturating_sub(size as u64);
        self.stats.free_bytes += size as u64;

        let offset = self.coalesce_with_next(offset);
        self.coalesce_with_prev(offset);
        self.recompute_largest_free();
    }

    fn coalesce_with_next(&mut self, offset: u32) -> u32 {
        let next = self.header(offset).next;
        if next == NONE_OFFSET || self.header(next).guard != FREED_MAGIC {
            return offset;
        }
        let next_size = self.header(next).size;
        let next_next = self.header(next).next;
        let merged_size = self.header(offset).size + HEADER_SIZE as u32 + next_size;

        let h = self.header_mut(offset);
        h.size = merged_size;
        h.next = next_next;
        if next_next != NONE_OFFSET {
            self.header_mut(next_next).prev = offset;
        }
        // The absorbed header's bytes become free payload again.
        self.stats.free_bytes += HEADER_SIZE as u64;
        self.stats.coalesce_events += 1;
        offset
    }

    fn coalesce_with_prev(&mut self, offset: u32) -> u32 {
        let prev = self.header(offset).prev;
        if prev == NONE_OFFSET || self.header(prev).guard != FREED_MAGIC {
            return offset;
        }
        self.coalesce_with_next(prev)
    }

    fn recompute_largest_free(&mut self) {
        let mut largest = 0u32;
        let mut cursor = self.head;
        while cursor != NONE_OFFSET {
            let h = self.header(cursor);
            if h.guard == FREED_MAGIC && h.size > largest {
                largest = h.size;
            }
            cursor = h.next;
        }
        self.stats.largest_free_block = largest;
    }

    pub fn calloc(&mut self, n: u32, sz: u32, provenance: Provenance) -> KernelResult<NonNull<u8>> {
        if n == 0 || sz == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let total = n.checked_mul(sz).ok_or(KernelError::InvalidArgument)?;
        if total / n != sz {
            return Err(KernelError::InvalidArgument);
        }
        let ptr = self.alloc(total, provenance)?;
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0, total as usize);
        }
        Ok(ptr)
    }

    pub fn realloc(
        &mut self,
        ptr: NonNull<u8>,
        new_size: u32,
        provenance: Provenance,
    ) -> KernelResult<NonNull<u8>> {
        let Some(offset) = self.offset_of_payload(ptr.as_ptr()) else {
            return Err(KernelError::InvalidArgument);
        };
        let old_size = self.header(offset).size;
        let need = Self::round_size(new_size);
        if need <= old_size {
            return Ok(ptr);
        }
        let new_ptr = self.alloc(new_size, provenance)?;
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr(),
                new_ptr.as_ptr(),
                old_size.min(need) as usize,
            );
        }
        self.free(ptr, provenance);
        Ok(new_ptr)
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Total bytes the arena spans, including every block's header overhead.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of live blocks (allocated or free) in the chain.
    pub fn live_block_count(&self) -> u32 {
        let mut count = 0u32;
        let mut cursor = self.head;
        while cursor != NONE_OFFSET {
            count += 1;
            cursor = self.header(cursor).next;
        }
        count
    }

    /// Sum of `used_bytes`, `free_bytes`, and every live block's header
    /// overhead. Should always equal [`KernelHeap::capacity`]; callers use
    /// this to check the conservation invariant after a sequence of
    /// allocs/frees without reaching into the block chain themselves.
    pub fn accounted_bytes(&self) -> u64 {
        self.stats.used_bytes
            + self.stats.free_bytes
            + self.live_block_count() as u64 * HEADER_SIZE as u64
    }

    /// Returns `true` when every header guard, free/alloc consistency, and
    /// neighbor link is sound.
    pub fn heap_integrity_check(&self) -> bool {
        let mut cursor = self.head;
        let mut prev_offset = NONE_OFFSET;
        while cursor != NONE_OFFSET {
            let h = self.header(cursor);
            if h.guard != ALLOCATED_MAGIC && h.guard != FREED_MAGIC {
                return false;
            }
            if h.prev != prev_offset {
                return false;
            }
            prev_offset = cursor;
            cursor = h.next;
        }
        true
    }

    /// Emits the current stats plus a fragmentation estimate through `klog`
    /// at `Info` level.
    pub fn print_stats(&self) {
        let stats = self.stats;
        klog_info!("=== Kernel Heap Statistics ===");
        klog_info!("Total size: {} bytes", self.capacity);
        klog_info!("Allocated: {} bytes", stats.used_bytes);
        klog_info!("Free: {} bytes", stats.free_bytes);
        klog_info!("Allocations: {}", stats.total_allocations);
        klog_info!("Frees: {}", stats.total_frees);
        klog_info!("Largest free block: {} bytes", stats.largest_free_block);
        klog_info!("Fragmentation: {}%", stats.fragmentation_ratio());
    }

    /// Walks the side table and logs every still-live allocation, returning
    /// the count of leaks found.
    pub fn leak_scan(&self) -> u32 {
        let mut leaks = 0u32;
        for record in self.records.iter() {
            if record.used {
                klog_debug!(
                    "leak: id={} size={} at {}:{}",
                    record.id,
                    record.size,
                    record.provenance.file,
                    record.provenance.line
                );
                leaks += 1;
            }
        }
        leaks
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use tradekernel_abi::prov;

    fn new_heap(size: usize) -> (KernelHeap, &'static mut [u8]) {
        let arena: &'static mut [u8] = std::vec![0u8; size].leak();
        let mut heap = KernelHeap::uninit();
        unsafe { heap.init(arena, || 0) };
        (heap, &mut [])
    }

    #[test]
    fn alloc_and_free_round_trip() {
        let (mut heap, _) = new_heap(4096);
        let p = heap.alloc(64, prov!()).unwrap();
        assert!(heap.heap_integrity_check());
        heap.free(p, prov!());
        assert!(heap.heap_integrity_check());
        assert_eq!(heap.stats().used_bytes, 0);
    }

    #[test]
    fn double_free_is_rejected_without_mutation() {
        let (mut heap, _) = new_heap(4096);
        let p = heap.alloc(32, prov!()).unwrap();
        heap.free(p, prov!());
        let frees_before = heap.stats().total_frees;
        heap.free(p, prov!());
        assert_eq!(heap.stats().total_frees, frees_before);
    }

    #[test]
    fn coalesces_adjacent_frees() {
        let (mut heap, _) = new_heap(4096);
        let a = heap.alloc(64, prov!()).unwrap();
        let b = heap.alloc(64, prov!()).unwrap();
        heap.free(a, prov!());
        heap.free(b, prov!());
        assert!(heap.stats().coalesce_events >= 1);
    }

    #[test]
    fn out_of_memory_returns_err_and_increments_failures() {
        let (mut heap, _) = new_heap(128);
        let result = heap.alloc(4096, prov!());
        assert!(result.is_err());
        assert_eq!(heap.stats().failed_allocations, 1);
    }

    #[test]
    fn leak_scan_counts_live_allocations() {
        let (mut heap, _) = new_heap(4096);
        let _a = heap.alloc(16, prov!()).unwrap();
        let _b = heap.alloc(16, prov!()).unwrap();
        assert_eq!(heap.leak_scan(), 2);
    }

    #[test]
    fn calloc_rejects_overflowing_size() {
        let (mut heap, _) = new_heap(4096);
        assert!(heap.calloc(u32::MAX, 2, prov!()).is_err());
    }

    fn assert_conserved(heap: &KernelHeap) {
        assert_eq!(
            heap.accounted_bytes(),
            heap.capacity() as u64,
            "used + free + header overhead must equal arena capacity"
        );
    }

    #[test]
    fn conserves_used_plus_free_across_splits_and_coalesces() {
        let (mut heap, _) = new_heap(4096);
        assert_conserved(&heap);

        let a = heap.alloc(100, prov!()).unwrap(); // splits off a remainder
        assert_conserved(&heap);
        let b = heap.alloc(200, prov!()).unwrap(); // splits again
        assert_conserved(&heap);
        let c = heap.alloc(300, prov!()).unwrap();
        assert_conserved(&heap);

        heap.free(b, prov!());
        assert_conserved(&heap);
        let d = heap.alloc(150, prov!()).unwrap(); // reuses b's region, splits again
        assert_conserved(&heap);

        heap.free(a, prov!());
        assert_conserved(&heap);
        heap.free(c, prov!());
        assert_conserved(&heap); // coalesces with d's trailing remainder
        heap.free(d, prov!());
        assert_conserved(&heap); // coalesces back down to a single block

        assert!(heap.heap_integrity_check());
    }
}
