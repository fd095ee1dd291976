//! End-to-end scenario tests exercising the allocator, scheduler and IPC
//! layers together, run as ordinary host tests.

#[cfg(test)]
mod scenarios {
    use tradekernel_abi::{prov, Priority, SchedulingPolicy, TaskState};
    use tradekernel_ipc::{queue::MessageQueueTable, ring::Ring};
    use tradekernel_lib::IrqMutex;
    use tradekernel_mm::{KernelHeap, MemoryPool};
    use tradekernel_sched::Scheduler;

    fn new_heap(size: usize) -> &'static IrqMutex<KernelHeap> {
        let arena: &'static mut [u8] = std::vec![0u8; size].leak();
        let mut heap = KernelHeap::uninit();
        unsafe { heap.init(arena, || 0) };
        std::boxed::Box::leak(std::boxed::Box::new(IrqMutex::new(heap)))
    }

    fn new_scheduler() -> Scheduler {
        let mut sched = Scheduler::new();
        sched.init(0, 4096, 0);
        sched
    }

    /// Seed scenario 1: heap round-trip with best-fit reuse and coalescing.
    #[test]
    fn seed_heap_round_trip() {
        let heap = new_heap(4 * 1024 * 1024);
        let mut guard = heap.lock();

        let conserved = |g: &KernelHeap| assert_eq!(g.accounted_bytes(), g.capacity() as u64);

        let a = guard.alloc(100, prov!()).unwrap();
        conserved(&guard);
        let b = guard.alloc(200, prov!()).unwrap();
        conserved(&guard);
        let c = guard.alloc(300, prov!()).unwrap();
        conserved(&guard);
        guard.free(b, prov!());
        conserved(&guard);
        let d = guard.alloc(150, prov!()).unwrap();
        assert_eq!(d, b, "best-fit must reuse b's freed region");
        conserved(&guard);

        guard.free(a, prov!());
        conserved(&guard);
        guard.free(c, prov!());
        conserved(&guard);
        guard.free(d, prov!());
        conserved(&guard);

        let stats = guard.stats();
        assert_eq!(stats.total_allocations, 4);
        assert_eq!(stats.total_frees, 4);
        assert!(stats.coalesce_events >= 1);
        assert!(guard.heap_integrity_check());
    }

    /// Seed scenario 2: leak scan reports exactly the still-live allocations.
    #[test]
    fn seed_leak_scan() {
        let heap = new_heap(64 * 1024);
        let mut guard = heap.lock();

        let _first = guard.alloc(16, prov!()).unwrap();
        let middle = guard.alloc(16, prov!()).unwrap();
        let _third = guard.alloc(16, prov!()).unwrap();
        guard.free(middle, prov!());

        assert_eq!(guard.leak_scan(), 2);
    }

    /// Seed scenario 3: a Ready higher-priority task preempts within one tick.
    #[test]
    fn seed_priority_preemption() {
        let mut sched = new_scheduler();
        let a = sched
            .spawn(0, "a", Priority::Normal, SchedulingPolicy::RoundRobin, 0, 0, 4096)
            .unwrap();
        sched.scheduler_tick();
        assert_eq!(sched.current_task_id(), a);

        let b = sched
            .spawn(0, "b", Priority::High, SchedulingPolicy::RoundRobin, 0, 0, 4096)
            .unwrap();
        sched.scheduler_tick();
        assert_eq!(sched.current_task_id(), b);

        sched.exit(b, 0).unwrap();
        assert_eq!(sched.current_task_id(), a);
    }

    /// Seed scenario 4: round-robin fairness across three equal-priority tasks.
    #[test]
    fn seed_round_robin_fairness() {
        let mut sched = new_scheduler();
        let tasks: std::vec::Vec<u32> = (0..3)
            .map(|i| {
                sched
                    .spawn(
                        0,
                        &std::format!("t{i}"),
                        Priority::Normal,
                        SchedulingPolicy::RoundRobin,
                        0,
                        0,
                        4096,
                    )
                    .unwrap()
            })
            .collect();

        let mut ran_ticks = std::collections::HashMap::new();
        for _ in 0..30 {
            *ran_ticks.entry(sched.current_task_id()).or_insert(0u32) += 1;
            sched.scheduler_tick();
        }

        for id in tasks {
            let count = *ran_ticks.get(&id).unwrap_or(&0);
            assert!((5..=15).contains(&count), "task {id} ran {count} ticks");
        }
    }

    /// Seed scenario 5: type-filtered receive preserves per-type order.
    #[test]
    fn seed_message_queue_ordering() {
        use tradekernel_abi::ipc::IpcFlags;

        let mut table = MessageQueueTable::new();
        let id = table.queue_get(0x1234, IpcFlags::CREATE, 1).unwrap();
        table.send(id, 1, &[0xAA], 1, 0).unwrap();
        table.send(id, 2, &[0xBB], 1, 0).unwrap();
        table.send(id, 1, &[0xCC], 1, 0).unwrap();

        let mut buf = [0u8; 1];
        let (_, _, _) = table.receive(id, &mut buf, 1).unwrap();
        assert_eq!(buf[0], 0xAA);
        let (_, _, _) = table.receive(id, &mut buf, 2).unwrap();
        assert_eq!(buf[0], 0xBB);
        let (_, _, _) = table.receive(id, &mut buf, 1).unwrap();
        assert_eq!(buf[0], 0xCC);
    }

    /// Seed scenario 6: ring capacity rounds up and sacrifices one slot.
    #[test]
    fn seed_spsc_ring() {
        let heap = new_heap(8192);
        let ring: Ring<u64> = Ring::create(heap, 100).unwrap();
        assert_eq!(ring.capacity(), 128);

        for i in 0..127u64 {
            ring.push(i).unwrap();
        }
        assert!(ring.push(999).is_err());

        for i in 0..127u64 {
            assert_eq!(ring.pop().unwrap(), i);
        }
        assert!(ring.pop().is_err());
    }

    /// Pool conservation invariant: free_count + outstanding == block_count
    /// across an arbitrary interleaving of alloc/free.
    #[test]
    fn invariant_pool_conservation() {
        let heap = new_heap(64 * 1024);
        let mut pool = MemoryPool::create(heap, 32, 16).unwrap();

        let mut live = std::vec::Vec::new();
        for _ in 0..10 {
            live.push(pool.alloc().unwrap());
        }
        assert_eq!(pool.free_count() + live.len() as u32, pool.block_count());

        for ptr in live.drain(0..5) {
            pool.free(ptr).unwrap();
        }
        assert_eq!(pool.free_count() + live.len() as u32, pool.block_count());

        for _ in 0..5 {
            live.push(pool.alloc().unwrap());
        }
        assert_eq!(pool.free_count() + live.len() as u32, pool.block_count());

        let mut seen = std::collections::HashSet::new();
        for ptr in &live {
            assert!(seen.insert(ptr.as_ptr() as usize), "duplicate live pointer");
        }
    }

    /// Double-free detection: the second free produces no mutation (the
    /// block remains in its post-first-free state).
    #[test]
    fn invariant_double_free_is_a_no_op() {
        let heap = new_heap(64 * 1024);
        let mut guard = heap.lock();
        let ptr = guard.alloc(64, prov!()).unwrap();
        guard.free(ptr, prov!());
        let stats_after_first = guard.stats();
        guard.free(ptr, prov!());
        let stats_after_second = guard.stats();
        assert_eq!(stats_after_first.total_frees, stats_after_second.total_frees);
        assert!(guard.heap_integrity_check());
    }

    /// Scheduler priority invariant: whenever a Realtime task is Ready, the
    /// scheduler never picks a task of lower priority.
    #[test]
    fn invariant_realtime_always_wins() {
        let mut sched = new_scheduler();
        let normal = sched
            .spawn(0, "n", Priority::Normal, SchedulingPolicy::Fifo, 0, 0, 4096)
            .unwrap();
        sched.scheduler_tick();
        assert_eq!(sched.current_task_id(), normal);

        let rt = sched
            .spawn(0, "rt", Priority::Realtime, SchedulingPolicy::Fifo, 0, 0, 4096)
            .unwrap();
        sched.scheduler_tick();
        assert_eq!(sched.current_task_id(), rt);
        assert_eq!(sched.task(rt).unwrap().state, TaskState::Running);
    }
}
