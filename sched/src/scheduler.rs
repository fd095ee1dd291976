//! Priority-preemptive scheduler: five FIFO ready queues, round-robin
//! fairness within a priority, and a mandatory idle task.

use tradekernel_abi::{
    KernelError, KernelResult, Priority, SchedulingPolicy, TaskState, DEFAULT_TIME_SLICE_TICKS,
    NUM_PRIORITY_LEVELS, TICK_HZ,
};
use tradekernel_lib::{klog_debug, klog_info, klog_warn};

use crate::task::{ChildBuf, TaskTable, NONE_TASK};

/// Intrusive FIFO over task ids, linked through each `Task`'s
/// `queue_next`/`queue_prev` fields.
#[derive(Default)]
struct ReadyQueue {
    head: u32,
    tail: u32,
    count: u32,
}

impl ReadyQueue {
    const fn new() -> Self {
        Self {
            head: NONE_TASK,
            tail: NONE_TASK,
            count: 0,
        }
    }

    fn push_back(&mut self, tasks: &mut TaskTable, id: u32) {
        if let Some(t) = tasks.get_mut(id) {
            t.queue_next = NONE_TASK;
            t.queue_prev = self.tail;
        }
        if self.tail != NONE_TASK {
            if let Some(t) = tasks.get_mut(self.tail) {
                t.queue_next = id;
            }
        } else {
            self.head = id;
        }
        self.tail = id;
        self.count += 1;
    }

    fn pop_front(&mut self, tasks: &mut TaskTable) -> Option<u32> {
        if self.head == NONE_TASK {
            return None;
        }
        let id = self.head;
        let next = tasks.get(id).map(|t| t.queue_next).unwrap_or(NONE_TASK);
        self.head = next;
        if next != NONE_TASK {
            if let Some(t) = tasks.get_mut(next) {
                t.queue_prev = NONE_TASK;
            }
        } else {
            self.tail = NONE_TASK;
        }
        self.count -= 1;
        if let Some(t) = tasks.get_mut(id) {
            t.queue_next = NONE_TASK;
            t.queue_prev = NONE_TASK;
        }
        Some(id)
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Default, Clone, Copy)]
pub struct SchedulerStats {
    pub context_switches: u64,
    pub preemptions: u64,
    pub voluntary_yields: u64,
    pub load_average: u32,
}

pub struct Scheduler {
    tasks: TaskTable,
    ready: [ReadyQueue; NUM_PRIORITY_LEVELS],
    blocked: ReadyQueue,
    terminated: ReadyQueue,
    current: u32,
    tick_count: u64,
    stats: SchedulerStats,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: TaskTable::new(),
            ready: [
                ReadyQueue::new(),
                ReadyQueue::new(),
                ReadyQueue::new(),
                ReadyQueue::new(),
                ReadyQueue::new(),
            ],
            blocked: ReadyQueue::new(),
            terminated: ReadyQueue::new(),
            current: 0,
            tick_count: 0,
            stats: SchedulerStats {
                context_switches: 0,
                preemptions: 0,
                voluntary_yields: 0,
                load_average: 0,
            },
        }
    }

    /// Installs the idle task (id 0) and makes it the running task. Must be
    /// called exactly once, before any `spawn`.
    pub fn init(&mut self, idle_stack_base: usize, idle_stack_size: usize, idle_entry: usize) {
        self.tasks
            .install_idle(idle_stack_base, idle_stack_size, idle_entry);
        self.set_state(0, TaskState::Running);
        self.current = 0;
    }

    /// Applies a task state transition, refusing and logging an illegal edge
    /// instead of mutating. Returns whether the transition was applied.
    fn set_state(&mut self, id: u32, next: TaskState) -> bool {
        if let Some(t) = self.tasks.get_mut(id) {
            if t.state.can_transition(next) {
                t.state = next;
                return true;
            }
            klog_warn!("illegal task state transition: task {} {:?} -> {:?}", id, t.state, next);
        }
        false
    }

    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        &mut self,
        parent_id: u32,
        name: &str,
        priority: Priority,
        policy: SchedulingPolicy,
        entry: usize,
        stack_base: usize,
        stack_size: usize,
    ) -> KernelResult<u32> {
        let slice = match policy {
            SchedulingPolicy::RoundRobin => DEFAULT_TIME_SLICE_TICKS,
            SchedulingPolicy::Fifo => 0,
        };
        let id = self
            .tasks
            .create(
                parent_id,
                name,
                priority,
                policy,
                entry,
                stack_base,
                stack_size,
                slice,
                self.tick_count,
            )
            .ok_or(KernelError::OutOfMemory)?;
        self.transition_to_ready(id);
        Ok(id)
    }

    fn transition_to_ready(&mut self, id: u32) {
        if !self.set_state(id, TaskState::Ready) {
            return;
        }
        if let Some(t) = self.tasks.get_mut(id) {
            t.remaining_slice = t.time_slice;
            let prio = t.priority.index();
            self.ready[prio].push_back(&mut self.tasks, id);
        }
    }

    /// Scans ready queues from `Realtime` to `Idle`; the idle task (never
    /// itself enqueued) is the fallback when every queue is empty.
    fn pick_next(&mut self) -> u32 {
        for queue in self.ready.iter_mut() {
            if !queue.is_empty() {
                if let Some(id) = queue.pop_front(&mut self.tasks) {
                    return id;
                }
            }
        }
        0
    }

    fn switch_to(&mut self, next: u32) {
        if next == self.current {
            return;
        }
        if let Some(cur) = self.tasks.get_mut(self.current) {
            cur.last_run_tick = self.tick_count;
            cur.context_switches += 1;
        }
        // Idle's state is pinned at Running for its whole lifetime (it is
        // never enqueued Ready/Blocked/Terminated), so re-selecting it here
        // is not a fresh Ready->Running edge; skip the check for it.
        if next != 0 {
            self.set_state(next, TaskState::Running);
        }
        if let Some(t) = self.tasks.get_mut(next) {
            t.last_run_tick = self.tick_count;
        }
        self.current = next;
        self.stats.context_switches += 1;
    }

    pub fn current_task_id(&self) -> u32 {
        self.current
    }

    pub fn task(&self, id: u32) -> Option<&crate::task::Task> {
        self.tasks.get(id)
    }

    /// Re-enqueues the running task at the tail of its ready queue and
    /// switches to whatever `pick_next` selects.
    fn scheduler_preempt(&mut self) {
        let cur = self.current;
        if cur != 0 {
            self.set_state(cur, TaskState::Ready);
            if let Some(t) = self.tasks.get_mut(cur) {
                t.remaining_slice = t.time_slice;
                let prio = t.priority.index();
                self.ready[prio].push_back(&mut self.tasks, cur);
            }
        }
        let next = self.pick_next();
        self.stats.preemptions += 1;
        self.switch_to(next);
    }

    /// Called by the timer-interrupt collaborator on every tick.
    pub fn scheduler_tick(&mut self) {
        self.tick_count += 1;
        let cur = self.current;

        let mut should_preempt = false;
        if let Some(t) = self.tasks.get_mut(cur) {
            t.accumulated_ticks += 1;
            if t.policy == SchedulingPolicy::RoundRobin && t.remaining_slice > 0 {
                t.remaining_slice -= 1;
            }
        }

        let higher_priority_ready = self
            .tasks
            .get(cur)
            .map(|t| self.ready[..t.priority.index()].iter().any(|q| !q.is_empty()))
            .unwrap_or(false);

        if let Some(t) = self.tasks.get(cur) {
            should_preempt = match t.policy {
                SchedulingPolicy::Fifo => higher_priority_ready,
                SchedulingPolicy::RoundRobin => t.remaining_slice == 0 || higher_priority_ready,
            };
        }

        if should_preempt {
            self.scheduler_preempt();
        }

        if self.tick_count % TICK_HZ == 0 {
            self.recompute_load_average();
        }
    }

    fn recompute_load_average(&mut self) {
        let running = 1u32;
        let realtime_ready = self.ready[Priority::Realtime.index()].count;
        let high_ready = self.ready[Priority::High.index()].count;
        self.stats.load_average = (running + realtime_ready + high_ready) * 100;
        klog_debug!("load average: {}", self.stats.load_average);
    }

    /// Voluntary yield: behaves like preemption, but the slice is refreshed
    /// to the full configured length on re-entry to Ready.
    pub fn yield_now(&mut self) {
        let cur = self.current;
        if cur != 0 {
            self.set_state(cur, TaskState::Ready);
            if let Some(t) = self.tasks.get_mut(cur) {
                t.remaining_slice = t.time_slice;
                let prio = t.priority.index();
                self.ready[prio].push_back(&mut self.tasks, cur);
            }
        }
        let next = self.pick_next();
        self.stats.voluntary_yields += 1;
        self.switch_to(next);
    }

    pub fn block(&mut self, id: u32) -> KernelResult<()> {
        if self.tasks.get(id).is_none() {
            return Err(KernelError::NotFound);
        }
        if !self.set_state(id, TaskState::Blocked) {
            return Err(KernelError::InvalidArgument);
        }
        self.blocked.push_back(&mut self.tasks, id);
        if id == self.current {
            let next = self.pick_next();
            self.switch_to(next);
        }
        Ok(())
    }

    pub fn unblock(&mut self, id: u32) -> KernelResult<()> {
        // Splice `id` out of the blocked queue regardless of position.
        let mut cursor = self.blocked.head;
        while cursor != NONE_TASK {
            let next = self.tasks.get(cursor).map(|t| t.queue_next).unwrap_or(NONE_TASK);
            if cursor == id {
                let prev = self.tasks.get(id).map(|t| t.queue_prev).unwrap_or(NONE_TASK);
                if prev != NONE_TASK {
                    if let Some(p) = self.tasks.get_mut(prev) {
                        p.queue_next = next;
                    }
                } else {
                    self.blocked.head = next;
                }
                if next != NONE_TASK {
                    if let Some(n) = self.tasks.get_mut(next) {
                        n.queue_prev = prev;
                    }
                } else {
                    self.blocked.tail = prev;
                }
                self.blocked.count -= 1;
                self.transition_to_ready(id);
                return Ok(());
            }
            cursor = next;
        }
        Err(KernelError::NotFound)
    }

    pub fn exit(&mut self, id: u32, exit_code: i32) -> KernelResult<()> {
        if id == 0 {
            return Err(KernelError::InvalidArgument);
        }
        self.terminate_tree(id, exit_code);
        if id == self.current {
            let next = self.pick_next();
            self.switch_to(next);
        }
        Ok(())
    }

    /// Terminates every descendant of `id` before `id` itself, per the
    /// spec's "destruction terminates descendants transitively" rule.
    fn terminate_tree(&mut self, id: u32, exit_code: i32) {
        let children: ChildBuf = self.tasks.children_of(id).collect();
        for child in children.iter() {
            self.terminate_tree(*child, exit_code);
        }
        self.set_state(id, TaskState::Zombie);
        if let Some(t) = self.tasks.get_mut(id) {
            t.exit_code = exit_code;
        }
        self.terminated.push_back(&mut self.tasks, id);
        klog_info!("task {} exited, exit_code={}", id, exit_code);
    }

    /// Reaps a zombie task: transitions it to `Terminated` and frees its
    /// table slot, returning the exit code it recorded.
    pub fn reap(&mut self, id: u32) -> KernelResult<i32> {
        let t = self.tasks.get(id).ok_or(KernelError::NotFound)?;
        let code = t.exit_code;
        if !self.set_state(id, TaskState::Terminated) {
            return Err(KernelError::InvalidArgument);
        }
        self.tasks.remove(id);
        Ok(code)
    }

    pub fn kill(&mut self, id: u32, exit_code: i32) -> KernelResult<()> {
        if self.tasks.get(id).is_none() {
            return Err(KernelError::NotFound);
        }
        self.exit(id, exit_code)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    fn new_sched() -> Scheduler {
        let mut s = Scheduler::new();
        s.init(0, 4096, 0);
        s
    }

    #[test]
    fn picks_idle_when_nothing_ready() {
        let mut s = new_sched();
        assert_eq!(s.pick_next(), 0);
    }

    #[test]
    fn higher_priority_preempts_lower() {
        let mut s = new_sched();
        let low = s
            .spawn(0, "low", Priority::Low, SchedulingPolicy::Fifo, 0, 0x1000, 4096)
            .unwrap();
        s.switch_to(low);
        let _high = s
            .spawn(0, "high", Priority::High, SchedulingPolicy::Fifo, 0, 0x2000, 4096)
            .unwrap();
        s.scheduler_tick();
        assert_ne!(s.current_task_id(), low);
    }

    #[test]
    fn round_robin_exhausts_slice_then_rotates() {
        let mut s = new_sched();
        let a = s
            .spawn(0, "a", Priority::Normal, SchedulingPolicy::RoundRobin, 0, 0x1000, 4096)
            .unwrap();
        let b = s
            .spawn(0, "b", Priority::Normal, SchedulingPolicy::RoundRobin, 0, 0x2000, 4096)
            .unwrap();
        s.switch_to(a);
        for _ in 0..DEFAULT_TIME_SLICE_TICKS {
            s.scheduler_tick();
        }
        assert_eq!(s.current_task_id(), b);
    }

    #[test]
    fn yield_refreshes_slice_on_reentry() {
        let mut s = new_sched();
        let a = s
            .spawn(0, "a", Priority::Normal, SchedulingPolicy::RoundRobin, 0, 0x1000, 4096)
            .unwrap();
        s.switch_to(a);
        s.yield_now();
        let t = s.task(a).unwrap();
        assert_eq!(t.remaining_slice, t.time_slice);
    }

    #[test]
    fn block_then_unblock_returns_to_ready() {
        let mut s = new_sched();
        let a = s
            .spawn(0, "a", Priority::Normal, SchedulingPolicy::Fifo, 0, 0x1000, 4096)
            .unwrap();
        s.block(a).unwrap();
        assert_eq!(s.task(a).unwrap().state, TaskState::Blocked);
        s.unblock(a).unwrap();
        assert_eq!(s.task(a).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn exit_terminates_descendants_first() {
        let mut s = new_sched();
        let parent = s
            .spawn(0, "parent", Priority::Normal, SchedulingPolicy::Fifo, 0, 0x1000, 4096)
            .unwrap();
        let child = s
            .spawn(parent, "child", Priority::Normal, SchedulingPolicy::Fifo, 0, 0x2000, 4096)
            .unwrap();
        s.exit(parent, 7).unwrap();
        assert_eq!(s.task(child).unwrap().state, TaskState::Zombie);
        assert_eq!(s.task(parent).unwrap().state, TaskState::Zombie);
    }

    #[test]
    fn kill_nonexistent_task_errors() {
        let mut s = new_sched();
        assert!(s.kill(99, 0).is_err());
    }

    #[test]
    fn reblocking_an_already_blocked_task_is_rejected() {
        let mut s = new_sched();
        let a = s
            .spawn(0, "a", Priority::Normal, SchedulingPolicy::Fifo, 0, 0x1000, 4096)
            .unwrap();
        s.block(a).unwrap();
        assert!(s.block(a).is_err(), "Blocked -> Blocked is not a legal edge");
        assert_eq!(s.task(a).unwrap().state, TaskState::Blocked);
    }

    #[test]
    fn reaping_a_non_zombie_task_is_rejected() {
        let mut s = new_sched();
        let a = s
            .spawn(0, "a", Priority::Normal, SchedulingPolicy::Fifo, 0, 0x1000, 4096)
            .unwrap();
        assert!(s.reap(a).is_err(), "Ready -> Terminated is not a legal edge");
    }
}
