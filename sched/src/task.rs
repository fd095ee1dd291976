//! The task control block and the fixed-size table that owns every task.

use tradekernel_abi::{Priority, SchedulingPolicy, TaskState, INVALID_TASK_ID, TASK_NAME_MAX_LEN};

/// Saved general-purpose register state. Primed on creation so that when
/// first restored execution "returns into" the task's entry function.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct TaskContext {
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rsp: u64,
    pub rip: u64,
    pub rflags: u64,
}

#[derive(Clone, Copy)]
pub struct TaskName {
    buf: [u8; TASK_NAME_MAX_LEN],
    len: u8,
}

impl TaskName {
    pub fn new(name: &str) -> Self {
        let mut buf = [0u8; TASK_NAME_MAX_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(TASK_NAME_MAX_LEN - 1);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self { buf, len: n as u8 }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or("")
    }
}

impl Default for TaskName {
    fn default() -> Self {
        Self::new("")
    }
}

pub const NONE_TASK: u32 = INVALID_TASK_ID;

/// Process Control Block. Queue membership (ready/blocked/terminated) and
/// the process tree are both expressed as task-id links into the owning
/// [`TaskTable`] rather than raw pointers.
#[derive(Clone, Copy)]
pub struct Task {
    pub id: u32,
    pub parent_id: u32,
    pub name: TaskName,
    pub state: TaskState,
    pub priority: Priority,
    pub policy: SchedulingPolicy,
    pub context: TaskContext,
    pub stack_base: usize,
    pub stack_size: usize,
    pub entry: usize,

    pub creation_tick: u64,
    pub accumulated_ticks: u64,
    pub last_run_tick: u64,
    pub time_slice: u32,
    pub remaining_slice: u32,

    pub first_child: u32,
    pub next_sibling: u32,

    pub queue_next: u32,
    pub queue_prev: u32,

    pub exit_code: i32,
    pub context_switches: u32,
    pub syscalls: u32,
    pub io_ops: u32,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: u32,
        parent_id: u32,
        name: &str,
        priority: Priority,
        policy: SchedulingPolicy,
        entry: usize,
        stack_base: usize,
        stack_size: usize,
        time_slice: u32,
        creation_tick: u64,
    ) -> Self {
        Self {
            id,
            parent_id,
            name: TaskName::new(name),
            state: TaskState::New,
            priority,
            policy,
            context: TaskContext {
                rsp: (stack_base + stack_size) as u64,
                rip: entry as u64,
                rflags: 0x200, // interrupts enabled on first restore
                ..TaskContext::default()
            },
            stack_base,
            stack_size,
            entry,
            creation_tick,
            accumulated_ticks: 0,
            last_run_tick: creation_tick,
            time_slice,
            remaining_slice: time_slice,
            first_child: NONE_TASK,
            next_sibling: NONE_TASK,
            queue_next: NONE_TASK,
            queue_prev: NONE_TASK,
            exit_code: 0,
            context_switches: 0,
            syscalls: 0,
            io_ops: 0,
        }
    }
}

/// Fixed-capacity task table, indexed by task id. Id 0 is reserved for the
/// idle task; ids 1..MAX_TASKS are handed out round-robin as tasks are
/// created and destroyed.
pub struct TaskTable {
    tasks: [Option<Task>; tradekernel_abi::MAX_TASKS],
    next_id_hint: u32,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self {
            tasks: [None; tradekernel_abi::MAX_TASKS],
            next_id_hint: 1,
        }
    }

    pub fn get(&self, id: u32) -> Option<&Task> {
        self.tasks.get(id as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Task> {
        self.tasks.get_mut(id as usize)?.as_mut()
    }

    pub fn install_idle(&mut self, stack_base: usize, stack_size: usize, entry: usize) {
        self.tasks[0] = Some(Task::new(
            0,
            NONE_TASK,
            "idle",
            Priority::Idle,
            SchedulingPolicy::Fifo,
            entry,
            stack_base,
            stack_size,
            0,
            0,
        ));
        self.tasks[0].as_mut().unwrap().state = TaskState::Ready;
    }

    /// Finds the next free slot in `1..MAX_TASKS`, scanning round-robin
    /// from the last-assigned id, and installs a New task there.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        parent_id: u32,
        name: &str,
        priority: Priority,
        policy: SchedulingPolicy,
        entry: usize,
        stack_base: usize,
        stack_size: usize,
        time_slice: u32,
        creation_tick: u64,
    ) -> Option<u32> {
        let max = tradekernel_abi::MAX_TASKS as u32;
        for offset in 0..(max - 1) {
            let id = 1 + (self.next_id_hint - 1 + offset) % (max - 1);
            if self.tasks[id as usize].is_none() {
                self.next_id_hint = (id % (max - 1)) + 1;
                self.tasks[id as usize] = Some(Task::new(
                    id,
                    parent_id,
                    name,
                    priority,
                    policy,
                    entry,
                    stack_base,
                    stack_size,
                    time_slice,
                    creation_tick,
                ));
                if let Some(parent) = self.get_mut(parent_id) {
                    let old_first = parent.first_child;
                    parent.first_child = id;
                    if let Some(new_child) = self.get_mut(id) {
                        new_child.next_sibling = old_first;
                    }
                }
                return Some(id);
            }
        }
        None
    }

    /// Removes a task from the table entirely, detaching it from its
    /// parent's child list. Does not touch children: callers must reparent
    /// or terminate them first.
    pub fn remove(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        let parent_id = match self.get(id) {
            Some(t) => t.parent_id,
            None => return,
        };
        let id_next_sibling = self.get(id).map(|t| t.next_sibling).unwrap_or(NONE_TASK);
        if let Some(parent) = self.get_mut(parent_id) {
            if parent.first_child == id {
                parent.first_child = id_next_sibling;
            } else {
                let mut cursor = parent.first_child;
                while cursor != NONE_TASK {
                    let next = self.get(cursor).map(|t| t.next_sibling).unwrap_or(NONE_TASK);
                    if next == id {
                        let grandnext = self.get(id).map(|t| t.next_sibling).unwrap_or(NONE_TASK);
                        if let Some(c) = self.get_mut(cursor) {
                            c.next_sibling = grandnext;
                        }
                        break;
                    }
                    cursor = next;
                }
            }
        }
        self.tasks[id as usize] = None;
    }

    /// Returns every direct child id of `id`, most-recently-created first.
    pub fn children_of(&self, id: u32) -> impl Iterator<Item = u32> + '_ {
        let mut cursor = self.get(id).map(|t| t.first_child).unwrap_or(NONE_TASK);
        core::iter::from_fn(move || {
            if cursor == NONE_TASK {
                return None;
            }
            let current = cursor;
            cursor = self.get(cursor).map(|t| t.next_sibling).unwrap_or(NONE_TASK);
            Some(current)
        })
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-capacity buffer of task ids, sized to the task table itself so
/// `terminate_tree` can snapshot a child list without heap allocation.
pub struct ChildBuf {
    items: [u32; tradekernel_abi::MAX_TASKS],
    len: usize,
}

impl ChildBuf {
    pub fn iter(&self) -> core::slice::Iter<'_, u32> {
        self.items[..self.len].iter()
    }
}

impl FromIterator<u32> for ChildBuf {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut items = [0u32; tradekernel_abi::MAX_TASKS];
        let mut len = 0;
        for v in iter {
            if len < items.len() {
                items[len] = v;
                len += 1;
            }
        }
        Self { items, len }
    }
}
