//! Tunable constants shared across the allocator, scheduler and IPC crates.

/// Timer ticks per second the scheduler's quantum and load average are
/// measured against.
pub const TICK_HZ: u64 = 100;

/// Default time slice, in ticks, assigned to a round-robin task.
pub const DEFAULT_TIME_SLICE_TICKS: u32 = 10;

/// Maximum live allocation records the heap's provenance side table tracks
/// at once; older freed slots are recycled.
pub const MAX_ALLOCATION_RECORDS: usize = 1024;

/// Maximum number of tasks the process table holds concurrently.
pub const MAX_TASKS: usize = 64;

/// Maximum number of distinct keyed message queues.
pub const MAX_MESSAGE_QUEUES: usize = 32;

/// Maximum number of messages buffered in a single queue.
pub const MAX_QUEUE_MESSAGES: usize = 64;

/// Maximum payload size, in bytes, of a single IPC message.
pub const MAX_MESSAGE_SIZE: usize = 256;

/// Task name buffer length, in bytes.
pub const TASK_NAME_MAX_LEN: usize = 32;

/// Sentinel task id meaning "no task" / invalid.
pub const INVALID_TASK_ID: u32 = u32::MAX;
