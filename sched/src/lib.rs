//! Priority-preemptive scheduler and task table: five ready queues, a
//! process tree, and the tick/yield/block/exit operations that drive them.
#![no_std]

pub mod scheduler;
pub mod task;

pub use scheduler::{Scheduler, SchedulerStats};
pub use task::{Task, TaskContext, TaskName, TaskTable};

use tradekernel_lib::IrqMutex;

/// The process-wide scheduler, behind the crate's IRQ-safe mutex.
pub static SCHEDULER: IrqMutex<Scheduler> = IrqMutex::new(Scheduler::new());

/// Tick counter accessor suitable as the heap's `tick_source`.
pub fn current_tick() -> u64 {
    SCHEDULER.lock().tick_count()
}
