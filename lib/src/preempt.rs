//! Preemption accounting.
//!
//! RAII guards track whether the scheduler may preempt the current task.
//! Guards nest: preemption only re-enables once every guard on the current
//! call stack has dropped, matching the concurrency model's rule that
//! mutations to shared scheduler/allocator/IPC state run with preemption
//! disabled.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::cpu;

static PREEMPT_COUNT: AtomicU32 = AtomicU32::new(0);
static RESCHEDULE_PENDING: AtomicU32 = AtomicU32::new(0);
static mut RESCHEDULE_CALLBACK: Option<fn()> = None;

/// RAII guard that disables preemption while held.
/// Guards are nestable: preemption re-enables only when all guards drop.
/// `!Send`/`!Sync`: must stay on the CPU context that created it.
#[must_use = "if unused, preemption will be immediately re-enabled"]
pub struct PreemptGuard {
    _marker: PhantomData<*mut ()>,
}

impl PreemptGuard {
    #[inline]
    pub fn new() -> Self {
        PREEMPT_COUNT.fetch_add(1, Ordering::SeqCst);
        Self {
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn is_active() -> bool {
        PREEMPT_COUNT.load(Ordering::SeqCst) > 0
    }

    #[inline]
    pub fn count() -> u32 {
        PREEMPT_COUNT.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set_reschedule_pending() {
        RESCHEDULE_PENDING.store(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_reschedule_pending() -> bool {
        RESCHEDULE_PENDING.load(Ordering::SeqCst) != 0
    }

    #[inline]
    pub fn clear_reschedule_pending() {
        RESCHEDULE_PENDING.store(0, Ordering::SeqCst);
    }
}

impl Default for PreemptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PreemptGuard {
    #[inline]
    fn drop(&mut self) {
        let prev = PREEMPT_COUNT.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "preempt_count underflow");

        if prev == 1 && RESCHEDULE_PENDING.swap(0, Ordering::SeqCst) != 0 {
            // SAFETY: only assigned during early boot, before interrupts are enabled.
            if let Some(callback) = unsafe { RESCHEDULE_CALLBACK } {
                callback();
            }
        }
    }
}

/// Combined interrupt-disable + preemption-disable guard. On drop:
/// interrupts are restored first, then the preemption guard drops (may
/// trigger a deferred reschedule once interrupts are back on).
#[must_use = "if unused, protection will be immediately released"]
pub struct IrqPreemptGuard {
    were_enabled: bool,
    _preempt: PreemptGuard,
}

impl IrqPreemptGuard {
    #[inline]
    pub fn new() -> Self {
        let were_enabled = cpu::are_enabled();
        cpu::disable();
        Self {
            were_enabled,
            _preempt: PreemptGuard::new(),
        }
    }
}

impl Default for IrqPreemptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqPreemptGuard {
    #[inline]
    fn drop(&mut self) {
        if self.were_enabled {
            cpu::enable();
        }
    }
}

/// # Safety
/// Must only be called during early boot, before interrupts are enabled.
pub unsafe fn register_reschedule_callback(callback: fn()) {
    RESCHEDULE_CALLBACK = Some(callback);
}

#[inline]
pub fn is_preemption_disabled() -> bool {
    PreemptGuard::is_active()
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    #[test]
    fn nested_guards_track_count() {
        assert_eq!(PreemptGuard::count(), 0);
        let a = PreemptGuard::new();
        assert!(PreemptGuard::is_active());
        let b = PreemptGuard::new();
        assert_eq!(PreemptGuard::count(), 2);
        drop(b);
        assert_eq!(PreemptGuard::count(), 1);
        drop(a);
        assert_eq!(PreemptGuard::count(), 0);
    }
}
