//! CPU primitives needed by the lock/preemption layer.
//!
//! `cli`/`sti` are privileged instructions unavailable outside ring 0, so the
//! interrupt-mask primitives are split into a hardware backend (used by the
//! kernel binary) and a software-flag backend (used by `#[cfg(test)]` unit
//! tests running as an ordinary host process).

use core::arch::asm;

#[inline(always)]
pub fn hlt() {
    unsafe {
        asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}

#[inline(always)]
pub fn halt_loop() -> ! {
    loop {
        hlt();
    }
}

pub use irq::{are_enabled, disable, enable};

#[cfg(not(test))]
mod irq {
    use x86_64::instructions::interrupts;

    #[inline(always)]
    pub fn are_enabled() -> bool {
        interrupts::are_enabled()
    }

    #[inline(always)]
    pub fn disable() {
        interrupts::disable();
    }

    #[inline(always)]
    pub fn enable() {
        interrupts::enable();
    }
}

#[cfg(test)]
mod irq {
    use core::sync::atomic::{AtomicBool, Ordering};

    static ENABLED: AtomicBool = AtomicBool::new(true);

    pub fn are_enabled() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }

    pub fn disable() {
        ENABLED.store(false, Ordering::SeqCst);
    }

    pub fn enable() {
        ENABLED.store(true, Ordering::SeqCst);
    }
}
