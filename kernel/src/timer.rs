//! PIT programming and the scheduler tick hook.
//!
//! Programming the channel 0 divisor is real hardware setup; wiring the
//! resulting IRQ0 to this module's [`tick`] is out of scope (no IDT here),
//! so `tick` is the stub a future interrupt handler calls.

use x86_64::instructions::port::Port;

const PIT_BASE_FREQUENCY_HZ: u32 = 1_193_182;
const PIT_CHANNEL0_PORT: u16 = 0x40;
const PIT_COMMAND_PORT: u16 = 0x43;
const PIT_COMMAND_CHANNEL0_LOHI_SQUARE: u8 = 0x36;

/// Programs channel 0 to fire at `frequency_hz`, clamped to the PIT's range.
pub fn init(frequency_hz: u32) {
    let frequency_hz = frequency_hz.clamp(19, PIT_BASE_FREQUENCY_HZ);
    let divisor = (PIT_BASE_FREQUENCY_HZ / frequency_hz).clamp(1, 0xFFFF) as u16;

    let mut command: Port<u8> = Port::new(PIT_COMMAND_PORT);
    let mut channel0: Port<u8> = Port::new(PIT_CHANNEL0_PORT);
    unsafe {
        command.write(PIT_COMMAND_CHANNEL0_LOHI_SQUARE);
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }
}

/// Advances the scheduler by one tick. Call this from IRQ0 once an IDT
/// exists; nothing in this crate calls it on a timer yet.
#[allow(dead_code)]
pub fn tick() {
    tradekernel_sched::SCHEDULER.lock().scheduler_tick();
}
