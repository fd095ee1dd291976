//! Boot shim wiring the allocator, scheduler and IPC layers together.
//!
//! No GDT/IDT/paging/driver code lives here — that layer is explicitly out
//! of scope; this binary only initializes the heap, installs the serial
//! console sink, spawns the idle task and programs the PIT divisor.
#![no_std]
#![no_main]
#![forbid(unsafe_op_in_unsafe_fn)]

mod serial;
mod timer;

use core::panic::PanicInfo;

use tradekernel_lib::{cpu, klog_info};
use tradekernel_mm::GlobalHeap;

#[global_allocator]
static GLOBAL_ALLOCATOR: GlobalHeap = GlobalHeap;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial::init();
    tradekernel_lib::console::set_sink(&serial::SERIAL);
    klog_info!("kernel panic: {info}");
    cpu::halt_loop();
}

// `core` is precompiled for this host triple with unwinding enabled, so its
// debug-frame entries reference this symbol even though `panic = "abort"`
// means it is never actually invoked. Stub it out so the freestanding
// binary links.
#[unsafe(no_mangle)]
extern "C" fn rust_eh_personality() {}

const IDLE_STACK_SIZE: usize = 16 * 1024;

#[repr(C, align(16))]
struct IdleStack([u8; IDLE_STACK_SIZE]);
static mut IDLE_STACK: IdleStack = IdleStack([0; IDLE_STACK_SIZE]);

extern "C" fn idle_entry() -> ! {
    cpu::halt_loop();
}

#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    serial::init();
    tradekernel_lib::console::set_sink(&serial::SERIAL);
    klog_info!("TradeKernel core online");

    unsafe {
        tradekernel_mm::init_heap(tradekernel_sched::current_tick);
    }

    #[allow(static_mut_refs)]
    let idle_stack_base = &raw const IDLE_STACK as usize;
    tradekernel_sched::SCHEDULER
        .lock()
        .init(idle_stack_base, IDLE_STACK_SIZE, idle_entry as *const () as usize);

    timer::init(tradekernel_abi::TICK_HZ as u32);
    klog_info!("scheduler and heap initialized, entering halt loop");

    cpu::halt_loop()
}
