//! Serial console sink: the `ConsoleSink` backing `klog`'s output.

use core::fmt::Write;

use spin::Mutex;
use tradekernel_lib::console::ConsoleSink;
use uart_16550::SerialPort;

const COM1_BASE: u16 = 0x3F8;

static PORT: Mutex<SerialPort> = unsafe { Mutex::new(SerialPort::new(COM1_BASE)) };

pub fn init() {
    PORT.lock().init();
}

pub struct Serial;

impl ConsoleSink for Serial {
    fn write_bytes(&self, bytes: &[u8]) {
        if let Ok(s) = core::str::from_utf8(bytes) {
            let _ = PORT.lock().write_str(s);
        }
    }
}

pub static SERIAL: Serial = Serial;
