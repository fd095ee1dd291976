//! Typed convenience wrappers over the generic message queue.
//!
//! These are pre-agreed `type` tags plus a typed payload view, not a new
//! IPC mechanism — `send_order`/`receive_order`/`send_market_data`/
//! `receive_market_data`/`send_priority_message`/`receive_priority_message`
//! mirror the originals in `proc/ipc.c`. `broadcast_trade_signal`'s
//! subscriber-list is out of scope and intentionally not restored here.

use core::mem::size_of;

use tradekernel_abi::{KernelError, KernelResult};

use crate::queue::MessageQueueTable;

pub const MSG_MARKET_DATA: u32 = 1;
pub const MSG_ORDER_REQUEST: u32 = 2;
pub const MSG_ORDER_RESPONSE: u32 = 3;
pub const MSG_TRADE_SIGNAL: u32 = 4;
pub const MSG_RISK_UPDATE: u32 = 5;
pub const MSG_PORTFOLIO_DATA: u32 = 6;
pub const MSG_SYSTEM_ALERT: u32 = 7;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MarketData {
    pub price_bits: u64, // f64::to_bits, payload stays POD across the wire
    pub volume: u64,
    pub timestamp: u32,
    pub symbol_id: u16,
    pub side: u8,
    pub flags: u8,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Order {
    pub order_id: u32,
    pub symbol_id: u16,
    pub side: u8,
    pub order_type: u8,
    pub price_bits: u64,
    pub quantity: u64,
    pub timestamp: u32,
    pub client_id: u32,
    pub status: u8,
}

fn as_bytes<T: Copy>(value: &T) -> &[u8] {
    unsafe { core::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) }
}

fn from_bytes<T: Copy + Default>(bytes: &[u8]) -> KernelResult<T> {
    if bytes.len() < size_of::<T>() {
        return Err(KernelError::InvalidArgument);
    }
    let mut value = T::default();
    unsafe {
        core::ptr::copy_nonoverlapping(
            bytes.as_ptr(),
            &mut value as *mut T as *mut u8,
            size_of::<T>(),
        );
    }
    Ok(value)
}

/// Highest priority for orders, matching the original's `priority = 0`.
pub fn send_order(table: &mut MessageQueueTable, queue_id: u32, order: &Order, sender_pid: u32, tick: u64) -> KernelResult<()> {
    table.send(queue_id, MSG_ORDER_REQUEST, as_bytes(order), sender_pid, tick)
}

pub fn receive_order(table: &mut MessageQueueTable, queue_id: u32) -> KernelResult<Order> {
    let mut buf = [0u8; size_of::<Order>()];
    let (size, _, _) = table.receive(queue_id, &mut buf, MSG_ORDER_REQUEST)?;
    from_bytes(&buf[..size as usize])
}

/// High priority for market data, matching the original's `priority = 1`.
pub fn send_market_data(table: &mut MessageQueueTable, queue_id: u32, data: &MarketData, sender_pid: u32, tick: u64) -> KernelResult<()> {
    table.send(queue_id, MSG_MARKET_DATA, as_bytes(data), sender_pid, tick)
}

pub fn receive_market_data(table: &mut MessageQueueTable, queue_id: u32) -> KernelResult<MarketData> {
    let mut buf = [0u8; size_of::<MarketData>()];
    let (size, _, _) = table.receive(queue_id, &mut buf, MSG_MARKET_DATA)?;
    from_bytes(&buf[..size as usize])
}

/// Arbitrary type/payload/priority, for callers that need a type outside
/// the pre-agreed set above. `priority` is carried for parity with the
/// original signature but this queue orders strictly by arrival, not by
/// priority field — see `MessageQueueTable::send`.
pub fn send_priority_message(
    table: &mut MessageQueueTable,
    queue_id: u32,
    msg_type: u32,
    payload: &[u8],
    sender_pid: u32,
    tick: u64,
    _priority: u32,
) -> KernelResult<()> {
    table.send(queue_id, msg_type, payload, sender_pid, tick)
}

pub fn receive_priority_message(
    table: &mut MessageQueueTable,
    queue_id: u32,
    msg_type: u32,
    buffer: &mut [u8],
) -> KernelResult<u32> {
    let (size, _, _) = table.receive(queue_id, buffer, msg_type)?;
    Ok(size)
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use tradekernel_abi::ipc::IpcFlags;

    #[test]
    fn order_round_trips_through_queue() {
        let mut table = MessageQueueTable::new();
        let id = table.queue_get(1, IpcFlags::CREATE, 1).unwrap();
        let order = Order {
            order_id: 42,
            symbol_id: 7,
            side: 0,
            order_type: 1,
            price_bits: 100u64.to_le(),
            quantity: 10,
            timestamp: 123,
            client_id: 9,
            status: 0,
        };
        send_order(&mut table, id, &order, 1, 0).unwrap();
        let received = receive_order(&mut table, id).unwrap();
        assert_eq!(received, order);
    }

    #[test]
    fn market_data_does_not_match_order_filter() {
        let mut table = MessageQueueTable::new();
        let id = table.queue_get(1, IpcFlags::CREATE, 1).unwrap();
        send_market_data(&mut table, id, &MarketData::default(), 1, 0).unwrap();
        assert!(receive_order(&mut table, id).is_err());
    }
}
