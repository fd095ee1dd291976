//! Keyed message queues and lock-free SPSC ring buffers: the IPC layer
//! tasks use to hand data to each other without going through the heap
//! allocator's general-purpose path on every message.
#![no_std]

pub mod queue;
pub mod ring;
pub mod trading;

pub use queue::{Message, MessageQueueTable, MESSAGE_QUEUES};
pub use ring::Ring;
