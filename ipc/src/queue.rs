//! Keyed, fixed-capacity message queues.
//!
//! This is the purely non-blocking conforming implementation the spec
//! permits: a full queue on `send` or an empty queue on `receive` always
//! returns an error, regardless of the `NOWAIT` flag — there is no parking
//! on the scheduler's block/unblock primitives. See `DESIGN.md`.

use tradekernel_abi::{
    ipc::{IpcFlags, IPC_PERM_MASK, IPC_RMID},
    KernelError, KernelResult, MAX_MESSAGE_QUEUES, MAX_MESSAGE_SIZE, MAX_QUEUE_MESSAGES,
};
use tradekernel_lib::IrqMutex;

#[derive(Clone, Copy)]
pub struct Message {
    pub msg_type: u32,
    pub sender_pid: u32,
    pub size: u32,
    pub payload: [u8; MAX_MESSAGE_SIZE],
    pub timestamp: u64,
    pub priority: u32,
}

impl Message {
    fn empty() -> Self {
        Self {
            msg_type: 0,
            sender_pid: 0,
            size: 0,
            payload: [0; MAX_MESSAGE_SIZE],
            timestamp: 0,
            priority: 0,
        }
    }
}

struct QueueSlot {
    in_use: bool,
    id: u32,
    key: u32,
    #[allow(dead_code)]
    creator_pid: u32,
    #[allow(dead_code)]
    permissions: u32,
    messages: [Message; MAX_QUEUE_MESSAGES],
    head: usize,
    tail: usize,
    count: usize,
}

impl QueueSlot {
    const fn empty_slot() -> Self {
        Self {
            in_use: false,
            id: 0,
            key: 0,
            creator_pid: 0,
            permissions: 0,
            messages: [Message {
                msg_type: 0,
                sender_pid: 0,
                size: 0,
                payload: [0; MAX_MESSAGE_SIZE],
                timestamp: 0,
                priority: 0,
            }; MAX_QUEUE_MESSAGES],
            head: 0,
            tail: 0,
            count: 0,
        }
    }
}

pub struct MessageQueueTable {
    slots: [QueueSlot; MAX_MESSAGE_QUEUES],
    next_id: u32,
}

impl MessageQueueTable {
    pub const fn new() -> Self {
        const EMPTY: QueueSlot = QueueSlot::empty_slot();
        Self {
            slots: [EMPTY; MAX_MESSAGE_QUEUES],
            next_id: 1,
        }
    }

    fn find_by_key(&self, key: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.in_use && s.key == key)
    }

    fn find_by_id(&self, id: u32) -> Option<usize> {
        self.slots.iter().position(|s| s.in_use && s.id == id)
    }

    /// Returns the id of the queue keyed by `key`, creating it if `CREATE`
    /// is set in `flags` and no such queue exists.
    pub fn queue_get(&mut self, key: u32, flags: IpcFlags, creator_pid: u32) -> KernelResult<u32> {
        if let Some(idx) = self.find_by_key(key) {
            return Ok(self.slots[idx].id);
        }
        if !flags.contains(IpcFlags::CREATE) {
            return Err(KernelError::NotFound);
        }
        let idx = self
            .slots
            .iter()
            .position(|s| !s.in_use)
            .ok_or(KernelError::OutOfMemory)?;
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.slots[idx] = QueueSlot {
            in_use: true,
            id,
            key,
            creator_pid,
            permissions: flags.bits() & IPC_PERM_MASK,
            ..QueueSlot::empty_slot()
        };
        Ok(id)
    }

    pub fn send(
        &mut self,
        id: u32,
        msg_type: u32,
        payload: &[u8],
        sender_pid: u32,
        tick: u64,
    ) -> KernelResult<()> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(KernelError::InvalidArgument);
        }
        let idx = self.find_by_id(id).ok_or(KernelError::NotFound)?;
        let queue = &mut self.slots[idx];
        if queue.count == MAX_QUEUE_MESSAGES {
            return Err(KernelError::QueueFull);
        }
        let mut msg = Message::empty();
        msg.msg_type = msg_type;
        msg.sender_pid = sender_pid;
        msg.size = payload.len() as u32;
        msg.payload[..payload.len()].copy_from_slice(payload);
        msg.timestamp = tick;

        queue.messages[queue.tail] = msg;
        queue.tail = (queue.tail + 1) % MAX_QUEUE_MESSAGES;
        queue.count += 1;
        Ok(())
    }

    /// Scans from head toward tail for the first message whose type matches
    /// `type_filter` (0 matches any), copies it into `buffer`, and removes
    /// it by shifting later entries toward head to preserve order.
    pub fn receive(
        &mut self,
        id: u32,
        buffer: &mut [u8],
        type_filter: u32,
    ) -> KernelResult<(u32, u32, u32)> {
        let idx = self.find_by_id(id).ok_or(KernelError::NotFound)?;
        let queue = &mut self.slots[idx];
        if queue.count == 0 {
            return Err(KernelError::QueueEmpty);
        }

        let mut found_slot = None;
        for offset in 0..queue.count {
            let slot = (queue.head + offset) % MAX_QUEUE_MESSAGES;
            if type_filter == 0 || queue.messages[slot].msg_type == type_filter {
                found_slot = Some(offset);
                break;
            }
        }
        let Some(offset) = found_slot else {
            return Err(KernelError::QueueEmpty);
        };

        let found_idx = (queue.head + offset) % MAX_QUEUE_MESSAGES;
        let msg = queue.messages[found_idx];
        if msg.size as usize > buffer.len() {
            return Err(KernelError::InvalidArgument);
        }
        buffer[..msg.size as usize].copy_from_slice(&msg.payload[..msg.size as usize]);

        // Shift every message between head and the found slot one step
        // toward the tail, preserving relative order, then drop the tail.
        let mut cursor = offset;
        while cursor > 0 {
            let dst = (queue.head + cursor) % MAX_QUEUE_MESSAGES;
            let src = (queue.head + cursor - 1) % MAX_QUEUE_MESSAGES;
            queue.messages[dst] = queue.messages[src];
            cursor -= 1;
        }
        queue.head = (queue.head + 1) % MAX_QUEUE_MESSAGES;
        queue.count -= 1;

        Ok((msg.size, msg.msg_type, msg.sender_pid))
    }

    /// `IPC_RMID` frees the slot; any other command is reserved/unsupported.
    pub fn queue_ctl(&mut self, id: u32, cmd: i32) -> KernelResult<()> {
        let idx = self.find_by_id(id).ok_or(KernelError::NotFound)?;
        if cmd == IPC_RMID {
            self.slots[idx] = QueueSlot::empty_slot();
            Ok(())
        } else {
            Err(KernelError::InvalidArgument)
        }
    }
}

impl Default for MessageQueueTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide message queue table. Send/receive are serialized by
/// this lock, satisfying the "never observed in an inconsistent
/// intermediate shape" concurrency invariant.
pub static MESSAGE_QUEUES: IrqMutex<MessageQueueTable> = IrqMutex::new(MessageQueueTable::new());
