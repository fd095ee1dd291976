//! IPC flag and control-command constants.
//!
//! Numeric values match the System V-style conventions the original message
//! queue implementation was built against, so callers porting forward keep
//! the same flag bits.

use bitflags::bitflags;

bitflags! {
    /// Flags accepted by `queue_get`'s `flags` argument.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IpcFlags: u32 {
        /// Create the queue if it does not already exist.
        const CREATE = 0x200;
        /// Return `WouldBlock` instead of blocking when the queue is full/empty.
        const NOWAIT = 0x800;
    }
}

/// `queue_ctl` command: remove the queue and wake all waiters with an error.
pub const IPC_RMID: i32 = 0;

/// Mask isolating the permission bits packed into a `queue_get` flags word.
pub const IPC_PERM_MASK: u32 = 0o777;
