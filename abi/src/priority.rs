//! Task priority classes.
//!
//! Five levels, ordered highest to lowest. `NUM_PRIORITY_LEVELS` sizes the
//! scheduler's array of ready queues, one per class.

pub const NUM_PRIORITY_LEVELS: usize = 5;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Realtime = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
    Idle = 4,
}

impl Priority {
    pub const ALL: [Priority; NUM_PRIORITY_LEVELS] = [
        Priority::Realtime,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Idle,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Priority::Realtime),
            1 => Some(Priority::High),
            2 => Some(Priority::Normal),
            3 => Some(Priority::Low),
            4 => Some(Priority::Idle),
            _ => None,
        }
    }
}
