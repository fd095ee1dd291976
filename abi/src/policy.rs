//! Intra-priority-class scheduling policy.

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    #[default]
    Fifo = 0,
    RoundRobin = 1,
}
