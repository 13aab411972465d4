use std::fmt;

mod frame_store;
mod var_store;

pub use frame_store::{Eviction, Frame, FrameStore};
pub use var_store::VarStore;

/// Process identifier. Frames refer to their owner by id only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub usize);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    OverCapacity { index: usize },
    NoSuchFrame { frame: usize },
    Unallocated { index: usize },
    VarStoreFull,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OverCapacity { index } => {
                write!(f, "line {} is outside the frame store", index)
            }
            MemoryError::NoSuchFrame { frame } => write!(f, "frame {} does not exist", frame),
            MemoryError::Unallocated { index } => write!(f, "line {} is not allocated", index),
            MemoryError::VarStoreFull => write!(f, "variable store is full"),
        }
    }
}

impl std::error::Error for MemoryError {}
