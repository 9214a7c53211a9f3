//! Collaborators the dispatcher hands to every task.
//!
//! The engine never inspects either of these; it forwards them so a task can
//! allocate scratch space in [`AreaTask::start`](crate::task::AreaTask::start)
//! and poll for cancellation while processing tiles.

use crate::task::TaskError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a caller and running tasks.
///
/// Cloning yields another handle to the same flag. Nothing is interrupted
/// preemptively: a task notices the flag through [`check`](Self::check) and
/// returns [`TaskError::Aborted`].
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(TaskError::Aborted)` once [`abort`](Self::abort) has been called.
    pub fn check(&self) -> Result<(), TaskError> {
        if self.is_aborted() {
            Err(TaskError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Clear the flag so the signal can be reused for another run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Source of zeroed scratch buffers for tasks.
pub trait BufferAllocator: Sync {
    /// Allocate `bytes` zeroed bytes.
    fn allocate(&self, bytes: usize) -> Result<Vec<u8>, TaskError>;
}

/// Plain heap allocation with no limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapAllocator;

impl BufferAllocator for HeapAllocator {
    fn allocate(&self, bytes: usize) -> Result<Vec<u8>, TaskError> {
        Ok(vec![0; bytes])
    }
}

/// Heap allocation that refuses any single request above `max_bytes`.
#[derive(Debug, Clone, Copy)]
pub struct LimitedAllocator {
    pub max_bytes: usize,
}

impl LimitedAllocator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl BufferAllocator for LimitedAllocator {
    fn allocate(&self, bytes: usize) -> Result<Vec<u8>, TaskError> {
        if bytes > self.max_bytes {
            return Err(TaskError::Allocation {
                requested: bytes,
                limit: self.max_bytes,
            });
        }
        Ok(vec![0; bytes])
    }
}
