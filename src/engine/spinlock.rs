use super::spin::SpinLock;

/// Hands out positions of a fixed index list, each exactly once.
///
/// The cursor is guarded by a [`SpinLock`], so a contended `next` busy-waits.
#[derive(Debug)]
pub struct SpinlockIndexAllocator {
    indices: Vec<usize>,
    cursor: SpinLock<usize>,
}

impl SpinlockIndexAllocator {
    /// Allocator over `0..len`.
    pub fn new(len: usize) -> Self {
        Self::over((0..len).collect())
    }

    /// Allocator over an explicit list of catalog indices (a bucket).
    pub fn over(indices: Vec<usize>) -> Self {
        Self {
            indices,
            cursor: SpinLock::new(0),
        }
    }

    /// Claims the next unclaimed index, or `None` when all are handed out.
    pub fn next(&self) -> Option<usize> {
        let position = {
            let mut cursor = self.cursor.lock();
            let position = *cursor;
            if position < self.indices.len() {
                *cursor += 1;
            }
            position
        };
        self.indices.get(position).copied()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
