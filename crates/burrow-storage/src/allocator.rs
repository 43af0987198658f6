use burrow_core::{LinkId, Result, StorageError};

/// Sequential id allocator shared by every backend.
///
/// Produces `1, 2, 3, ...` and never hands out the same id twice. It is a
/// plain counter: callers guard it with whatever lock already protects their
/// state. Cloning snapshots the counter, which lets a backend allocate into a
/// copy and only publish it once the write has been committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    /// Creates an allocator for an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator that continues after `last` already-assigned ids.
    pub fn resume_from(last: u64) -> Self {
        Self { last }
    }

    /// Returns the number of ids handed out so far.
    pub fn last(&self) -> u64 {
        self.last
    }

    /// Hands out the next id.
    ///
    /// Fails without advancing once the `u64` id space is used up.
    pub fn allocate(&mut self) -> Result<LinkId> {
        let next = self
            .last
            .checked_add(1)
            .and_then(LinkId::new)
            .ok_or_else(|| StorageError::InvalidData("link id space exhausted".to_string()))?;
        self.last = next.get();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequentially_from_one() {
        let mut allocator = IdAllocator::new();

        assert_eq!(allocator.allocate().unwrap().to_string(), "1");
        assert_eq!(allocator.allocate().unwrap().to_string(), "2");
        assert_eq!(allocator.allocate().unwrap().to_string(), "3");
        assert_eq!(allocator.last(), 3);
    }

    #[test]
    fn resumes_after_existing_ids() {
        let mut allocator = IdAllocator::resume_from(41);

        assert_eq!(allocator.allocate().unwrap().get(), 42);
    }

    #[test]
    fn clone_is_an_independent_snapshot() {
        let mut allocator = IdAllocator::new();
        allocator.allocate().unwrap();

        let mut staged = allocator.clone();
        staged.allocate().unwrap();
        staged.allocate().unwrap();

        // The original is untouched until the staged copy is published.
        assert_eq!(allocator.last(), 1);
        assert_eq!(staged.last(), 3);

        allocator = staged;
        assert_eq!(allocator.allocate().unwrap().get(), 4);
    }

    #[test]
    fn exhausted_id_space_is_an_error() {
        let mut allocator = IdAllocator::resume_from(u64::MAX);

        assert!(matches!(
            allocator.allocate().unwrap_err(),
            StorageError::InvalidData(_)
        ));
        assert_eq!(allocator.last(), u64::MAX);
    }
}
