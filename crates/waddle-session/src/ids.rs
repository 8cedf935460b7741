//! Temporary principal allocation.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::Principal;

/// Issues temporary principals to new connections.
///
/// Every value must be unique for the lifetime of the process and disjoint
/// from permanent user identifiers, i.e. strictly negative.
pub trait IdGenerator: Send + Sync + 'static {
    fn next_temporary(&self) -> Principal;
}

/// Counts down from -1.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicI64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(-1),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn next_temporary(&self) -> Principal {
        Principal::new(self.next.fetch_sub(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_temporary_and_distinct() {
        let ids = SequentialIds::new();
        let a = ids.next_temporary();
        let b = ids.next_temporary();
        assert!(a.is_temporary());
        assert!(b.is_temporary());
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let ids = Arc::new(SequentialIds::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..500).map(|_| ids.next_temporary()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate temporary id {}", id);
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
