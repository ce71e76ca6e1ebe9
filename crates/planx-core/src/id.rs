//! Strongly-typed identifiers used across the planner.
//!
//! Downstream crates should *not* use raw integers for node ids.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

new_id!(PlanNodeId);

/// Hands out `PlanNodeId`s for one planning session.
///
/// Ids are strictly increasing and never reused. Allocation takes `&self` so the
/// allocator can sit inside read-only optimizer contexts. Concurrent sessions
/// must each own an allocator; sharing one across sessions is never needed.
#[derive(Debug, Default)]
pub struct PlanNodeIdAllocator {
    next: AtomicU64,
}

impl PlanNodeIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a numbering that the host already started (e.g. ids handed out
    /// by the analyzer before optimization).
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> PlanNodeId {
        PlanNodeId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to `next_id` will return. Every id below this
    /// value has been issued by this allocator (or skipped via `starting_at`).
    pub fn peek(&self) -> PlanNodeId {
        PlanNodeId::new(self.next.load(Ordering::Relaxed))
    }

    /// True if `id` was handed out by this allocator's numbering.
    pub fn has_issued(&self, id: PlanNodeId) -> bool {
        id < self.peek()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_unique() {
        let ids = PlanNodeIdAllocator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert!(a < b && b < c);
        assert_eq!(ids.peek(), PlanNodeId::new(3));
        assert!(ids.has_issued(c));
        assert!(!ids.has_issued(ids.peek()));
    }

    #[test]
    fn starting_at_continues_numbering() {
        let ids = PlanNodeIdAllocator::starting_at(100);
        assert_eq!(ids.next_id().get(), 100);
        assert_eq!(ids.next_id().get(), 101);
    }

    #[test]
    fn display_names_the_id_type() {
        assert_eq!(PlanNodeId::new(7).to_string(), "PlanNodeId(7)");
    }
}
