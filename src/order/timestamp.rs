use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Age of a context. Smaller is older.
///
/// Timestamps are handed out by [`Timestamp::next`] from a single
/// process-wide counter, so no two are ever equal and their order matches
/// the order in which they were allocated. A timestamp also serves as the
/// identity of the context that carries it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        // Relaxed is enough: only uniqueness and the modification order of NEXT matter
        Self(NEXT.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_older_than(self, other: Timestamp) -> bool {
        self < other
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts#{}", self.0)
    }
}
