use std::ptr;
use tracing::debug;

use super::{LockError, Wdlock};
use crate::order::Timestamp;

/// One transaction: a unique age plus the locks it currently owns.
///
/// A context belongs to a single thread of control. Everything that changes
/// its lock list takes `&mut self`, so no other thread can release on its
/// behalf. Any locks still held when the context is dropped are released.
#[derive(Debug)]
pub struct WdlockCtx<'a> {
    timestamp: Timestamp,
    locks: Vec<&'a Wdlock>,
}

/// Result of a [`WdlockCtx::transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed<R> {
    pub value: R,
    pub retries: usize,
}

impl<'a> WdlockCtx<'a> {
    pub fn new() -> Self {
        Self {
            timestamp: Timestamp::next(),
            locks: Vec::new(),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn held(&self) -> usize {
        self.locks.len()
    }

    pub fn holds(&self, lock: &Wdlock) -> bool {
        self.locks.iter().any(|l| ptr::eq(*l, lock))
    }

    /// Releases every lock this context owns and wakes their waiters.
    ///
    /// Does nothing when no lock is held.
    pub fn release_all(&mut self) {
        let me = self.timestamp;
        for lock in self.locks.drain(..) {
            lock.release(me);
        }
    }

    /// Runs `f` until it commits, backing off whenever it fails to get a lock.
    ///
    /// On `Err` every lock is released and `f` is run again. The timestamp is
    /// kept across attempts, so the context keeps its priority and eventually
    /// becomes the oldest contender. On `Ok` every lock is released as well
    /// and the value is returned.
    ///
    /// ```
    /// use wdlock::{Wdlock, WdlockCtx};
    ///
    /// let (a, b) = (Wdlock::new(), Wdlock::new());
    /// let mut ctx = WdlockCtx::new();
    /// let done = ctx.transaction(|ctx| {
    ///     b.lock(ctx)?;
    ///     a.lock(ctx)?;
    ///     Ok(ctx.held())
    /// });
    /// assert_eq!(done.value, 2);
    /// assert!(!a.is_locked() && !b.is_locked());
    /// ```
    pub fn transaction<R, F>(&mut self, mut f: F) -> Committed<R>
    where
        F: FnMut(&mut Self) -> Result<R, LockError>,
    {
        let mut retries = 0;
        loop {
            match f(self) {
                Ok(value) => {
                    self.release_all();
                    return Committed { value, retries };
                }
                Err(error) => {
                    debug!(ctx = %self.timestamp, %error, retries, "backing off");
                    self.release_all();
                    retries += 1;
                    std::thread::yield_now();
                }
            }
        }
    }

    pub(super) fn push(&mut self, lock: &'a Wdlock) {
        self.locks.push(lock);
    }
}

impl Default for WdlockCtx<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WdlockCtx<'_> {
    fn drop(&mut self) {
        if !self.locks.is_empty() {
            debug!(ctx = %self.timestamp, held = self.locks.len(), "dropped while holding locks");
            self.release_all();
        }
    }
}
