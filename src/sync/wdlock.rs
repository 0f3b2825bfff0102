use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{LockError, Rejected, WdlockCtx};
use crate::order::Timestamp;

/// A lock acquired under the Wound-Wait rule.
///
/// The lock only records the timestamp of its owner, never a reference to
/// the owning [`WdlockCtx`]. The context keeps the list of locks it holds
/// and gives them all back in [`WdlockCtx::release_all`].
///
/// ```
/// use wdlock::{Wdlock, WdlockCtx};
///
/// let l = Wdlock::new();
/// let mut old = WdlockCtx::new();
/// let mut young = WdlockCtx::new();
///
/// assert!(l.lock(&mut young).is_ok());
/// // Older never waits for younger
/// assert!(l.lock(&mut old).is_err());
///
/// young.release_all();
/// assert!(l.lock(&mut old).is_ok());
/// ```
#[derive(Debug, Default)]
pub struct Wdlock {
    owner: Mutex<Option<Timestamp>>,
    cv: Condvar,
}

enum Step {
    Acquired,
    Blocked(Timestamp),
}

impl Wdlock {
    pub fn new() -> Self {
        Self {
            owner: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    /// Acquires the lock for `ctx`, blocking while an older context owns it.
    ///
    /// Returns [`Rejected`] if a younger context owns it. The caller must
    /// then call [`WdlockCtx::release_all`] before retrying.
    pub fn lock<'a>(&'a self, ctx: &mut WdlockCtx<'a>) -> Result<(), Rejected> {
        let mut owner = self.owner.lock();
        loop {
            match self.step(&mut owner, ctx)? {
                Step::Acquired => return Ok(()),
                Step::Blocked(current) => {
                    debug!(
                        lock = ?self.addr(),
                        ctx = %ctx.timestamp(),
                        owner = %current,
                        "waiting"
                    );
                    // The lock can pass straight to a third context, wait for any change of owner
                    while *owner == Some(current) {
                        self.cv.wait(&mut owner);
                    }
                }
            }
        }
    }

    /// Like [`lock`](Self::lock), but never blocks.
    pub fn try_lock<'a>(&'a self, ctx: &mut WdlockCtx<'a>) -> Result<(), LockError> {
        let mut owner = self.owner.lock();
        match self.step(&mut owner, ctx)? {
            Step::Acquired => Ok(()),
            Step::Blocked(owner) => Err(LockError::WouldBlock {
                requester: ctx.timestamp(),
                owner,
            }),
        }
    }

    /// Like [`lock`](Self::lock), but gives up waiting once `timeout` has elapsed.
    pub fn lock_timeout<'a>(
        &'a self,
        ctx: &mut WdlockCtx<'a>,
        timeout: Duration,
    ) -> Result<(), LockError> {
        // None when the deadline is past what Instant can hold, e.g. Duration::MAX
        let deadline = Instant::now().checked_add(timeout);
        let mut owner = self.owner.lock();
        loop {
            match self.step(&mut owner, ctx)? {
                Step::Acquired => return Ok(()),
                Step::Blocked(current) => {
                    debug!(
                        lock = ?self.addr(),
                        ctx = %ctx.timestamp(),
                        owner = %current,
                        ?timeout,
                        "waiting"
                    );
                    while *owner == Some(current) {
                        let Some(deadline) = deadline else {
                            self.cv.wait(&mut owner);
                            continue;
                        };
                        if self.cv.wait_until(&mut owner, deadline).timed_out()
                            && *owner == Some(current)
                        {
                            debug!(
                                lock = ?self.addr(),
                                ctx = %ctx.timestamp(),
                                owner = %current,
                                "timed out"
                            );
                            return Err(LockError::TimedOut {
                                requester: ctx.timestamp(),
                                owner: current,
                            });
                        }
                    }
                }
            }
        }
    }

    pub fn owner(&self) -> Option<Timestamp> {
        *self.owner.lock()
    }

    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    // Must be called with the internal mutex held
    fn step<'a>(
        &'a self,
        owner: &mut Option<Timestamp>,
        ctx: &mut WdlockCtx<'a>,
    ) -> Result<Step, Rejected> {
        let me = ctx.timestamp();
        match *owner {
            None => {
                *owner = Some(me);
                ctx.push(self);
                self.cv.notify_all();
                trace!(lock = ?self.addr(), ctx = %me, "acquired");
                Ok(Step::Acquired)
            }
            Some(current) if current == me => {
                debug_assert!(ctx.holds(self));
                Ok(Step::Acquired)
            }
            Some(current) if me.is_older_than(current) => {
                self.cv.notify_one();
                debug!(lock = ?self.addr(), ctx = %me, owner = %current, "rejected");
                Err(Rejected {
                    requester: me,
                    owner: current,
                })
            }
            Some(current) => Ok(Step::Blocked(current)),
        }
    }

    // Panics unless `me` is the recorded owner
    pub(super) fn release(&self, me: Timestamp) {
        let mut owner = self.owner.lock();
        assert_eq!(
            *owner,
            Some(me),
            "{me} released a lock it does not own (owner: {:?})",
            *owner
        );
        *owner = None;
        // Every waiter has to re-evaluate against whoever wins next
        self.cv.notify_all();
        trace!(lock = ?self.addr(), ctx = %me, "released");
    }

    fn addr(&self) -> *const Self {
        self
    }
}
