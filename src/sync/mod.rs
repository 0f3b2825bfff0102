//! Wound-Wait deadlock avoidance.
//!
//! Every [`WdlockCtx`] carries a unique [`Timestamp`](crate::order::Timestamp).
//! When a context asks for a [`Wdlock`] that another context owns:
//! 1. Younger requester - waits until the owner changes, then decides again.
//! 2. Older requester - is [`Rejected`] at once and must release everything it holds.
//!
//! A context therefore only ever waits for an older one, so the wait-for
//! graph can never contain a cycle, whatever order locks are requested in.

mod error;
pub mod wdlock;
pub mod wdlock_ctx;

pub use error::{LockError, Rejected};
pub use wdlock::Wdlock;
pub use wdlock_ctx::{Committed, WdlockCtx};

#[cfg(test)]
pub(crate) mod test_util {
    /// Must be held for the duration of a test for its traces to reach the test writer.
    #[must_use]
    pub struct TestGuard {
        _guard: tracing::subscriber::DefaultGuard,
    }

    pub(crate) fn trace_init() -> TestGuard {
        use tracing_subscriber::{
            filter::{EnvFilter, LevelFilter},
            util::SubscriberInitExt,
        };

        let env = std::env::var("RUST_LOG").unwrap_or_default();
        let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
        let filter = if env.is_empty() {
            builder.parse("wdlock=debug").unwrap()
        } else {
            builder.parse_lossy(env)
        };
        let collector = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .finish();

        TestGuard {
            _guard: collector.set_default(),
        }
    }

    pub(crate) fn assert_send_sync<T: Send + Sync>() {}

    pub(crate) fn assert_send<T: Send>() {}
}
