pub mod order;
pub mod sync;

pub use order::Timestamp;
pub use sync::{Committed, LockError, Rejected, Wdlock, WdlockCtx};
