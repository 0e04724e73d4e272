//! Transfer module
//!
//! The money-transfer transaction engine and the policies it runs under.

mod engine;
mod lock_order;
mod retry;


pub use engine::TransferEngine;
pub use lock_order::LockOrder;
pub use retry::{RetryPolicy, DEFAULT_BASE_BACKOFF, DEFAULT_MAX_ATTEMPTS};
