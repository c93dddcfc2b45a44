//! Cooperative cancellation.
//!
//! A single [`CancellationToken`] is shared (behind an `Arc`) by the scheduler
//! loops, the retry policy and pipeline code. It is observed at loop entry,
//! during backoff waits, during inter-run sleeps and inside long-running I/O.

mod token;

pub use token::CancellationToken;
