//! Concurrency control: page-level two-phase locking.

pub mod lock;

pub use lock::{LockManager, LockMode};
