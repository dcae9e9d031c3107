//! Session manager tests.
//!
//! - `harness.rs`     - Fake identity provider, profile sync, failing storage
//! - `lifecycle.rs`   - I. Restore, Sign-in, Sign-out (Rules 1-11)
//! - `concurrency.rs` - II. Coalescing and Logout Precedence (Rules 12-17, 41)
//! - `ordering.rs`    - III. Notification Ordering and Consistency (Rules 18-22)
//! - `failures.rs`    - IV. Failure Handling (Rules 23-40)

mod concurrency;
pub(crate) mod harness;
