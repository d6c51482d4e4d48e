//! Shared test utilities for broker testing
//!
//! This crate provides reusable test infrastructure for the messaging crates:
//! - `TestNats`: NATS container with automatic cleanup (feature: "nats")
//! - `TestSubjects`: Deterministic, per-test subject names (always available)
//!
//! # Features
//!
//! - `nats` (default): Enables NATS test infrastructure
//!
//! # Usage
//!
//! ```rust,ignore
//! use test_utils::{TestNats, TestSubjects};
//!
//! #[tokio::test]
//! #[ignore] // Requires Docker
//! async fn my_nats_test() {
//!     let nats = TestNats::new().await;
//!     let subjects = TestSubjects::from_test_name("my_nats_test");
//!
//!     let orders = subjects.subject("orders");
//!     let client = nats.client();
//! }
//! ```

#[cfg(feature = "nats")]
mod nats;

#[cfg(feature = "nats")]
pub use nats::{StreamExt, TestNats};

/// Builder for subject names that do not collide between tests
///
/// Tests sharing one server must not see each other's traffic. Subjects are
/// derived from a seed, so a test gets the same names on every run.
pub struct TestSubjects {
    seed: u64,
}

impl TestSubjects {
    /// Create a new builder with a seed
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestSubjects;
    ///
    /// let subjects = TestSubjects::from_test_name("test_queue_groups");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Subject scoped to this test
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestSubjects;
    ///
    /// let subjects = TestSubjects::new(7);
    /// assert_eq!(subjects.subject("orders"), "test.7.orders");
    /// ```
    pub fn subject(&self, name: &str) -> String {
        format!("test.{}.{}", self.seed, name)
    }

    /// Queue group name scoped to this test
    pub fn queue(&self, name: &str) -> String {
        format!("test-{}-{}", self.seed, name)
    }
}
