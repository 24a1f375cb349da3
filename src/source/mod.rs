//! Synthetic audio sources.
//!
//! Real capture devices are out of scope for this crate; [`MockSource`]
//! stands in for one in tests and demos.

mod mock;

pub use mock::MockSource;
