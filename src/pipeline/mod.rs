//! Stream pipeline components.
//!
//! ```text
//! push → Ring Buffer → Pipeline (per-span conversion) → pull
//! ```
//!
//! - **Ring Buffer**: unbounded queue of chunks tagged with the spec and input
//!   map they were pushed with
//! - **Pipeline**: drains the queue one layout at a time and converts to the
//!   requested output format

mod converter;
mod ring_buffer;

pub(crate) use converter::{Pipeline, PullRequest};
pub(crate) use ring_buffer::QUEUED_BYTES_LIMIT;
