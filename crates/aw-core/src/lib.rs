//! Core domain logic for the activity store.
//!
//! This crate contains the fundamental types and logic for:
//! - Events: timestamped, duration-bearing records with a free-form payload
//! - Buckets: metadata describing a per-client collection of events
//! - Heartbeats: coalescing repeated pings into a single growing event

pub mod bucket;
pub mod event;
pub mod heartbeat;
pub mod types;

pub use bucket::BucketMetadata;
pub use event::Event;
pub use heartbeat::{Pulsetime, heartbeat_merge};
pub use types::{BucketId, ValidationError};
