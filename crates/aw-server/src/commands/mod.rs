//! CLI subcommand implementations.

pub mod buckets;
pub mod events;
pub mod export;
pub mod heartbeat;
pub mod import;
pub mod info;
pub mod sync;
pub mod util;
