//! Foundational low-level utilities shared across drip crates.
//!
//! Provides atomic file-write helpers, time utilities used for fire-time and
//! expiry calculations, short content hashes for generated ids, and phone
//! number normalization used when matching inbound traffic to leads.

pub mod atomic_io;
pub mod ids;
pub mod phone;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use ids::{generate_id, short_hash};
pub use phone::normalize_phone;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, hours_to_ms};
