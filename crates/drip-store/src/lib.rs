//! Storage seams for the drip engine, plus in-memory implementations.
//!
//! Traits model the externally shared services a horizontally scaled
//! deployment needs: an optimistically claimed run store, an append-only
//! message log with monotonic status transitions, and an atomic
//! increment-with-expiry counter store for rate limiting. The in-memory
//! variants are the single-process realization used by tests and the local
//! runner; they hold the same contracts a durable backend must honor.

pub mod catalog;
pub mod message_store;
pub mod rate_store;
pub mod run_store;

pub use catalog::{
    InMemoryLeadDirectory, LeadDirectory, SequenceCatalog, TemplateCatalog, TenantCatalog,
};
pub use message_store::{
    InMemoryMessageLogStore, MessageLogError, MessageLogStore, StatusAdvanceOutcome,
};
pub use rate_store::{InMemoryRateCounterStore, RateCounterStore};
pub use run_store::{InMemoryRunStore, RunStore, RunStoreError};
