/// Persistence of community aggregates, viewer totals and profiles.
pub mod aggregate_store;
/// Backend-independent records.
pub mod models;
/// Storage error shared by every backend.
pub mod storage;
