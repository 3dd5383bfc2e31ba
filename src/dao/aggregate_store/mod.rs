#[cfg(feature = "couch-store")]
pub mod couchdb;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{
    CandidateStatsEntity, GuessLogEntity, ProfileEntity, ViewerOutcomeEntity, ViewerStatsEntity,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the document store holding community aggregates, viewer totals
/// and guessable profiles.
///
/// `record_guess` and `increment_viewer_stats` must be atomic on the server side:
/// many viewers guess the same candidate concurrently, and a viewer's totals are
/// also written from other processes, so implementations increment in a single
/// document update instead of reading and writing back totals.
pub trait AggregateStore: Send + Sync {
    /// Add `entry.guess_value` to the candidate's total, bump its count and append
    /// `entry` to its log, creating the document if needed.
    fn record_guess(
        &self,
        candidate_id: String,
        entry: GuessLogEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Load the aggregate of a candidate.
    fn find_candidate_stats(
        &self,
        candidate_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<CandidateStatsEntity>>>;
    /// Count one more game worth `outcome.points` for the viewer, creating the
    /// document if needed.
    fn increment_viewer_stats(
        &self,
        outcome: ViewerOutcomeEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Load the totals of a viewer.
    fn find_viewer_stats(
        &self,
        viewer_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ViewerStatsEntity>>>;
    /// List every stored profile.
    fn list_profiles(&self) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>>;
    /// Cheap round-trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
