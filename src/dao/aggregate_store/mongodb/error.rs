use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures raised by the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to record guess for candidate `{candidate_id}`")]
    RecordGuess {
        candidate_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load stats of candidate `{candidate_id}`")]
    LoadCandidateStats {
        candidate_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update stats of viewer `{viewer_id}`")]
    IncrementViewerStats {
        viewer_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load stats of viewer `{viewer_id}`")]
    LoadViewerStats {
        viewer_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list profiles")]
    ListProfiles {
        #[source]
        source: MongoError,
    },
}
