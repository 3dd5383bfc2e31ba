use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Collection, Database, IndexModel, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoCandidateStatsDocument, MongoProfileDocument, MongoViewerStatsDocument, doc_id,
        record_guess_update, viewer_outcome_update,
    },
};
use crate::dao::{
    aggregate_store::AggregateStore,
    models::{
        CandidateStatsEntity, GuessLogEntity, ProfileEntity, ViewerOutcomeEntity,
        ViewerStatsEntity,
    },
    storage::StorageResult,
};

const CANDIDATE_STATS_COLLECTION: &str = "candidate_stats";
const VIEWER_STATS_COLLECTION: &str = "viewer_stats";
const PROFILES_COLLECTION: &str = "profiles";

/// [`AggregateStore`] backed by MongoDB.
#[derive(Clone)]
pub struct MongoAggregateStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoAggregateStore {
    /// Connect to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_, database) = establish_connection(&config.options, &config.database_name).await?;
        let store = Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "guesses.guesser_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("guesser_idx".to_owned()))
                    .build(),
            )
            .build();

        self.candidate_stats()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: CANDIDATE_STATS_COLLECTION,
                index: "guesses.guesser_id",
                source,
            })?;
        Ok(())
    }

    async fn candidate_stats(&self) -> Collection<MongoCandidateStatsDocument> {
        self.inner
            .database
            .read()
            .await
            .collection(CANDIDATE_STATS_COLLECTION)
    }

    async fn viewer_stats(&self) -> Collection<MongoViewerStatsDocument> {
        self.inner
            .database
            .read()
            .await
            .collection(VIEWER_STATS_COLLECTION)
    }

    async fn profiles(&self) -> Collection<MongoProfileDocument> {
        self.inner.database.read().await.collection(PROFILES_COLLECTION)
    }

    async fn record_guess(&self, candidate_id: String, entry: GuessLogEntity) -> MongoResult<()> {
        self.candidate_stats()
            .await
            .update_one(doc_id(&candidate_id), record_guess_update(&entry))
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::RecordGuess {
                candidate_id,
                source,
            })?;
        Ok(())
    }

    async fn find_candidate_stats(
        &self,
        candidate_id: String,
    ) -> MongoResult<Option<CandidateStatsEntity>> {
        let document = self
            .candidate_stats()
            .await
            .find_one(doc_id(&candidate_id))
            .await
            .map_err(|source| MongoDaoError::LoadCandidateStats {
                candidate_id,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn increment_viewer_stats(&self, outcome: ViewerOutcomeEntity) -> MongoResult<()> {
        self.viewer_stats()
            .await
            .update_one(doc_id(&outcome.viewer_id), viewer_outcome_update(&outcome))
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::IncrementViewerStats {
                viewer_id: outcome.viewer_id,
                source,
            })?;
        Ok(())
    }

    async fn find_viewer_stats(&self, viewer_id: String) -> MongoResult<Option<ViewerStatsEntity>> {
        let document = self
            .viewer_stats()
            .await
            .find_one(doc_id(&viewer_id))
            .await
            .map_err(|source| MongoDaoError::LoadViewerStats { viewer_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn list_profiles(&self) -> MongoResult<Vec<ProfileEntity>> {
        let documents: Vec<MongoProfileDocument> = self
            .profiles()
            .await
            .find(doc! {})
            .await
            .map_err(|source| MongoDaoError::ListProfiles { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListProfiles { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }
}

impl AggregateStore for MongoAggregateStore {
    fn record_guess(
        &self,
        candidate_id: String,
        entry: GuessLogEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .record_guess(candidate_id, entry)
                .await
                .map_err(Into::into)
        })
    }

    fn find_candidate_stats(
        &self,
        candidate_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<CandidateStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_candidate_stats(candidate_id)
                .await
                .map_err(Into::into)
        })
    }

    fn increment_viewer_stats(
        &self,
        outcome: ViewerOutcomeEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .increment_viewer_stats(outcome)
                .await
                .map_err(Into::into)
        })
    }

    fn find_viewer_stats(
        &self,
        viewer_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ViewerStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_viewer_stats(viewer_id).await.map_err(Into::into) })
    }

    fn list_profiles(&self) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_profiles().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
