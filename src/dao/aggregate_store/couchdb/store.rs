use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value};
use tracing::debug;

use crate::dao::{
    aggregate_store::AggregateStore,
    models::{
        CandidateStatsEntity, GuessLogEntity, ProfileEntity, ViewerOutcomeEntity,
        ViewerStatsEntity,
    },
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchCandidateStatsDocument, CouchDesignDocument, CouchProfileDocument,
        CouchViewerStatsDocument, DESIGN_DOC_ID, END_SUFFIX, PROFILE_PREFIX, RECORD_GUESS_HANDLER,
        VIEWER_OUTCOME_HANDLER, candidate_stats_doc_id, viewer_stats_doc_id,
    },
};

const MAX_CONFLICT_RETRIES: u32 = 5;
const CONFLICT_BACKOFF: Duration = Duration::from_millis(50);

/// [`AggregateStore`] backed by CouchDB over its HTTP API.
#[derive(Clone)]
pub struct CouchAggregateStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchAggregateStore {
    /// Connect to CouchDB, creating the database and design document when missing.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            database: Arc::from(config.database),
            auth: config
                .username
                .zip(config.password)
                .map(|(user, pass)| (Arc::from(user), Arc::from(pass))),
        };

        store.ensure_database().await?;
        store.ensure_design_document().await?;
        Ok(store)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorized(self.client.request(method, url))
    }

    async fn send(&self, builder: reqwest::RequestBuilder, path: &str) -> CouchResult<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: path.to_owned(),
                source,
            })
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let url = self.database_url();
        let response = self
            .send(self.authorized(self.client.get(&url)), &url)
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .send(self.authorized(self.client.put(&url)), &url)
                    .await?;
                // 412 means another instance created it first.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::RequestStatus {
                        path: url,
                        status: create.status(),
                    })
                }
            }
            status => Err(CouchDaoError::RequestStatus { path: url, status }),
        }
    }

    /// Create the design document, or upgrade one missing a handler.
    async fn ensure_design_document(&self) -> CouchResult<()> {
        let design = match self.get_document::<Value>(DESIGN_DOC_ID).await? {
            None => CouchDesignDocument::default(),
            Some(existing) => match CouchDesignDocument::replacing(&existing) {
                Some(design) => design,
                None => return Ok(()),
            },
        };

        debug!("installing CouchDB update handlers");
        match self.put_document(DESIGN_DOC_ID, &design).await {
            // Another instance installed it first.
            Err(CouchDaoError::RequestStatus {
                status: StatusCode::CONFLICT,
                ..
            }) => Ok(()),
            other => other,
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.send(self.request(Method::GET, doc_id), doc_id).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_owned(),
                        source,
                    }
                })
            }
            status => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_owned(),
                status,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .send(self.request(Method::PUT, doc_id).json(document), doc_id)
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_owned(),
                status: response.status(),
            })
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_owned()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];

        let response = self
            .send(self.request(Method::GET, ALL_DOCS).query(&query), ALL_DOCS)
            .await?;
        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_owned(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_owned(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_owned(),
                    source,
                })
            })
            .collect()
    }

    /// Run an update handler against `doc_id`, retrying when the document changed
    /// underneath it.
    async fn apply_update<T>(&self, handler: &str, doc_id: &str, body: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let path = format!("{handler}/{doc_id}");
        let mut attempts = 0;
        loop {
            attempts += 1;
            let response = self
                .send(self.request(Method::POST, &path).json(body), &path)
                .await?;
            match response.status() {
                status if status.is_success() => return Ok(()),
                StatusCode::CONFLICT if attempts < MAX_CONFLICT_RETRIES => {
                    debug!(doc_id, attempts, "update conflicted, retrying");
                    tokio::time::sleep(CONFLICT_BACKOFF * attempts).await;
                }
                StatusCode::CONFLICT => return Err(CouchDaoError::Conflict { path, attempts }),
                status => return Err(CouchDaoError::RequestStatus { path, status }),
            }
        }
    }
}

impl AggregateStore for CouchAggregateStore {
    fn record_guess(
        &self,
        candidate_id: String,
        entry: GuessLogEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .apply_update(
                    RECORD_GUESS_HANDLER,
                    &candidate_stats_doc_id(&candidate_id),
                    &entry,
                )
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
            let doc = store
                .get_document::<CouchCandidateStatsDocument>(&candidate_stats_doc_id(&candidate_id))
                .await?;
            Ok(doc.map(CouchCandidateStatsDocument::into_entity))
        })
    }

    fn increment_viewer_stats(
        &self,
        outcome: ViewerOutcomeEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .apply_update(
                    VIEWER_OUTCOME_HANDLER,
                    &viewer_stats_doc_id(&outcome.viewer_id),
                    &outcome,
                )
                .await
                .map_err(Into::into)
        })
    }

    fn find_viewer_stats(
        &self,
        viewer_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ViewerStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchViewerStatsDocument>(&viewer_stats_doc_id(&viewer_id))
                .await?;
            Ok(doc.map(CouchViewerStatsDocument::into_entity))
        })
    }

    fn list_profiles(&self) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchProfileDocument>(PROFILE_PREFIX)
                .await?;
            Ok(docs
                .into_iter()
                .map(CouchProfileDocument::into_entity)
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .send(store.authorized(store.client.get(&url)), &url)
                .await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_database().await?;
            store.ensure_design_document().await.map_err(Into::into)
        })
    }
}
