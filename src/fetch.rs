use std::collections::HashMap;
use std::future::Future;

use futures::future::try_join_all;
use log::{debug, warn};
use rocket::tokio::task;

use crate::db::{self, DateWindow, DbPool, StoreError};
use crate::models::{Record, ResourceKind};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request for {kind} failed: {source}")]
    Http {
        kind: ResourceKind,
        #[source]
        source: reqwest::Error,
    },
    #[error("entity API answered {status} for {kind}")]
    Status { kind: ResourceKind, status: u16 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("fetch task failed: {0}")]
    Join(String),
}

/// Source of full resource collections for report generation.
pub trait EntityStore {
    fn fetch(
        &self,
        kind: ResourceKind,
    ) -> impl Future<Output = Result<Vec<Record>, FetchError>> + Send;
}

/// Reads collections straight from the local connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EntityStore for SqliteStore {
    async fn fetch(&self, kind: ResourceKind) -> Result<Vec<Record>, FetchError> {
        let pool = self.pool.clone();
        let rows = task::spawn_blocking(move || -> Result<Vec<Record>, StoreError> {
            let conn = pool.get()?;
            Ok(db::list_records(&conn, kind, &DateWindow::default())?)
        })
        .await
        .map_err(|err| FetchError::Join(err.to_string()))??;
        Ok(rows)
    }
}

/// Reads collections from a remote deployment's REST API.
#[derive(Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl EntityStore for HttpStore {
    async fn fetch(&self, kind: ResourceKind) -> Result<Vec<Record>, FetchError> {
        let url = format!("{}{}", self.base_url, kind.api_path());
        debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Http { kind, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                kind,
                status: status.as_u16(),
            });
        }
        response
            .json::<Vec<Record>>()
            .await
            .map_err(|source| FetchError::Http { kind, source })
    }
}

/// The store reports read from, chosen once at ignition.
#[derive(Clone)]
pub enum ResourceStore {
    Local(SqliteStore),
    Remote(HttpStore),
}

impl EntityStore for ResourceStore {
    async fn fetch(&self, kind: ResourceKind) -> Result<Vec<Record>, FetchError> {
        match self {
            ResourceStore::Local(store) => store.fetch(kind).await,
            ResourceStore::Remote(store) => store.fetch(kind).await,
        }
    }
}

/// Fetches every listed collection concurrently. The first failure aborts the whole set.
pub async fn fetch_all<S: EntityStore>(
    store: &S,
    kinds: &[ResourceKind],
) -> Result<HashMap<ResourceKind, Vec<Record>>, FetchError> {
    let collections = try_join_all(kinds.iter().map(|kind| async move {
        store.fetch(*kind).await.map(|rows| (*kind, rows))
    }))
    .await
    .inspect_err(|err| warn!("collection fetch aborted: {err}"))?;
    Ok(collections.into_iter().collect())
}
