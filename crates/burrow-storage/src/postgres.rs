use crate::allocator::IdAllocator;
use crate::delete_worker::{DeleteQueue, DeleteSink, DeleteWorker, DeleteWorkerSettings};
use async_trait::async_trait;
use burrow_core::{
    validate_urls, Created, LinkId, LinkRecord, Result, Statistic, Storage, StorageError,
};
use parking_lot::Mutex;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

const SCHEMA: &str = include_str!("../ddl/postgres/links.sql");

/// Ids whose deletion is queued but not yet committed.
type PendingDeletes = Arc<Mutex<HashSet<LinkId>>>;

#[derive(Debug, Clone, TypedBuilder)]
pub struct PostgresSettings {
    /// Upper bound for every database round-trip.
    #[builder(default = Duration::from_secs(1))]
    pub query_timeout: Duration,
    /// Hand deletes to a background worker instead of committing them inline.
    #[builder(default = true)]
    pub deferred_deletes: bool,
    #[builder(default)]
    pub worker: DeleteWorkerSettings,
    #[builder(default = 10)]
    pub max_connections: u32,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug)]
enum Deletes {
    Immediate,
    Deferred {
        queue: DeleteQueue,
        pending: PendingDeletes,
        worker: Mutex<Option<DeleteWorker>>,
    },
}

/// PostgreSQL implementation of [`Storage`].
///
/// Links live in a single `links` table. Soft delete is implemented with the
/// `deleted` column; rows are never removed. Ids come from an in-process
/// counter seeded with `COUNT(*)` at startup, so the table must not be
/// shared with rows deleted by other writers. Creates are serialized through
/// that counter and the counter only advances once a transaction commits.
#[derive(Debug)]
pub struct PostgresStorage {
    pool: PgPool,
    allocator: tokio::sync::Mutex<IdAllocator>,
    query_timeout: Duration,
    deletes: Deletes,
}

impl PostgresStorage {
    /// Opens a connection pool, creates the schema if needed and seeds the
    /// id counter.
    pub async fn connect(database_url: &str, settings: PostgresSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.query_timeout)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        Self::new(pool, settings).await
    }

    /// Builds the storage on top of an existing pool.
    ///
    /// When deferred deletes are enabled this spawns the delete worker, so it
    /// must be called from within a tokio runtime.
    pub async fn new(pool: PgPool, settings: PostgresSettings) -> Result<Self> {
        let query_timeout = settings.query_timeout;

        with_timeout(query_timeout, "create schema", async {
            sqlx::raw_sql(SCHEMA)
                .execute(&pool)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;

        let count: i64 = with_timeout(query_timeout, "count links", async {
            sqlx::query_scalar("SELECT COUNT(*) FROM links")
                .fetch_one(&pool)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;
        let existing = u64::try_from(count)
            .map_err(|_| StorageError::InvalidData(format!("negative link count {count}")))?;

        let deletes = if settings.deferred_deletes {
            let pending = PendingDeletes::default();
            let sink = PgDeleteSink {
                pool: pool.clone(),
                pending: Arc::clone(&pending),
                query_timeout,
            };
            let (queue, worker) = DeleteWorker::spawn(sink, settings.worker.clone());
            Deletes::Deferred {
                queue,
                pending,
                worker: Mutex::new(Some(worker)),
            }
        } else {
            Deletes::Immediate
        };

        info!(
            links = existing,
            deferred_deletes = settings.deferred_deletes,
            "opened postgres storage"
        );

        Ok(Self {
            pool,
            allocator: tokio::sync::Mutex::new(IdAllocator::resume_from(existing)),
            query_timeout,
            deletes,
        })
    }

    /// Applies every queued delete and stops the delete worker.
    ///
    /// Deletes issued afterwards fail with `Unavailable`. A no-op when
    /// deletes are immediate.
    pub async fn close(&self) {
        if let Deletes::Deferred { worker, .. } = &self.deletes {
            let worker = worker.lock().take();
            if let Some(worker) = worker {
                worker.shutdown().await;
            }
        }
    }

    fn is_pending_delete(&self, id: LinkId) -> bool {
        match &self.deletes {
            Deletes::Deferred { pending, .. } => pending.lock().contains(&id),
            Deletes::Immediate => false,
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        with_timeout(self.query_timeout, operation, fut).await
    }

    /// Inserts the batch in one transaction, allocating from `staged`.
    ///
    /// Returns the advanced allocator; the caller publishes it only when this
    /// succeeds.
    async fn insert_batch(
        &self,
        owner: &str,
        urls: &[String],
        mut staged: IdAllocator,
    ) -> Result<(Created, IdAllocator)> {
        let mut created = Created {
            ids: Vec::with_capacity(urls.len()),
            conflict: false,
        };

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for url in urls {
            // Rows inserted earlier in this transaction are visible here, so a
            // URL repeated within the batch resolves to its first id.
            let existing: Option<i64> =
                sqlx::query_scalar("SELECT id FROM links WHERE url = $1 LIMIT 1")
                    .bind(url)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;

            let id = match existing {
                Some(raw) => {
                    created.conflict = true;
                    from_db_id(raw)?
                }
                None => {
                    let id = staged.allocate()?;
                    let result = sqlx::query(
                        "INSERT INTO links (id, url, owner, deleted) VALUES ($1, $2, $3, FALSE)",
                    )
                    .bind(to_db_id(id)?)
                    .bind(url)
                    .bind(owner)
                    .execute(&mut *tx)
                    .await;

                    match result {
                        Ok(_) => id,
                        Err(err) if is_unique_violation(&err) => {
                            return Err(StorageError::Conflict(url.clone()))
                        }
                        Err(err) => return Err(map_sqlx_error(err)),
                    }
                }
            };

            created.ids.push(id);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok((created, staged))
    }

    async fn delete_now(&self, owner: &str, ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for &id in ids {
            sqlx::query("UPDATE links SET deleted = TRUE WHERE id = $1 AND owner = $2")
                .bind(id)
                .bind(owner)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn owned_live_ids(&self, owner: &str, ids: &[i64]) -> Result<Vec<i64>> {
        sqlx::query_scalar(
            "SELECT id FROM links WHERE owner = $1 AND id = ANY($2) AND deleted = FALSE",
        )
        .bind(owner)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn create_short(&self, owner: &str, urls: &[String]) -> Result<Created> {
        validate_urls(urls)?;

        if urls.is_empty() {
            return Ok(Created::default());
        }

        // Waiting for the counter is not a database call and is not timed.
        let mut allocator = self.allocator.lock().await;
        let (created, staged) = self
            .bounded("create links", self.insert_batch(owner, urls, allocator.clone()))
            .await?;
        *allocator = staged;
        drop(allocator);

        debug!(
            owner = %owner,
            count = created.ids.len(),
            conflict = created.conflict,
            "stored links in postgres"
        );
        Ok(created)
    }

    async fn get_long(&self, id: LinkId) -> Result<String> {
        let Ok(db_id) = to_db_id(id) else {
            return Err(StorageError::NotFound(id.to_string()));
        };

        // The delete sink commits before clearing the flag, so checking it
        // ahead of the read never misses a delete in flight.
        if self.is_pending_delete(id) {
            return Err(StorageError::Gone(id.to_string()));
        }

        let row: Option<(String, bool)> = self
            .bounded("get link", async {
                sqlx::query_as("SELECT url, deleted FROM links WHERE id = $1 LIMIT 1")
                    .bind(db_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        match row {
            None => Err(StorageError::NotFound(id.to_string())),
            Some((_, true)) => Err(StorageError::Gone(id.to_string())),
            Some((url, false)) => Ok(url),
        }
    }

    async fn delete(&self, owner: &str, ids: &[LinkId]) -> Result<()> {
        // Ids beyond the BIGINT range were never assigned.
        let db_ids: Vec<i64> = ids.iter().filter_map(|&id| to_db_id(id).ok()).collect();
        if db_ids.is_empty() {
            return Ok(());
        }

        match &self.deletes {
            Deletes::Immediate => {
                self.bounded("delete links", self.delete_now(owner, &db_ids))
                    .await?;
                debug!(owner = %owner, requested = ids.len(), "deleted links in postgres");
            }
            Deletes::Deferred { queue, pending, .. } => {
                let owned = self
                    .bounded("select owned links", self.owned_live_ids(owner, &db_ids))
                    .await?;

                for raw in owned {
                    let id = from_db_id(raw)?;
                    let newly_pending = pending.lock().insert(id);
                    if let Err(e) = queue.enqueue(id).await {
                        if newly_pending {
                            pending.lock().remove(&id);
                        }
                        return Err(e);
                    }
                }
                debug!(owner = %owner, requested = ids.len(), "queued link deletes");
            }
        }

        Ok(())
    }

    async fn history(&self, owner: &str) -> Result<Vec<LinkRecord>> {
        let rows: Vec<(i64, String)> = self
            .bounded("list history", async {
                sqlx::query_as("SELECT id, url FROM links WHERE owner = $1 ORDER BY id")
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        rows.into_iter()
            .map(|(id, original_url)| {
                Ok(LinkRecord {
                    id: from_db_id(id)?,
                    original_url,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error)
        })
        .await
    }

    async fn statistic(&self) -> Result<Statistic> {
        let (urls, users): (i64, i64) = self
            .bounded("statistic", async {
                sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT owner) FROM links")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            })
            .await?;

        Ok(Statistic {
            urls: urls.max(0) as u64,
            users: users.max(0) as u64,
        })
    }
}

/// Commits queued deletes for the worker.
struct PgDeleteSink {
    pool: PgPool,
    pending: PendingDeletes,
    query_timeout: Duration,
}

impl PgDeleteSink {
    async fn update(&self, ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for &id in ids {
            sqlx::query("UPDATE links SET deleted = TRUE WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl DeleteSink for PgDeleteSink {
    async fn apply(&self, batch: &[LinkId]) -> Result<()> {
        let ids: Vec<i64> = batch.iter().filter_map(|&id| to_db_id(id).ok()).collect();

        with_timeout(self.query_timeout, "apply deletes", self.update(&ids)).await?;

        // Failed batches keep their pending flags so reads still report Gone.
        let mut pending = self.pending.lock();
        for id in batch {
            pending.remove(id);
        }
        Ok(())
    }
}

async fn with_timeout<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "postgres call timed out");
            Err(StorageError::Timeout(format!(
                "{operation} exceeded {}ms",
                limit.as_millis()
            )))
        }
    }
}

fn to_db_id(id: LinkId) -> Result<i64> {
    i64::try_from(id.get()).map_err(|_| StorageError::NotFound(id.to_string()))
}

fn from_db_id(raw: i64) -> Result<LinkId> {
    u64::try_from(raw)
        .ok()
        .and_then(LinkId::new)
        .ok_or_else(|| StorageError::InvalidData(format!("invalid link id in database: {raw}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}
