use crate::delete_worker::DeleteWorkerSettings;
use crate::file::FileStorage;
use crate::memory::InMemoryStorage;
use crate::postgres::{PostgresSettings, PostgresStorage};
use async_trait::async_trait;
use burrow_core::{Created, LinkId, LinkRecord, Result, Statistic, Storage};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use typed_builder::TypedBuilder;

/// How the database backend applies deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Commit before the call returns.
    Immediate,
    /// Queue for the background delete worker.
    #[default]
    Deferred,
}

/// Storage selection and tuning.
///
/// A database DSN takes precedence over a file path; with neither, links are
/// kept in memory.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StorageConfig {
    #[builder(default, setter(strip_option, into))]
    pub database_dsn: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub file_path: Option<PathBuf>,
    #[builder(default)]
    pub delete_mode: DeleteMode,
    #[builder(default = Duration::from_secs(1))]
    pub query_timeout: Duration,
    #[builder(default = 1024)]
    pub delete_queue_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl StorageConfig {
    fn postgres_settings(&self) -> PostgresSettings {
        PostgresSettings::builder()
            .query_timeout(self.query_timeout)
            .deferred_deletes(self.delete_mode == DeleteMode::Deferred)
            .worker(
                DeleteWorkerSettings::builder()
                    .queue_capacity(self.delete_queue_capacity)
                    .build(),
            )
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    File,
    Postgres,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::File => write!(f, "file"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// The storage chosen at startup.
#[derive(Debug)]
pub enum Backend {
    Memory(InMemoryStorage),
    File(FileStorage),
    Postgres(PostgresStorage),
}

impl Backend {
    /// Opens the backend selected by `config`.
    ///
    /// A configured database or file that cannot be opened is logged and
    /// replaced by the in-memory backend, so startup never fails here.
    pub async fn open(config: &StorageConfig) -> Self {
        if let Some(dsn) = &config.database_dsn {
            match PostgresStorage::connect(dsn, config.postgres_settings()).await {
                Ok(storage) => return Self::Postgres(storage),
                Err(e) => error!(
                    error = %e,
                    "failed to open postgres storage, falling back to memory"
                ),
            }
        } else if let Some(path) = &config.file_path {
            match FileStorage::open(path).await {
                Ok(storage) => return Self::File(storage),
                Err(e) => error!(
                    path = %path.display(),
                    error = %e,
                    "failed to open file storage, falling back to memory"
                ),
            }
        }

        info!("using in-memory storage");
        Self::Memory(InMemoryStorage::new())
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Memory(_) => BackendKind::Memory,
            Backend::File(_) => BackendKind::File,
            Backend::Postgres(_) => BackendKind::Postgres,
        }
    }

    /// Flushes pending background work before shutdown.
    pub async fn close(&self) {
        if let Backend::Postgres(storage) = self {
            storage.close().await;
        }
    }
}

#[async_trait]
impl Storage for Backend {
    async fn create_short(&self, owner: &str, urls: &[String]) -> Result<Created> {
        match self {
            Backend::Memory(s) => s.create_short(owner, urls).await,
            Backend::File(s) => s.create_short(owner, urls).await,
            Backend::Postgres(s) => s.create_short(owner, urls).await,
        }
    }

    async fn get_long(&self, id: LinkId) -> Result<String> {
        match self {
            Backend::Memory(s) => s.get_long(id).await,
            Backend::File(s) => s.get_long(id).await,
            Backend::Postgres(s) => s.get_long(id).await,
        }
    }

    async fn delete(&self, owner: &str, ids: &[LinkId]) -> Result<()> {
        match self {
            Backend::Memory(s) => s.delete(owner, ids).await,
            Backend::File(s) => s.delete(owner, ids).await,
            Backend::Postgres(s) => s.delete(owner, ids).await,
        }
    }

    async fn history(&self, owner: &str) -> Result<Vec<LinkRecord>> {
        match self {
            Backend::Memory(s) => s.history(owner).await,
            Backend::File(s) => s.history(owner).await,
            Backend::Postgres(s) => s.history(owner).await,
        }
    }

    async fn ping(&self) -> Result<()> {
        match self {
            Backend::Memory(s) => s.ping().await,
            Backend::File(s) => s.ping().await,
            Backend::Postgres(s) => s.ping().await,
        }
    }

    async fn statistic(&self) -> Result<Statistic> {
        match self {
            Backend::Memory(s) => s.statistic().await,
            Backend::File(s) => s.statistic().await,
            Backend::Postgres(s) => s.statistic().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn defaults_to_memory() {
        let backend = Backend::open(&StorageConfig::default()).await;

        assert_eq!(backend.kind(), BackendKind::Memory);
    }

    #[tokio::test]
    async fn file_path_selects_file_backend() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::builder()
            .file_path(dir.path().join("links.txt"))
            .build();

        let backend = Backend::open(&config).await;

        assert_eq!(backend.kind(), BackendKind::File);
    }

    #[tokio::test]
    async fn unopenable_file_falls_back_to_memory() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let config = StorageConfig::builder().file_path(dir.path()).build();

        let backend = Backend::open(&config).await;

        assert_eq!(backend.kind(), BackendKind::Memory);
    }

    #[tokio::test]
    async fn unreachable_database_falls_back_to_memory_even_with_file() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::builder()
            .database_dsn("postgres://burrow@127.0.0.1:1/burrow")
            .file_path(dir.path().join("links.txt"))
            .query_timeout(Duration::from_millis(200))
            .build();

        let backend = Backend::open(&config).await;

        assert_eq!(backend.kind(), BackendKind::Memory);
        backend.close().await;
    }

    #[test]
    fn kind_display() {
        assert_eq!(BackendKind::Postgres.to_string(), "postgres");
        assert_eq!(BackendKind::File.to_string(), "file");
    }
}
