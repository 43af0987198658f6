use crate::allocator::IdAllocator;
use async_trait::async_trait;
use burrow_core::{
    validate_urls, Created, LinkId, LinkRecord, Result, Statistic, Storage, StorageError,
};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug)]
struct FileState {
    file: File,
    allocator: IdAllocator,
}

/// Append-only file implementation of [`Storage`].
///
/// Each line holds one long URL and its id is the 1-based line number.
/// No owner or deleted flag is persisted, which gives this backend a few
/// documented limitations:
///
/// - every create appends, so the same URL may get several ids and
///   [`Created::conflict`] is never set;
/// - `delete` is a no-op;
/// - `history` lists every line regardless of owner.
///
/// Lookups scan the file from the start. URLs containing a newline are not
/// supported.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileStorage {
    /// Opens (or creates) the storage file and resumes ids after its last line.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        let existing = read_lines(&mut file).await?.len() as u64;
        info!(path = %path.display(), links = existing, "opened file storage");

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                file,
                allocator: IdAllocator::resume_from(existing),
            }),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_lines(file: &mut File) -> Result<Vec<String>> {
    file.seek(SeekFrom::Start(0)).await?;

    let mut lines = BufReader::new(file).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await? {
        out.push(line);
    }
    Ok(out)
}

#[async_trait]
impl Storage for FileStorage {
    async fn create_short(&self, owner: &str, urls: &[String]) -> Result<Created> {
        validate_urls(urls)?;

        if urls.is_empty() {
            return Ok(Created::default());
        }

        let mut state = self.state.lock().await;

        let mut staged = state.allocator.clone();
        let ids = urls
            .iter()
            .map(|_| staged.allocate())
            .collect::<Result<Vec<_>>>()?;

        let mut buffer = String::new();
        for url in urls {
            buffer.push_str(url);
            buffer.push('\n');
        }

        state.file.write_all(buffer.as_bytes()).await?;
        state.file.flush().await?;
        state.allocator = staged;

        debug!(owner = %owner, count = urls.len(), "appended links to file");
        Ok(Created {
            ids,
            conflict: false,
        })
    }

    async fn get_long(&self, id: LinkId) -> Result<String> {
        let mut state = self.state.lock().await;

        if id.get() > state.allocator.last() {
            return Err(StorageError::NotFound(id.to_string()));
        }

        state.file.seek(SeekFrom::Start(0)).await?;
        let mut lines = BufReader::new(&mut state.file).lines();
        let mut line_number = 0u64;
        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line_number == id.get() {
                return Ok(line);
            }
        }

        Err(StorageError::NotFound(id.to_string()))
    }

    async fn delete(&self, owner: &str, ids: &[LinkId]) -> Result<()> {
        debug!(owner = %owner, requested = ids.len(), "file storage does not support delete");
        Ok(())
    }

    async fn history(&self, _owner: &str) -> Result<Vec<LinkRecord>> {
        let mut state = self.state.lock().await;

        let lines = read_lines(&mut state.file).await?;
        let mut allocator = IdAllocator::new();

        lines
            .into_iter()
            .map(|original_url| {
                Ok(LinkRecord {
                    id: allocator.allocate()?,
                    original_url,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn statistic(&self) -> Result<Statistic> {
        let state = self.state.lock().await;

        Ok(Statistic {
            urls: state.allocator.last(),
            users: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn urls(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn id(value: u64) -> LinkId {
        LinkId::new(value).unwrap()
    }

    async fn open_in(dir: &TempDir) -> FileStorage {
        FileStorage::open(dir.path().join("links.txt")).await.unwrap()
    }

    #[tokio::test]
    async fn create_appends_lines_and_assigns_line_numbers() {
        let dir = TempDir::new().unwrap();
        let storage = open_in(&dir).await;

        let created = storage
            .create_short("u1", &urls(&["https://yandex.ru", "https://google.com"]))
            .await
            .unwrap();

        assert_eq!(created.ids, vec![id(1), id(2)]);
        assert!(!created.conflict);

        let contents = std::fs::read_to_string(storage.path()).unwrap();
        assert_eq!(contents, "https://yandex.ru\nhttps://google.com\n");
    }

    #[tokio::test]
    async fn get_long_reads_requested_line() {
        let dir = TempDir::new().unwrap();
        let storage = open_in(&dir).await;
        storage
            .create_short("u1", &urls(&["https://one.example", "https://two.example"]))
            .await
            .unwrap();

        assert_eq!(
            storage.get_long(id(2)).await.unwrap(),
            "https://two.example"
        );
        assert_eq!(
            storage.get_long(id(1)).await.unwrap(),
            "https://one.example"
        );
        assert!(matches!(
            storage.get_long(id(3)).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_urls_are_appended_again() {
        let dir = TempDir::new().unwrap();
        let storage = open_in(&dir).await;

        storage
            .create_short("u1", &urls(&["https://same.example"]))
            .await
            .unwrap();
        let created = storage
            .create_short("u1", &urls(&["https://same.example"]))
            .await
            .unwrap();

        assert_eq!(created.ids, vec![id(2)]);
        assert!(!created.conflict);
    }

    #[tokio::test]
    async fn reopen_resumes_ids_after_existing_lines() {
        let dir = TempDir::new().unwrap();
        {
            let storage = open_in(&dir).await;
            storage
                .create_short("u1", &urls(&["https://one.example", "https://two.example"]))
                .await
                .unwrap();
        }

        let storage = open_in(&dir).await;
        let created = storage
            .create_short("u1", &urls(&["https://three.example"]))
            .await
            .unwrap();

        assert_eq!(created.ids, vec![id(3)]);
        assert_eq!(
            storage.get_long(id(1)).await.unwrap(),
            "https://one.example"
        );
        assert_eq!(storage.statistic().await.unwrap().urls, 3);
    }

    #[tokio::test]
    async fn invalid_url_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let storage = open_in(&dir).await;

        let err = storage
            .create_short("u1", &urls(&["https://ok.example", "nope"]))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidInput(_)));
        assert_eq!(std::fs::read_to_string(storage.path()).unwrap(), "");
    }

    #[tokio::test]
    async fn url_with_newline_cannot_shift_line_ids() {
        let dir = TempDir::new().unwrap();
        let storage = open_in(&dir).await;

        let err = storage
            .create_short("u1", &urls(&["https://a.example/x\ny"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));

        let created = storage
            .create_short("u1", &urls(&["https://b.example"]))
            .await
            .unwrap();
        assert_eq!(created.ids, vec![id(1)]);
        assert_eq!(storage.get_long(id(1)).await.unwrap(), "https://b.example");
    }

    #[tokio::test]
    async fn delete_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let storage = open_in(&dir).await;
        storage
            .create_short("u1", &urls(&["https://example.com"]))
            .await
            .unwrap();

        storage.delete("u1", &[id(1)]).await.unwrap();

        assert_eq!(
            storage.get_long(id(1)).await.unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn history_lists_every_line_for_any_owner() {
        let dir = TempDir::new().unwrap();
        let storage = open_in(&dir).await;
        storage
            .create_short("u1", &urls(&["https://one.example"]))
            .await
            .unwrap();
        storage
            .create_short("u2", &urls(&["https://two.example"]))
            .await
            .unwrap();

        let history = storage.history("someone-else").await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, id(1));
        assert_eq!(history[1].original_url, "https://two.example");
    }

    #[tokio::test]
    async fn statistic_reports_no_users() {
        let dir = TempDir::new().unwrap();
        let storage = open_in(&dir).await;
        storage
            .create_short("u1", &urls(&["https://one.example"]))
            .await
            .unwrap();

        assert_eq!(
            storage.statistic().await.unwrap(),
            Statistic { urls: 1, users: 0 }
        );
        storage.ping().await.unwrap();
    }
}
