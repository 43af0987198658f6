use crate::allocator::IdAllocator;
use async_trait::async_trait;
use burrow_core::{
    validate_urls, Created, LinkId, LinkRecord, Result, Statistic, Storage, StorageError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace};

/// In-memory storage entry for a link.
#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    owner: String,
    deleted: bool,
}

#[derive(Debug, Default)]
struct State {
    /// Entries indexed by `id - 1`.
    links: Vec<Entry>,
    by_url: HashMap<String, LinkId>,
    owners: HashMap<String, Vec<LinkId>>,
    allocator: IdAllocator,
}

impl State {
    fn entry(&self, id: LinkId) -> Option<&Entry> {
        let index = usize::try_from(id.get() - 1).ok()?;
        self.links.get(index)
    }

    fn entry_mut(&mut self, id: LinkId) -> Option<&mut Entry> {
        let index = usize::try_from(id.get() - 1).ok()?;
        self.links.get_mut(index)
    }
}

/// In-memory implementation of [`Storage`].
///
/// A single mutex covers every map, so each call (including the conflict
/// check and insert of a whole batch) is one critical section. Nothing
/// survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: Mutex<State>,
}

impl InMemoryStorage {
    /// Creates a new, empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_short(&self, owner: &str, urls: &[String]) -> Result<Created> {
        validate_urls(urls)?;

        let mut state = self.state.lock();
        let mut created = Created {
            ids: Vec::with_capacity(urls.len()),
            conflict: false,
        };

        for url in urls {
            if let Some(&id) = state.by_url.get(url) {
                trace!(id = %id, url = %url, "url already stored");
                created.conflict = true;
                created.ids.push(id);
                continue;
            }

            let id = state.allocator.allocate()?;
            state.links.push(Entry {
                original_url: url.clone(),
                owner: owner.to_string(),
                deleted: false,
            });
            state.by_url.insert(url.clone(), id);
            state.owners.entry(owner.to_string()).or_default().push(id);
            created.ids.push(id);
        }

        debug!(
            owner = %owner,
            count = created.ids.len(),
            conflict = created.conflict,
            "stored links in memory"
        );
        Ok(created)
    }

    async fn get_long(&self, id: LinkId) -> Result<String> {
        let state = self.state.lock();

        match state.entry(id) {
            None => Err(StorageError::NotFound(id.to_string())),
            Some(entry) if entry.deleted => Err(StorageError::Gone(id.to_string())),
            Some(entry) => Ok(entry.original_url.clone()),
        }
    }

    async fn delete(&self, owner: &str, ids: &[LinkId]) -> Result<()> {
        let mut state = self.state.lock();
        let mut deleted = 0usize;

        for &id in ids {
            match state.entry_mut(id) {
                Some(entry) if entry.owner == owner => {
                    entry.deleted = true;
                    deleted += 1;
                }
                _ => trace!(id = %id, owner = %owner, "skipping delete of foreign or unknown id"),
            }
        }

        debug!(owner = %owner, requested = ids.len(), deleted, "deleted links in memory");
        Ok(())
    }

    async fn history(&self, owner: &str) -> Result<Vec<LinkRecord>> {
        let state = self.state.lock();

        let Some(ids) = state.owners.get(owner) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .filter_map(|&id| {
                state.entry(id).map(|entry| LinkRecord {
                    id,
                    original_url: entry.original_url.clone(),
                })
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn statistic(&self) -> Result<Statistic> {
        let state = self.state.lock();

        Ok(Statistic {
            urls: state.links.len() as u64,
            users: state.owners.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn urls(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn id(value: u64) -> LinkId {
        LinkId::new(value).unwrap()
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let storage = InMemoryStorage::new();

        let created = storage
            .create_short("u1", &urls(&["https://yandex.ru", "https://google.com"]))
            .await
            .unwrap();

        assert_eq!(created.ids, vec![id(1), id(2)]);
        assert!(!created.conflict);
    }

    #[tokio::test]
    async fn duplicate_url_returns_existing_id_with_conflict() {
        let storage = InMemoryStorage::new();
        storage
            .create_short("u1", &urls(&["https://yandex.ru", "https://google.com"]))
            .await
            .unwrap();

        let created = storage
            .create_short("u2", &urls(&["https://yandex.ru"]))
            .await
            .unwrap();

        assert_eq!(created.ids, vec![id(1)]);
        assert!(created.conflict);
        // Ownership is not transferred to the second caller.
        assert!(storage.history("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_url_within_batch_conflicts() {
        let storage = InMemoryStorage::new();

        let created = storage
            .create_short("u1", &urls(&["https://a.example", "https://a.example"]))
            .await
            .unwrap();

        assert_eq!(created.ids, vec![id(1), id(1)]);
        assert!(created.conflict);
    }

    #[tokio::test]
    async fn invalid_url_rejects_whole_batch() {
        let storage = InMemoryStorage::new();

        let err = storage
            .create_short("u1", &urls(&["https://ok.example", "not a url"]))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidInput(_)));
        assert_eq!(storage.statistic().await.unwrap(), Statistic::default());
        assert!(matches!(
            storage.get_long(id(1)).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn get_long_round_trips_url() {
        let storage = InMemoryStorage::new();
        let url = "https://example.com/a/b?c=d&e=%20f#frag";
        storage.create_short("u1", &urls(&[url])).await.unwrap();

        assert_eq!(storage.get_long(id(1)).await.unwrap(), url);
    }

    #[tokio::test]
    async fn get_long_unknown_is_not_found() {
        let storage = InMemoryStorage::new();

        let err = storage.get_long(id(99)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleted_link_is_gone() {
        let storage = InMemoryStorage::new();
        storage
            .create_short("u1", &urls(&["https://example.com"]))
            .await
            .unwrap();

        storage.delete("u1", &[id(1)]).await.unwrap();

        let err = storage.get_long(id(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Gone(_)));
    }

    #[tokio::test]
    async fn delete_by_other_owner_is_ignored() {
        let storage = InMemoryStorage::new();
        storage
            .create_short("u1", &urls(&["https://example.com"]))
            .await
            .unwrap();

        storage.delete("u2", &[id(1), id(42)]).await.unwrap();

        assert_eq!(
            storage.get_long(id(1)).await.unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let storage = InMemoryStorage::new();
        storage
            .create_short("u1", &urls(&["https://one.example"]))
            .await
            .unwrap();
        storage.delete("u1", &[id(1)]).await.unwrap();

        let created = storage
            .create_short("u1", &urls(&["https://two.example"]))
            .await
            .unwrap();

        assert_eq!(created.ids, vec![id(2)]);
    }

    #[tokio::test]
    async fn history_includes_deleted_links_in_creation_order() {
        let storage = InMemoryStorage::new();
        storage
            .create_short("u1", &urls(&["https://one.example"]))
            .await
            .unwrap();
        storage
            .create_short("u2", &urls(&["https://two.example"]))
            .await
            .unwrap();
        storage
            .create_short("u1", &urls(&["https://three.example"]))
            .await
            .unwrap();
        storage.delete("u1", &[id(1)]).await.unwrap();

        let history = storage.history("u1").await.unwrap();

        assert_eq!(
            history,
            vec![
                LinkRecord {
                    id: id(1),
                    original_url: "https://one.example".to_string(),
                },
                LinkRecord {
                    id: id(3),
                    original_url: "https://three.example".to_string(),
                },
            ]
        );
        assert!(storage.history("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn statistic_counts_urls_and_owners() {
        let storage = InMemoryStorage::new();
        storage
            .create_short("u1", &urls(&["https://one.example", "https://two.example"]))
            .await
            .unwrap();
        storage
            .create_short("u2", &urls(&["https://three.example"]))
            .await
            .unwrap();

        assert_eq!(
            storage.statistic().await.unwrap(),
            Statistic { urls: 3, users: 2 }
        );
        storage.ping().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_creates_get_unique_ids() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut handles = vec![];

        for i in 0..20u64 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                let url = format!("https://example{}.com", i);
                storage
                    .create_short("u1", &[url.clone()])
                    .await
                    .map(|created| (created.ids[0], url))
                    .unwrap()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }

        let mut ids: Vec<u64> = seen.iter().map(|(id, _)| id.get()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());

        for (id, url) in seen {
            assert_eq!(storage.get_long(id).await.unwrap(), url);
        }
    }
}
