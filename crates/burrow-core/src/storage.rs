use crate::error::Result;
use crate::link::{Created, LinkId, LinkRecord, Statistic};
use async_trait::async_trait;

/// The storage contract shared by every backend.
///
/// Callers depend only on this trait, never on which backend is active.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Shortens a batch of URLs on behalf of `owner`.
    ///
    /// Returns one id per URL in input order. URLs that are already stored
    /// keep their existing id and set [`Created::conflict`]. A malformed URL
    /// fails the whole batch with `InvalidInput` before anything is written.
    async fn create_short(&self, owner: &str, urls: &[String]) -> Result<Created>;

    /// Resolves an id to its long URL.
    ///
    /// Returns `NotFound` for ids that were never assigned and `Gone` for
    /// soft-deleted ones.
    async fn get_long(&self, id: LinkId) -> Result<String>;

    /// Soft-deletes the given ids that belong to `owner`.
    ///
    /// Ids owned by someone else, or unknown ids, are skipped silently. A
    /// backend may apply the deletion asynchronously; a later `get_long`
    /// eventually observes `Gone`.
    async fn delete(&self, owner: &str, ids: &[LinkId]) -> Result<()>;

    /// Lists every link created by `owner`, deleted ones included, in
    /// creation order.
    async fn history(&self, owner: &str) -> Result<Vec<LinkRecord>>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Returns aggregate counts.
    async fn statistic(&self) -> Result<Statistic>;
}
