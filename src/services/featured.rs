//! Featured-set rotation
//!
//! A featured set is a small random selection of listed catalog items that
//! stays current for a fixed lifetime. Reading the current set, or saving a
//! catalog item while no set is current, creates a new one. Failures on those
//! lazy paths are logged and counted, never surfaced to the caller.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;

use crate::{
    config::FeaturedConfig,
    error::AppResult,
    models::{
        featured::{FeaturedSet, FeaturedSetView, NewFeaturedSet},
        item::CatalogItem,
    },
    repository::Repository,
};

use super::catalog::CatalogHook;

/// Pick up to `size` distinct items uniformly at random, in draw order
fn pick_featured(candidates: &[CatalogItem], size: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    candidates
        .choose_multiple(&mut rng, size)
        .map(|item| item.id.clone())
        .collect()
}

pub struct FeaturedRotator {
    repository: Repository,
    config: FeaturedConfig,
    failures: AtomicU64,
}

impl FeaturedRotator {
    pub fn new(repository: Repository, config: FeaturedConfig) -> Self {
        Self {
            repository,
            config,
            failures: AtomicU64::new(0),
        }
    }

    /// Number of swallowed failures since startup
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn record_failure(&self, context: &str, error: &crate::error::AppError) {
        let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(failures = total, "Featured set {} failed: {}", context, error);
    }

    async fn draw(&self, now: DateTime<Utc>) -> AppResult<NewFeaturedSet> {
        let candidates = self.repository.catalog.list_available().await?;
        Ok(NewFeaturedSet {
            item_ids: pick_featured(&candidates, self.config.set_size),
            created_at: now,
            expires_at: now + Duration::hours(self.config.lifetime_hours),
        })
    }

    /// Current set, creating one when none is current.
    ///
    /// Returns an empty view when the stores fail.
    pub async fn get_current(&self) -> FeaturedSetView {
        let now = Utc::now();
        match self.ensure_current(now).await {
            Ok(set) => FeaturedSetView::from_set(set, now),
            Err(e) => {
                self.record_failure("lookup", &e);
                FeaturedSetView::empty()
            }
        }
    }

    /// Draw and persist a new set unconditionally (administrator refresh)
    pub async fn create_set(&self) -> AppResult<FeaturedSet> {
        let set = self.draw(Utc::now()).await?;
        let created = self.repository.featured.insert(&set).await?;
        tracing::info!(set_id = created.id, items = created.items.len(), "Featured set created");
        Ok(created)
    }

    /// Current set at `now`; a new one is drawn only when none is current
    pub async fn ensure_current(&self, now: DateTime<Utc>) -> AppResult<FeaturedSet> {
        if let Some(current) = self.repository.featured.current(now).await? {
            return Ok(current);
        }

        let set = self.draw(now).await?;
        let created = self.repository.featured.insert_unless_current(&set).await?;
        tracing::info!(set_id = created.id, items = created.items.len(), "Featured set rotated");
        Ok(created)
    }
}

#[async_trait]
impl CatalogHook for FeaturedRotator {
    async fn item_saved(&self, item: &CatalogItem) {
        if let Err(e) = self.ensure_current(Utc::now()).await {
            tracing::debug!(item_id = %item.id, "Featured refresh after catalog write skipped");
            self.record_failure("refresh", &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use crate::{
        error::AppError,
        models::item::{DownloadPermission, ItemKind, MediaType},
        repository::{
            MockCatalogStore, MockFeaturedStore, MockInquiriesStore, MockLedgerStore, MockUsersStore,
        },
    };

    fn item(n: usize, listed: bool) -> CatalogItem {
        let now = Utc::now();
        CatalogItem {
            id: format!("BOOK-{:06X}", n),
            title: format!("Volume {}", n),
            author: "Anonymous".to_string(),
            description: "-".to_string(),
            publisher: None,
            media_type: MediaType::Book,
            kind: ItemKind::Physical,
            total_copies: 1,
            available_copies: 1,
            is_available: listed,
            categories: vec![],
            external_source: None,
            download_permission: DownloadPermission::None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded(listed: usize, unlisted: usize) -> FeaturedRotator {
        let repository = Repository::in_memory();
        for n in 0..listed + unlisted {
            repository.catalog.create(&item(n, n < listed)).await.unwrap();
        }
        FeaturedRotator::new(repository, FeaturedConfig::default())
    }

    #[test]
    fn test_pick_featured_is_distinct_and_bounded() {
        let items: Vec<CatalogItem> = (0..10).map(|n| item(n, true)).collect();
        let picked = pick_featured(&items, 4);
        assert_eq!(picked.len(), 4);
        assert_eq!(picked.iter().collect::<HashSet<_>>().len(), 4);

        assert_eq!(pick_featured(&items[..2], 4).len(), 2);
        assert!(pick_featured(&[], 4).is_empty());
    }

    #[tokio::test]
    async fn test_create_set_sizes() {
        let few = seeded(3, 2).await;
        let set = few.create_set().await.unwrap();
        assert_eq!(set.items.len(), 3);
        assert!(set.items.iter().all(|i| i.is_available));
        assert_eq!(set.expires_at - set.created_at, Duration::hours(12));

        let many = seeded(9, 0).await;
        let set = many.create_set().await.unwrap();
        assert_eq!(set.items.len(), 4);

        let none = seeded(0, 3).await;
        assert!(none.create_set().await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_get_current_is_stable_within_lifetime() {
        let rotator = seeded(6, 0).await;
        let first = rotator.get_current().await;
        let second = rotator.get_current().await;

        assert!(first.is_current);
        assert_eq!(first.id, second.id);
        let ids = |v: &FeaturedSetView| v.items.iter().map(|i| i.item.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn test_expired_set_is_replaced() {
        let rotator = seeded(6, 0).await;
        let now = Utc::now();
        let old = rotator.ensure_current(now).await.unwrap();

        let later = now + Duration::hours(13);
        let fresh = rotator.ensure_current(later).await.unwrap();
        assert_ne!(old.id, fresh.id);
        assert!(fresh.is_current(later));
    }

    #[tokio::test]
    async fn test_concurrent_readers_share_one_set() {
        let rotator = Arc::new(seeded(5, 0).await);
        let (a, b) = tokio::join!(rotator.get_current(), rotator.get_current());
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_store_failure_yields_empty_view() {
        let mut featured = MockFeaturedStore::new();
        featured.expect_current().returning(|_| Ok(None));
        let mut catalog = MockCatalogStore::new();
        catalog
            .expect_list_available()
            .returning(|| Err(AppError::Database(sqlx::Error::PoolTimedOut)));

        let repository = Repository {
            catalog: Arc::new(catalog),
            ledger: Arc::new(MockLedgerStore::new()),
            featured: Arc::new(featured),
            users: Arc::new(MockUsersStore::new()),
            inquiries: Arc::new(MockInquiriesStore::new()),
        };
        let rotator = FeaturedRotator::new(repository, FeaturedConfig::default());

        let view = rotator.get_current().await;
        assert!(view.items.is_empty());
        assert!(view.id.is_none());
        assert_eq!(rotator.failure_count(), 1);

        rotator.item_saved(&item(1, true)).await;
        assert_eq!(rotator.failure_count(), 2);
    }
}
