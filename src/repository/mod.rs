//! Repository layer: store ports and their adapters
//!
//! Services only talk to the traits below. `Repository::new` wires the
//! PostgreSQL adapters, `Repository::in_memory` wires [`memory::MemoryStore`].

pub mod featured;
pub mod inquiries;
pub mod items;
pub mod loans;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        category::Category,
        featured::{FeaturedSet, NewFeaturedSet},
        inquiry::{CreateInquiry, Inquiry},
        item::{CatalogCounts, CatalogItem, ItemQuery, SearchSuggestion},
        loan::{LoanDetails, LoanRecord, OpenLoanOutcome},
        user::{NewUser, User},
    },
};

/// Persistent catalog items and categories
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Cheap connectivity check for readiness probes
    async fn ping(&self) -> AppResult<()>;

    async fn get(&self, id: &str) -> AppResult<Option<CatalogItem>>;

    /// Filtered page of items ordered by title, with the total match count
    async fn search(&self, query: &ItemQuery) -> AppResult<(Vec<CatalogItem>, i64)>;

    /// Items eligible for featuring (`is_available = true`)
    async fn list_available(&self) -> AppResult<Vec<CatalogItem>>;

    async fn create(&self, item: &CatalogItem) -> AppResult<CatalogItem>;

    /// Write descriptive fields and shift both copy counters by `copies_delta`.
    ///
    /// Fails with `DomainViolation` when the shift would leave fewer available
    /// copies than zero, i.e. more copies removed than are on the shelf.
    async fn update(&self, item: &CatalogItem, copies_delta: i32) -> AppResult<CatalogItem>;

    /// Fails with `DomainViolation` while open loans reference the item
    async fn delete(&self, id: &str) -> AppResult<()>;

    /// Listed items sharing at least one category with `item`, most shared
    /// categories first, then by title
    async fn related(&self, item: &CatalogItem, limit: i64) -> AppResult<Vec<CatalogItem>>;

    /// Titles then distinct authors of listed items containing `term`
    /// (lowercased), at most `limit` of each
    async fn suggest(&self, term: &str, limit: i64) -> AppResult<Vec<SearchSuggestion>>;

    async fn counts(&self) -> AppResult<CatalogCounts>;

    async fn list_categories(&self) -> AppResult<Vec<Category>>;

    async fn create_category(&self, name: &str, description: &str) -> AppResult<Category>;

    async fn delete_category(&self, id: i32) -> AppResult<()>;
}

/// Persistent loan records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<LoanRecord>>;

    async fn find_open(&self, user_id: i32, item_id: &str) -> AppResult<Option<LoanRecord>>;

    /// Atomically check for a duplicate open loan, take one copy off the
    /// shelf and record the loan. Nothing is written unless the loan opens.
    async fn open_loan(
        &self,
        user_id: i32,
        item_id: &str,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> AppResult<OpenLoanOutcome>;

    /// Atomically mark an open loan returned and put its copy back.
    /// Returns None when the loan does not exist or is already closed.
    async fn close_loan(&self, loan_id: i32, returned_at: DateTime<Utc>) -> AppResult<Option<LoanRecord>>;

    /// Loans of one user, newest first
    async fn list_for_user(&self, user_id: i32, include_returned: bool) -> AppResult<Vec<LoanDetails>>;

    async fn list_open(&self) -> AppResult<Vec<LoanDetails>>;

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>>;

    async fn count_open(&self) -> AppResult<i64>;

    async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64>;
}

/// Persistent featured sets; old sets are kept as history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeaturedStore: Send + Sync {
    /// Most recently created set still current at `now`
    async fn current(&self, now: DateTime<Utc>) -> AppResult<Option<FeaturedSet>>;

    async fn insert(&self, set: &NewFeaturedSet) -> AppResult<FeaturedSet>;

    /// Insert `set` unless another set is current at `set.created_at`, in which
    /// case that set is returned. Check and insert are atomic.
    async fn insert_unless_current(&self, set: &NewFeaturedSet) -> AppResult<FeaturedSet>;
}

/// Contact-form inquiries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InquiriesStore: Send + Sync {
    async fn create(&self, inquiry: &CreateInquiry, created_at: DateTime<Utc>) -> AppResult<Inquiry>;

    /// Newest first
    async fn list(&self) -> AppResult<Vec<Inquiry>>;
}

/// Persistent user accounts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsersStore: Send + Sync {
    /// Fails with `Conflict` when the email is taken
    async fn create(&self, user: &NewUser) -> AppResult<User>;

    async fn get_by_id(&self, id: i32) -> AppResult<Option<User>>;

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn list(&self) -> AppResult<Vec<User>>;

    /// Write email, names and role
    async fn update(&self, user: &User) -> AppResult<User>;

    async fn update_password(&self, id: i32, password_hash: &str) -> AppResult<()>;

    /// Fails with `DomainViolation` while the user has open loans
    async fn delete(&self, id: i32) -> AppResult<()>;

    async fn count(&self) -> AppResult<i64>;
}

/// Name of the constraint a failed statement violated, if any
pub(crate) fn violated_constraint(error: &sqlx::Error) -> Option<String> {
    error
        .as_database_error()
        .and_then(|db| db.constraint())
        .map(str::to_string)
}

/// Main repository struct holding the store adapters
#[derive(Clone)]
pub struct Repository {
    pub catalog: Arc<dyn CatalogStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub featured: Arc<dyn FeaturedStore>,
    pub users: Arc<dyn UsersStore>,
    pub inquiries: Arc<dyn InquiriesStore>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            catalog: Arc::new(items::ItemsRepository::new(pool.clone())),
            ledger: Arc::new(loans::LoansRepository::new(pool.clone())),
            featured: Arc::new(featured::FeaturedRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            inquiries: Arc::new(inquiries::InquiriesRepository::new(pool)),
        }
    }

    /// Create a repository whose stores share one process-local state
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            catalog: store.clone(),
            ledger: store.clone(),
            featured: store.clone(),
            users: store.clone(),
            inquiries: store,
        }
    }
}
