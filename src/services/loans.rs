//! Lending ledger: borrow and return of physical copies

use chrono::{Duration, Utc};

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        item::CatalogItem,
        loan::{LoanDetails, LoanRecord, OpenLoanOutcome},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LendingLedger {
    repository: Repository,
    config: LendingConfig,
}

impl LendingLedger {
    pub fn new(repository: Repository, config: LendingConfig) -> Self {
        Self { repository, config }
    }

    async fn item(&self, item_id: &str) -> AppResult<CatalogItem> {
        self.repository
            .catalog
            .get(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", item_id)))
    }

    /// Borrow one copy of an item for `days` days
    pub async fn borrow(&self, item_id: &str, user_id: i32, days: i64) -> AppResult<LoanRecord> {
        let item = self.item(item_id).await?;

        if !item.is_borrowable() {
            tracing::debug!(item_id, user_id, "Borrow refused: digital item");
            return Err(AppError::DomainViolation("Digital items cannot be borrowed".to_string()));
        }

        if days < self.config.min_loan_days || days > self.config.max_loan_days {
            return Err(AppError::DomainViolation(format!(
                "Loan duration must be between {} and {} days",
                self.config.min_loan_days, self.config.max_loan_days
            )));
        }

        let now = Utc::now();
        let due_at = now + Duration::days(days);

        match self.repository.ledger.open_loan(user_id, item_id, now, due_at).await? {
            OpenLoanOutcome::Opened(loan) => {
                tracing::info!(loan_id = loan.id, item_id, user_id, "Item borrowed until {}", loan.due_at);
                Ok(loan)
            }
            OpenLoanOutcome::AlreadyBorrowed => {
                tracing::debug!(item_id, user_id, "Borrow refused: already on loan to user");
                Err(AppError::DomainViolation("You already have this item on loan".to_string()))
            }
            OpenLoanOutcome::NoCopies => {
                tracing::debug!(item_id, user_id, "Borrow refused: no copies left");
                Err(AppError::DomainViolation("No copies of this item are available".to_string()))
            }
            OpenLoanOutcome::ItemMissing => Err(AppError::NotFound(format!("Item {} not found", item_id))),
        }
    }

    /// Return the caller's open loan on an item
    pub async fn return_item(&self, item_id: &str, user_id: i32) -> AppResult<LoanRecord> {
        self.item(item_id).await?;

        let nothing_to_return = || AppError::DomainViolation("You have no open loan on this item to return".to_string());

        let open = self
            .repository
            .ledger
            .find_open(user_id, item_id)
            .await?
            .ok_or_else(nothing_to_return)?;

        // A concurrent return of the same loan makes the close a no-op
        let closed = self
            .repository
            .ledger
            .close_loan(open.id, Utc::now())
            .await?
            .ok_or_else(nothing_to_return)?;

        tracing::info!(loan_id = closed.id, item_id, user_id, "Item returned");
        Ok(closed)
    }

    /// Close a loan on behalf of its borrower
    pub async fn admin_return(&self, item_id: &str, loan_id: i32) -> AppResult<LoanRecord> {
        self.item(item_id).await?;

        let loan = self
            .repository
            .ledger
            .get(loan_id)
            .await?
            .filter(|l| l.item_id == item_id)
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found for item {}", loan_id, item_id)))?;

        let already_returned = || AppError::DomainViolation(format!("Loan {} is already returned", loan_id));
        if !loan.is_open() {
            return Err(already_returned());
        }

        let closed = self
            .repository
            .ledger
            .close_loan(loan.id, Utc::now())
            .await?
            .ok_or_else(already_returned)?;

        tracing::info!(loan_id, item_id, user_id = closed.user_id, "Loan closed by administrator");
        Ok(closed)
    }

    /// Open loans of a user
    pub async fn user_loans(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.ledger.list_for_user(user_id, false).await
    }

    /// All loans of a user, returned ones included
    pub async fn user_history(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        self.repository.ledger.list_for_user(user_id, true).await
    }

    pub async fn active_loans(&self) -> AppResult<Vec<LoanDetails>> {
        self.repository.ledger.list_open().await
    }

    pub async fn overdue_loans(&self) -> AppResult<Vec<LoanDetails>> {
        self.repository.ledger.list_overdue(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::{
        models::item::{DownloadPermission, ItemKind, MediaType},
        repository::{
            MockCatalogStore, MockFeaturedStore, MockInquiriesStore, MockLedgerStore, MockUsersStore,
        },
    };

    fn item(id: &str, kind: ItemKind, copies: i32) -> CatalogItem {
        let now = Utc::now();
        CatalogItem {
            id: id.to_string(),
            title: "The Name of the Rose".to_string(),
            author: "Umberto Eco".to_string(),
            description: "-".to_string(),
            publisher: None,
            media_type: MediaType::Book,
            kind,
            total_copies: copies,
            available_copies: copies,
            is_available: true,
            categories: vec![],
            external_source: None,
            download_permission: DownloadPermission::None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn ledger_with(items: &[CatalogItem]) -> (LendingLedger, Repository) {
        let repository = Repository::in_memory();
        for item in items {
            repository.catalog.create(item).await.unwrap();
        }
        (LendingLedger::new(repository.clone(), LendingConfig::default()), repository)
    }

    async fn available(repository: &Repository, id: &str) -> i32 {
        repository.catalog.get(id).await.unwrap().unwrap().available_copies
    }

    #[tokio::test]
    async fn test_borrow_then_return_restores_copies() {
        let (ledger, repository) = ledger_with(&[item("BOOK-000001", ItemKind::Physical, 2)]).await;

        let loan = ledger.borrow("BOOK-000001", 7, 14).await.unwrap();
        assert!(loan.is_open());
        assert_eq!(loan.due_at - loan.borrowed_at, Duration::days(14));
        assert_eq!(available(&repository, "BOOK-000001").await, 1);

        let returned = ledger.return_item("BOOK-000001", 7).await.unwrap();
        assert!(returned.returned);
        assert!(returned.returned_at.is_some());
        assert_eq!(available(&repository, "BOOK-000001").await, 2);

        let again = ledger.return_item("BOOK-000001", 7).await;
        assert!(matches!(again, Err(AppError::DomainViolation(_))));
    }

    #[tokio::test]
    async fn test_borrow_without_copies_leaves_counter() {
        let (ledger, repository) = ledger_with(&[item("BOOK-000002", ItemKind::Physical, 1)]).await;
        ledger.borrow("BOOK-000002", 1, 7).await.unwrap();

        let refused = ledger.borrow("BOOK-000002", 2, 7).await;
        assert!(matches!(refused, Err(AppError::DomainViolation(_))));
        assert_eq!(available(&repository, "BOOK-000002").await, 0);
    }

    #[tokio::test]
    async fn test_second_borrow_by_same_user_refused_until_return() {
        let (ledger, _) = ledger_with(&[item("BOOK-000003", ItemKind::Physical, 3)]).await;
        ledger.borrow("BOOK-000003", 5, 7).await.unwrap();

        let duplicate = ledger.borrow("BOOK-000003", 5, 7).await;
        assert!(matches!(duplicate, Err(AppError::DomainViolation(_))));

        ledger.return_item("BOOK-000003", 5).await.unwrap();
        assert!(ledger.borrow("BOOK-000003", 5, 7).await.is_ok());
    }

    #[tokio::test]
    async fn test_duration_bounds() {
        let (ledger, _) = ledger_with(&[item("BOOK-000004", ItemKind::Physical, 10)]).await;

        for days in [0, 31, -3] {
            let result = ledger.borrow("BOOK-000004", days as i32 + 100, days).await;
            assert!(matches!(result, Err(AppError::DomainViolation(_))), "{} days", days);
        }
        assert!(ledger.borrow("BOOK-000004", 1, 1).await.is_ok());
        assert!(ledger.borrow("BOOK-000004", 2, 30).await.is_ok());
    }

    #[tokio::test]
    async fn test_digital_and_unknown_items() {
        let (ledger, _) = ledger_with(&[item("BOOK-000005", ItemKind::Digital, 0)]).await;

        let digital = ledger.borrow("BOOK-000005", 1, 7).await;
        assert!(matches!(digital, Err(AppError::DomainViolation(_))));

        let unknown = ledger.borrow("BOOK-FFFFFF", 1, 7).await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));

        let unknown = ledger.return_item("BOOK-FFFFFF", 1).await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_borrow_of_last_copy() {
        let (ledger, repository) = ledger_with(&[item("BOOK-000006", ItemKind::Physical, 1)]).await;

        let (a, b) = tokio::join!(
            ledger.borrow("BOOK-000006", 1, 7),
            ledger.borrow("BOOK-000006", 2, 7)
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let failure = if a.is_err() { a } else { b };
        assert!(matches!(failure, Err(AppError::DomainViolation(_))));
        assert_eq!(available(&repository, "BOOK-000006").await, 0);
    }

    #[tokio::test]
    async fn test_admin_return() {
        let (ledger, repository) = ledger_with(&[
            item("BOOK-000007", ItemKind::Physical, 1),
            item("BOOK-000008", ItemKind::Physical, 1),
        ])
        .await;
        let loan = ledger.borrow("BOOK-000007", 3, 7).await.unwrap();

        let wrong_item = ledger.admin_return("BOOK-000008", loan.id).await;
        assert!(matches!(wrong_item, Err(AppError::NotFound(_))));

        let closed = ledger.admin_return("BOOK-000007", loan.id).await.unwrap();
        assert_eq!(closed.user_id, 3);
        assert_eq!(available(&repository, "BOOK-000007").await, 1);

        let twice = ledger.admin_return("BOOK-000007", loan.id).await;
        assert!(matches!(twice, Err(AppError::DomainViolation(_))));
    }

    #[tokio::test]
    async fn test_listings() {
        let (ledger, _) = ledger_with(&[
            item("BOOK-000009", ItemKind::Physical, 1),
            item("BOOK-00000A", ItemKind::Physical, 1),
        ])
        .await;
        ledger.borrow("BOOK-000009", 4, 7).await.unwrap();
        ledger.borrow("BOOK-00000A", 4, 7).await.unwrap();
        ledger.return_item("BOOK-000009", 4).await.unwrap();

        assert_eq!(ledger.user_loans(4).await.unwrap().len(), 1);
        assert_eq!(ledger.user_history(4).await.unwrap().len(), 2);
        assert_eq!(ledger.active_loans().await.unwrap().len(), 1);
        assert!(ledger.overdue_loans().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_propagated() {
        let mut catalog = MockCatalogStore::new();
        catalog
            .expect_get()
            .returning(|_| Ok(Some(item("BOOK-00000B", ItemKind::Physical, 1))));
        let mut ledger_store = MockLedgerStore::new();
        ledger_store
            .expect_open_loan()
            .returning(|_, _, _, _| Err(AppError::Database(sqlx::Error::PoolTimedOut)));

        let repository = Repository {
            catalog: Arc::new(catalog),
            ledger: Arc::new(ledger_store),
            featured: Arc::new(MockFeaturedStore::new()),
            users: Arc::new(MockUsersStore::new()),
            inquiries: Arc::new(MockInquiriesStore::new()),
        };
        let ledger = LendingLedger::new(repository, LendingConfig::default());

        let result = ledger.borrow("BOOK-00000B", 1, 7).await;
        assert!(matches!(result, Err(ref e) if e.is_transient()));
    }
}
