//! Statistics service

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, repository::Repository};

/// Library-wide counters
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LibraryStats {
    pub total_items: i64,
    pub books: i64,
    pub videos: i64,
    /// Items listed in the public catalog
    pub listed_items: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub active_loans: i64,
    pub overdue_loans: i64,
    pub users: i64,
}

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get_stats(&self) -> AppResult<LibraryStats> {
        let now = Utc::now();
        let counts = self.repository.catalog.counts().await?;
        let active_loans = self.repository.ledger.count_open().await?;
        let overdue_loans = self.repository.ledger.count_overdue(now).await?;
        let users = self.repository.users.count().await?;

        Ok(LibraryStats {
            total_items: counts.total_items,
            books: counts.books,
            videos: counts.videos,
            listed_items: counts.listed_items,
            total_copies: counts.total_copies,
            available_copies: counts.available_copies,
            active_loans,
            overdue_loans,
            users,
        })
    }
}
