//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// One borrow transaction, open until returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanRecord {
    pub id: i32,
    pub user_id: i32,
    pub item_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub returned: bool,
}

impl LoanRecord {
    pub fn is_open(&self) -> bool {
        !self.returned
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_at < now
    }
}

/// Loan joined with the borrower and the item, for listings
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: LoanRecord,
    pub item_title: String,
    pub user_email: Option<String>,
    pub is_overdue: bool,
}

/// Internal row structure for loan listings
#[derive(Debug, Clone, FromRow)]
pub struct LoanDetailsRow {
    id: i32,
    user_id: i32,
    item_id: String,
    borrowed_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    returned: bool,
    item_title: String,
    user_email: Option<String>,
}

impl LoanDetailsRow {
    pub fn into_details(self, now: DateTime<Utc>) -> LoanDetails {
        let loan = LoanRecord {
            id: self.id,
            user_id: self.user_id,
            item_id: self.item_id,
            borrowed_at: self.borrowed_at,
            due_at: self.due_at,
            returned_at: self.returned_at,
            returned: self.returned,
        };
        LoanDetails {
            is_overdue: loan.is_overdue(now),
            loan,
            item_title: self.item_title,
            user_email: self.user_email,
        }
    }
}

/// Result of the atomic reserve-a-copy-and-open-a-loan step
#[derive(Debug, Clone, PartialEq)]
pub enum OpenLoanOutcome {
    Opened(LoanRecord),
    /// The user already holds an open loan on this item
    AlreadyBorrowed,
    /// No copy left on the shelf
    NoCopies,
    ItemMissing,
}

/// Borrow request
#[derive(Debug, Deserialize, ToSchema)]
pub struct BorrowRequest {
    /// Loan duration in days (1-30)
    pub days: i64,
}
