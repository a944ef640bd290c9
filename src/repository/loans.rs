//! Loans repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::loan::{LoanDetails, LoanDetailsRow, LoanRecord, OpenLoanOutcome},
};

use super::{violated_constraint, LedgerStore};

const LOAN_DETAILS_SELECT: &str = r#"
    SELECT l.id, l.user_id, l.item_id, l.borrowed_at, l.due_at,
           l.returned_at, l.returned,
           i.title AS item_title, u.email AS user_email
    FROM loans l
    JOIN catalog_items i ON i.id = l.item_id
    LEFT JOIN users u ON u.id = l.user_id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn list_details(&self, filter: &str, user_id: Option<i32>, now: Option<DateTime<Utc>>) -> AppResult<Vec<LoanDetails>> {
        let query = format!("{} WHERE {} ORDER BY l.borrowed_at DESC, l.id DESC", LOAN_DETAILS_SELECT, filter);
        let mut builder = sqlx::query_as::<_, LoanDetailsRow>(&query);
        if let Some(user_id) = user_id {
            builder = builder.bind(user_id);
        }
        if let Some(now) = now {
            builder = builder.bind(now);
        }
        let rows = builder.fetch_all(&self.pool).await?;

        let now = Utc::now();
        Ok(rows.into_iter().map(|r| r.into_details(now)).collect())
    }
}

#[async_trait]
impl LedgerStore for LoansRepository {
    async fn get(&self, id: i32) -> AppResult<Option<LoanRecord>> {
        let loan = sqlx::query_as::<_, LoanRecord>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    async fn find_open(&self, user_id: i32, item_id: &str) -> AppResult<Option<LoanRecord>> {
        let loan = sqlx::query_as::<_, LoanRecord>(
            "SELECT * FROM loans WHERE user_id = $1 AND item_id = $2 AND NOT returned",
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    async fn open_loan(
        &self,
        user_id: i32,
        item_id: &str,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> AppResult<OpenLoanOutcome> {
        let mut tx = self.pool.begin().await?;

        let already_borrowed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND item_id = $2 AND NOT returned)",
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await?;

        if already_borrowed {
            return Ok(OpenLoanOutcome::AlreadyBorrowed);
        }

        // Decrement with a floor check: the row lock taken here serialises
        // concurrent borrowers of the same item.
        let decremented = sqlx::query(
            r#"
            UPDATE catalog_items
            SET available_copies = available_copies - 1
            WHERE id = $1 AND kind = 'physical' AND available_copies > 0
            "#,
        )
        .bind(item_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if decremented == 0 {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM catalog_items WHERE id = $1)")
                .bind(item_id)
                .fetch_one(&mut *tx)
                .await?;
            return Ok(if exists {
                OpenLoanOutcome::NoCopies
            } else {
                OpenLoanOutcome::ItemMissing
            });
        }

        let inserted = sqlx::query_as::<_, LoanRecord>(
            r#"
            INSERT INTO loans (user_id, item_id, borrowed_at, due_at, returned)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(borrowed_at)
        .bind(due_at)
        .fetch_one(&mut *tx)
        .await;

        let loan = match inserted {
            Ok(loan) => loan,
            // A concurrent borrow by the same user won the race; dropping the
            // transaction rolls back our decrement.
            Err(e) if violated_constraint(&e).as_deref() == Some("loans_one_open_per_user_item") => {
                return Ok(OpenLoanOutcome::AlreadyBorrowed);
            }
            // The borrower's account was deleted after the token was checked
            Err(e) if violated_constraint(&e).as_deref() == Some("loans_user_id_fkey") => {
                return Err(AppError::NotFound(format!("User with id {} not found", user_id)));
            }
            Err(e) => return Err(AppError::Database(e)),
        };

        tx.commit().await?;
        Ok(OpenLoanOutcome::Opened(loan))
    }

    async fn close_loan(&self, loan_id: i32, returned_at: DateTime<Utc>) -> AppResult<Option<LoanRecord>> {
        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query_as::<_, LoanRecord>(
            r#"
            UPDATE loans SET returned = TRUE, returned_at = $2
            WHERE id = $1 AND NOT returned
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(returned_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(loan) = closed else {
            return Ok(None);
        };

        sqlx::query("UPDATE catalog_items SET available_copies = available_copies + 1 WHERE id = $1")
            .bind(&loan.item_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(loan))
    }

    async fn list_for_user(&self, user_id: i32, include_returned: bool) -> AppResult<Vec<LoanDetails>> {
        let filter = if include_returned {
            "l.user_id = $1"
        } else {
            "l.user_id = $1 AND NOT l.returned"
        };
        self.list_details(filter, Some(user_id), None).await
    }

    async fn list_open(&self) -> AppResult<Vec<LoanDetails>> {
        self.list_details("NOT l.returned", None, None).await
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>> {
        self.list_details("NOT l.returned AND l.due_at < $1", None, Some(now)).await
    }

    async fn count_open(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE NOT returned")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE NOT returned AND due_at < $1")
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
