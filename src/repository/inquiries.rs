//! Inquiries repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::inquiry::{CreateInquiry, Inquiry},
};

use super::InquiriesStore;

#[derive(Clone)]
pub struct InquiriesRepository {
    pool: Pool<Postgres>,
}

impl InquiriesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InquiriesStore for InquiriesRepository {
    async fn create(&self, inquiry: &CreateInquiry, created_at: DateTime<Utc>) -> AppResult<Inquiry> {
        let created = sqlx::query_as::<_, Inquiry>(
            r#"
            INSERT INTO inquiries (name, email, subject, message, created_at, is_resolved)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            RETURNING *
            "#,
        )
        .bind(&inquiry.name)
        .bind(&inquiry.email)
        .bind(&inquiry.subject)
        .bind(&inquiry.message)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list(&self) -> AppResult<Vec<Inquiry>> {
        let inquiries = sqlx::query_as::<_, Inquiry>("SELECT * FROM inquiries ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(inquiries)
    }
}
