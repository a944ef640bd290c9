//! Featured sets repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        featured::{FeaturedSet, NewFeaturedSet},
        item::{CatalogItem, CatalogItemRow},
    },
};

use super::FeaturedStore;

/// Advisory lock key serialising featured-set currency checks
const FEATURED_LOCK_KEY: i64 = 0x4645_4154;

#[derive(Debug, FromRow)]
struct FeaturedSetRow {
    id: i32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FeaturedRepository {
    pool: Pool<Postgres>,
}

impl FeaturedRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn load_items(conn: &mut PgConnection, set_id: i32) -> AppResult<Vec<CatalogItem>> {
        let rows = sqlx::query_as::<_, CatalogItemRow>(
            r#"
            SELECT i.id, i.title, i.author, i.description, i.publisher,
                   i.media_type, i.kind, i.total_copies, i.available_copies,
                   i.is_available, i.external_source, i.download_permission,
                   i.created_at, i.updated_at,
                   ARRAY(
                       SELECT c.name FROM item_categories ic
                       JOIN categories c ON c.id = ic.category_id
                       WHERE ic.item_id = i.id
                       ORDER BY c.name
                   ) AS categories
            FROM featured_set_items fi
            JOIN catalog_items i ON i.id = fi.item_id
            WHERE fi.set_id = $1
            ORDER BY fi.position
            "#,
        )
        .bind(set_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(CatalogItem::from).collect())
    }

    async fn current_in(conn: &mut PgConnection, now: DateTime<Utc>) -> AppResult<Option<FeaturedSet>> {
        let row = sqlx::query_as::<_, FeaturedSetRow>(
            r#"
            SELECT id, created_at, expires_at FROM featured_sets
            WHERE expires_at > $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let items = Self::load_items(conn, row.id).await?;
                Ok(Some(FeaturedSet {
                    id: row.id,
                    items,
                    created_at: row.created_at,
                    expires_at: row.expires_at,
                }))
            }
            None => Ok(None),
        }
    }

    async fn insert_in(conn: &mut PgConnection, set: &NewFeaturedSet) -> AppResult<FeaturedSet> {
        let row = sqlx::query_as::<_, FeaturedSetRow>(
            "INSERT INTO featured_sets (created_at, expires_at) VALUES ($1, $2) RETURNING id, created_at, expires_at",
        )
        .bind(set.created_at)
        .bind(set.expires_at)
        .fetch_one(&mut *conn)
        .await?;

        for (position, item_id) in set.item_ids.iter().enumerate() {
            sqlx::query("INSERT INTO featured_set_items (set_id, item_id, position) VALUES ($1, $2, $3)")
                .bind(row.id)
                .bind(item_id)
                .bind(position as i16)
                .execute(&mut *conn)
                .await?;
        }

        let items = Self::load_items(conn, row.id).await?;
        Ok(FeaturedSet {
            id: row.id,
            items,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[async_trait]
impl FeaturedStore for FeaturedRepository {
    async fn current(&self, now: DateTime<Utc>) -> AppResult<Option<FeaturedSet>> {
        let mut conn = self.pool.acquire().await?;
        Self::current_in(&mut conn, now).await
    }

    async fn insert(&self, set: &NewFeaturedSet) -> AppResult<FeaturedSet> {
        let mut tx = self.pool.begin().await?;
        let created = Self::insert_in(&mut tx, set).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn insert_unless_current(&self, set: &NewFeaturedSet) -> AppResult<FeaturedSet> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(FEATURED_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        if let Some(current) = Self::current_in(&mut tx, set.created_at).await? {
            return Ok(current);
        }

        let created = Self::insert_in(&mut tx, set).await?;
        tx.commit().await?;
        Ok(created)
    }
}
