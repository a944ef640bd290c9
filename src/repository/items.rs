//! Catalog items and categories repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::{
        category::Category,
        item::{
            like_contains, CatalogCounts, CatalogItem, CatalogItemRow, ItemQuery, SearchSuggestion,
            SuggestionKind,
        },
    },
};

use super::{violated_constraint, CatalogStore};

/// Item columns plus the aggregated category names
const ITEM_SELECT: &str = r#"
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
    FROM catalog_items i
"#;

#[derive(Clone)]
pub struct ItemsRepository {
    pool: Pool<Postgres>,
}

impl ItemsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &str) -> AppResult<Option<CatalogItem>> {
        let row = sqlx::query_as::<_, CatalogItemRow>(&format!("{} WHERE i.id = $1", ITEM_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CatalogItem::from))
    }

    async fn exists(&self, id: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM catalog_items WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Replace all category links of an item
    async fn sync_categories(
        tx: &mut Transaction<'_, Postgres>,
        item_id: &str,
        categories: &[String],
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM item_categories WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut **tx)
            .await?;

        let lowered: Vec<String> = categories.iter().map(|c| c.to_lowercase()).collect();
        sqlx::query(
            r#"
            INSERT INTO item_categories (item_id, category_id)
            SELECT $1, id FROM categories WHERE LOWER(name) = ANY($2)
            "#,
        )
        .bind(item_id)
        .bind(&lowered)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CatalogStore for ItemsRepository {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<CatalogItem>> {
        self.fetch(id).await
    }

    async fn search(&self, query: &ItemQuery) -> AppResult<(Vec<CatalogItem>, i64)> {
        let mut conditions = vec!["1=1".to_string()];
        let mut idx = 1;

        let term = query.like_pattern();
        if term.is_some() {
            conditions.push(format!(
                "(LOWER(i.title) LIKE ${i} ESCAPE '\\' OR LOWER(i.author) LIKE ${i} ESCAPE '\\' \
                 OR LOWER(COALESCE(i.publisher, '')) LIKE ${i} ESCAPE '\\')",
                i = idx
            ));
            idx += 1;
        }
        if query.category.is_some() {
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM item_categories ic JOIN categories c ON c.id = ic.category_id \
                 WHERE ic.item_id = i.id AND LOWER(c.name) = LOWER(${}))",
                idx
            ));
            idx += 1;
        }
        if query.media_type.is_some() {
            conditions.push(format!("i.media_type = ${}", idx));
            idx += 1;
        }
        if query.kind.is_some() {
            conditions.push(format!("i.kind = ${}", idx));
        }
        if query.available == Some(true) {
            conditions.push("i.available_copies > 0".to_string());
        }
        if !query.include_unlisted.unwrap_or(false) {
            conditions.push("i.is_available".to_string());
        }

        let where_clause = conditions.join(" AND ");

        let count_q = format!("SELECT COUNT(*) FROM catalog_items i WHERE {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_q);
        if let Some(ref t) = term { count_builder = count_builder.bind(t); }
        if let Some(ref c) = query.category { count_builder = count_builder.bind(c); }
        if let Some(m) = query.media_type { count_builder = count_builder.bind(m.as_str()); }
        if let Some(k) = query.kind { count_builder = count_builder.bind(k.as_str()); }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_q = format!(
            "{} WHERE {} ORDER BY i.title, i.id LIMIT {} OFFSET {}",
            ITEM_SELECT,
            where_clause,
            query.per_page(),
            query.offset()
        );
        let mut builder = sqlx::query_as::<_, CatalogItemRow>(&select_q);
        if let Some(ref t) = term { builder = builder.bind(t); }
        if let Some(ref c) = query.category { builder = builder.bind(c); }
        if let Some(m) = query.media_type { builder = builder.bind(m.as_str()); }
        if let Some(k) = query.kind { builder = builder.bind(k.as_str()); }

        let rows = builder.fetch_all(&self.pool).await?;
        Ok((rows.into_iter().map(CatalogItem::from).collect(), total))
    }

    async fn list_available(&self) -> AppResult<Vec<CatalogItem>> {
        let rows = sqlx::query_as::<_, CatalogItemRow>(&format!("{} WHERE i.is_available", ITEM_SELECT))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CatalogItem::from).collect())
    }

    async fn related(&self, item: &CatalogItem, limit: i64) -> AppResult<Vec<CatalogItem>> {
        let query = format!(
            r#"
            {}
            JOIN (
                SELECT ic.item_id, COUNT(*) AS shared
                FROM item_categories ic
                WHERE ic.item_id <> $1
                  AND ic.category_id IN (SELECT category_id FROM item_categories WHERE item_id = $1)
                GROUP BY ic.item_id
            ) s ON s.item_id = i.id
            WHERE i.is_available
            ORDER BY s.shared DESC, i.title, i.id
            LIMIT $2
            "#,
            ITEM_SELECT
        );
        let rows = sqlx::query_as::<_, CatalogItemRow>(&query)
            .bind(&item.id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CatalogItem::from).collect())
    }

    async fn suggest(&self, term: &str, limit: i64) -> AppResult<Vec<SearchSuggestion>> {
        let pattern = like_contains(term);

        let titles: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT id, title FROM catalog_items
            WHERE is_available AND LOWER(title) LIKE $1 ESCAPE '\'
            ORDER BY title, id
            LIMIT $2
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let authors: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT author FROM catalog_items
            WHERE is_available AND LOWER(author) LIKE $1 ESCAPE '\'
            ORDER BY author
            LIMIT $2
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let titles = titles.into_iter().map(|(id, title)| SearchSuggestion {
            kind: SuggestionKind::Title,
            value: title,
            item_id: Some(id),
        });
        let authors = authors.into_iter().map(|author| SearchSuggestion {
            kind: SuggestionKind::Author,
            value: author,
            item_id: None,
        });
        Ok(titles.chain(authors).collect())
    }

    async fn create(&self, item: &CatalogItem) -> AppResult<CatalogItem> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, title, author, description, publisher, media_type, kind,
                total_copies, available_copies, is_available, external_source,
                download_permission, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.author)
        .bind(&item.description)
        .bind(&item.publisher)
        .bind(item.media_type.as_str())
        .bind(item.kind.as_str())
        .bind(item.total_copies)
        .bind(item.available_copies)
        .bind(item.is_available)
        .bind(&item.external_source)
        .bind(item.download_permission.as_str())
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match violated_constraint(&e).as_deref() {
            Some("catalog_items_pkey") => AppError::Conflict(format!("Item {} already exists", item.id)),
            _ => AppError::Database(e),
        })?;

        Self::sync_categories(&mut tx, &item.id, &item.categories).await?;
        tx.commit().await?;

        self.fetch(&item.id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Item {} vanished after insert", item.id)))
    }

    async fn update(&self, item: &CatalogItem, copies_delta: i32) -> AppResult<CatalogItem> {
        let mut tx = self.pool.begin().await?;

        // Relative counter update so concurrent borrows are never overwritten
        let affected = sqlx::query(
            r#"
            UPDATE catalog_items
            SET title = $2, author = $3, description = $4, publisher = $5,
                is_available = $6, external_source = $7, download_permission = $8,
                total_copies = total_copies + $9,
                available_copies = available_copies + $9,
                updated_at = $10
            WHERE id = $1 AND available_copies + $9 >= 0
            "#,
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.author)
        .bind(&item.description)
        .bind(&item.publisher)
        .bind(item.is_available)
        .bind(&item.external_source)
        .bind(item.download_permission.as_str())
        .bind(copies_delta)
        .bind(item.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            drop(tx);
            return if self.exists(&item.id).await? {
                Err(AppError::DomainViolation(
                    "Cannot remove copies that are currently on loan".to_string(),
                ))
            } else {
                Err(AppError::NotFound(format!("Item {} not found", item.id)))
            };
        }

        Self::sync_categories(&mut tx, &item.id, &item.categories).await?;
        tx.commit().await?;

        self.fetch(&item.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", item.id)))
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let affected = sqlx::query(
            r#"
            DELETE FROM catalog_items i
            WHERE i.id = $1
              AND NOT EXISTS (SELECT 1 FROM loans l WHERE l.item_id = i.id AND NOT l.returned)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return if self.exists(id).await? {
                Err(AppError::DomainViolation(
                    "Item has active loans and cannot be deleted".to_string(),
                ))
            } else {
                Err(AppError::NotFound(format!("Item {} not found", id)))
            };
        }

        Ok(())
    }

    async fn counts(&self) -> AppResult<CatalogCounts> {
        let counts = sqlx::query_as::<_, CatalogCounts>(
            r#"
            SELECT COUNT(*) AS total_items,
                   COUNT(*) FILTER (WHERE media_type = 'book') AS books,
                   COUNT(*) FILTER (WHERE media_type = 'video') AS videos,
                   COUNT(*) FILTER (WHERE is_available) AS listed_items,
                   COALESCE(SUM(total_copies), 0)::bigint AS total_copies,
                   COALESCE(SUM(available_copies), 0)::bigint AS available_copies
            FROM catalog_items
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>("SELECT id, name, description FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    async fn create_category(&self, name: &str, description: &str) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, description) VALUES ($1, $2) RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match violated_constraint(&e).as_deref() {
            Some("categories_name_key") => AppError::Conflict(format!("Category '{}' already exists", name)),
            _ => AppError::Database(e),
        })
    }

    async fn delete_category(&self, id: i32) -> AppResult<()> {
        let affected = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound(format!("Category {} not found", id)));
        }
        Ok(())
    }
}
