//! Catalog management service

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        category::{Category, CreateCategory},
        item::{
            CatalogItem, CreateItem, DownloadLink, DownloadPermission, ItemKind, ItemQuery, MediaType,
            SearchSuggestion, UpdateItem,
        },
    },
    repository::Repository,
};

/// Items returned by [`CatalogService::related_items`]
const RELATED_LIMIT: i64 = 4;
/// Suggestions of each kind returned by [`CatalogService::suggestions`]
const SUGGESTION_LIMIT: i64 = 5;
/// Shorter fragments get no suggestions
const SUGGESTION_MIN_CHARS: usize = 2;

/// Called after every successful item create or update.
///
/// Hooks cannot fail the write that triggered them; they handle their own
/// errors.
#[async_trait]
pub trait CatalogHook: Send + Sync {
    async fn item_saved(&self, item: &CatalogItem);
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    hooks: Vec<Arc<dyn CatalogHook>>,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            hooks: Vec::new(),
        }
    }

    /// Register a post-write hook
    pub fn with_hook(mut self, hook: Arc<dyn CatalogHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    async fn notify_saved(&self, item: &CatalogItem) {
        for hook in &self.hooks {
            hook.item_saved(item).await;
        }
    }

    /// Store connectivity check
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.catalog.ping().await
    }

    /// Search items with filters
    pub async fn search_items(&self, query: &ItemQuery) -> AppResult<(Vec<CatalogItem>, i64)> {
        self.repository.catalog.search(query).await
    }

    pub async fn get_item(&self, id: &str) -> AppResult<CatalogItem> {
        self.repository
            .catalog
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))
    }

    /// Listed items filed under the same categories, most overlap first
    pub async fn related_items(&self, id: &str) -> AppResult<Vec<CatalogItem>> {
        let item = self.get_item(id).await?;
        if item.categories.is_empty() {
            return Ok(Vec::new());
        }
        self.repository.catalog.related(&item, RELATED_LIMIT).await
    }

    /// Type-ahead titles and authors for a search fragment
    pub async fn suggestions(&self, fragment: &str) -> AppResult<Vec<SearchSuggestion>> {
        let term = fragment.trim().to_lowercase();
        if term.chars().count() < SUGGESTION_MIN_CHARS {
            return Ok(Vec::new());
        }
        self.repository.catalog.suggest(&term, SUGGESTION_LIMIT).await
    }

    /// Every requested category must exist
    async fn check_categories(&self, names: &[String]) -> AppResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        let known = self.repository.catalog.list_categories().await?;
        for name in names {
            if !known.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
                return Err(AppError::BadRequest(format!("Unknown category: {}", name)));
            }
        }
        Ok(())
    }

    pub async fn create_item(&self, request: CreateItem) -> AppResult<CatalogItem> {
        request.validate()?;
        self.check_categories(&request.categories).await?;

        let media_type = request.media_type.unwrap_or(MediaType::Book);
        let kind = request.kind.unwrap_or(match media_type {
            MediaType::Book => ItemKind::Physical,
            MediaType::Video => ItemKind::Digital,
        });

        if media_type == MediaType::Video && kind == ItemKind::Physical {
            return Err(AppError::BadRequest("Videos can only be catalogued as digital items".to_string()));
        }

        let copies = match kind {
            ItemKind::Physical => request.total_copies.unwrap_or(1),
            ItemKind::Digital if request.total_copies.unwrap_or(0) > 0 => {
                return Err(AppError::BadRequest("Digital items have no lendable copies".to_string()));
            }
            ItemKind::Digital => 0,
        };

        let now = Utc::now();
        let item = CatalogItem {
            id: CatalogItem::generate_id(media_type),
            title: request.title.trim().to_string(),
            author: request.author.trim().to_string(),
            description: request.description,
            publisher: request.publisher,
            media_type,
            kind,
            total_copies: copies,
            available_copies: copies,
            is_available: request.is_available.unwrap_or(true),
            categories: request.categories,
            external_source: request.external_source,
            download_permission: request.download_permission.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let created = self.repository.catalog.create(&item).await?;
        tracing::info!(item_id = %created.id, "Catalog item created: {}", created.title);

        self.notify_saved(&created).await;
        Ok(created)
    }

    /// Partial update; a new copy count shifts the available count by the same delta
    pub async fn update_item(&self, id: &str, update: UpdateItem) -> AppResult<CatalogItem> {
        update.validate()?;
        if let Some(ref categories) = update.categories {
            self.check_categories(categories).await?;
        }

        let mut item = self.get_item(id).await?;

        let copies_delta = match update.total_copies {
            Some(total) if item.kind == ItemKind::Digital && total != 0 => {
                return Err(AppError::BadRequest("Digital items have no lendable copies".to_string()));
            }
            Some(total) => total - item.total_copies,
            None => 0,
        };

        if let Some(title) = update.title {
            item.title = title.trim().to_string();
        }
        if let Some(author) = update.author {
            item.author = author.trim().to_string();
        }
        if let Some(description) = update.description {
            item.description = description;
        }
        if update.publisher.is_some() {
            item.publisher = update.publisher;
        }
        if let Some(is_available) = update.is_available {
            item.is_available = is_available;
        }
        if let Some(categories) = update.categories {
            item.categories = categories;
        }
        if update.external_source.is_some() {
            item.external_source = update.external_source;
        }
        if let Some(permission) = update.download_permission {
            item.download_permission = permission;
        }
        item.updated_at = Utc::now();

        let updated = self.repository.catalog.update(&item, copies_delta).await?;
        tracing::info!(item_id = %updated.id, copies_delta, "Catalog item updated");

        self.notify_saved(&updated).await;
        Ok(updated)
    }

    /// Delete an item; refused while copies are on loan
    pub async fn delete_item(&self, id: &str) -> AppResult<()> {
        self.repository.catalog.delete(id).await?;
        tracing::info!(item_id = %id, "Catalog item deleted");
        Ok(())
    }

    /// Link to the item's digital resource, if the caller may fetch it
    pub async fn download_link(&self, id: &str, authenticated: bool) -> AppResult<DownloadLink> {
        let item = self.get_item(id).await?;

        match item.download_permission {
            DownloadPermission::None => {
                return Err(AppError::Authorization("Downloads are disabled for this item".to_string()));
            }
            DownloadPermission::Authenticated if !authenticated => {
                return Err(AppError::Authentication("Sign in to download this item".to_string()));
            }
            _ => {}
        }

        let url = item
            .external_source
            .ok_or_else(|| AppError::NotFound(format!("Item {} has no downloadable resource", id)))?;

        Ok(DownloadLink { item_id: item.id, url })
    }

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.catalog.list_categories().await
    }

    pub async fn create_category(&self, request: CreateCategory) -> AppResult<Category> {
        request.validate()?;
        let category = self
            .repository
            .catalog
            .create_category(request.name.trim(), &request.description)
            .await?;
        tracing::info!(category_id = category.id, "Category created: {}", category.name);
        Ok(category)
    }

    pub async fn delete_category(&self, id: i32) -> AppResult<()> {
        self.repository.catalog.delete_category(id).await
    }
}
