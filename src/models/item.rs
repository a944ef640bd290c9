//! Catalog item model and related types.
//!
//! Books and videos share one record. Physical items carry copy counters that
//! the lending ledger moves; digital items are never lent and always report
//! zero copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Media type of a catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Book,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Book => "book",
            MediaType::Video => "video",
        }
    }

    /// Prefix of generated item identifiers
    pub fn id_prefix(&self) -> &'static str {
        match self {
            MediaType::Book => "BOOK",
            MediaType::Video => "VIDEO",
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "book" => Ok(MediaType::Book),
            "video" => Ok(MediaType::Video),
            _ => Err(format!("Invalid media type: {}", s)),
        }
    }
}

/// Whether an item exists as lendable copies or only as a digital resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Physical,
    Digital,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Physical => "physical",
            ItemKind::Digital => "digital",
        }
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "physical" => Ok(ItemKind::Physical),
            "digital" | "ebook" => Ok(ItemKind::Digital),
            _ => Err(format!("Invalid item kind: {}", s)),
        }
    }
}

/// Who may fetch the digital resource of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPermission {
    None,
    Authenticated,
    All,
}

impl DownloadPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadPermission::None => "none",
            DownloadPermission::Authenticated => "authenticated",
            DownloadPermission::All => "all",
        }
    }
}

impl Default for DownloadPermission {
    fn default() -> Self {
        DownloadPermission::None
    }
}

impl std::str::FromStr for DownloadPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(DownloadPermission::None),
            "authenticated" | "auth" => Ok(DownloadPermission::Authenticated),
            "all" => Ok(DownloadPermission::All),
            _ => Err(format!("Invalid download permission: {}", s)),
        }
    }
}

/// Catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CatalogItem {
    /// Opaque identifier, e.g. `BOOK-3F9A1C`
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub publisher: Option<String>,
    pub media_type: MediaType,
    pub kind: ItemKind,
    pub total_copies: i32,
    pub available_copies: i32,
    /// Listed in the public catalog
    pub is_available: bool,
    /// Category names
    pub categories: Vec<String>,
    /// Link to the resource when it is not hosted locally
    pub external_source: Option<String>,
    pub download_permission: DownloadPermission,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogItem {
    /// Generate an identifier such as `BOOK-3F9A1C`
    pub fn generate_id(media_type: MediaType) -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", media_type.id_prefix(), hex[..6].to_uppercase())
    }

    pub fn is_borrowable(&self) -> bool {
        self.kind == ItemKind::Physical
    }

    pub fn is_external(&self) -> bool {
        self.external_source.is_some()
    }

    pub fn available_status(&self) -> &'static str {
        if self.available_copies > 0 {
            "Available"
        } else {
            "Checked Out"
        }
    }
}

/// Item as returned by the API, with derived fields
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ItemDetails {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub is_external: bool,
    /// "Available" or "Checked Out"
    pub available_status: String,
}

impl From<CatalogItem> for ItemDetails {
    fn from(item: CatalogItem) -> Self {
        Self {
            is_external: item.is_external(),
            available_status: item.available_status().to_string(),
            item,
        }
    }
}

/// Internal row structure for database queries
#[derive(Debug, Clone, FromRow)]
pub struct CatalogItemRow {
    id: String,
    title: String,
    author: String,
    description: String,
    publisher: Option<String>,
    media_type: String,
    kind: String,
    total_copies: i32,
    available_copies: i32,
    is_available: bool,
    categories: Vec<String>,
    external_source: Option<String>,
    download_permission: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CatalogItemRow> for CatalogItem {
    fn from(row: CatalogItemRow) -> Self {
        CatalogItem {
            id: row.id,
            title: row.title,
            author: row.author,
            description: row.description,
            publisher: row.publisher,
            media_type: row.media_type.parse().unwrap_or(MediaType::Book),
            kind: row.kind.parse().unwrap_or(ItemKind::Physical),
            total_copies: row.total_copies,
            available_copies: row.available_copies,
            is_available: row.is_available,
            categories: row.categories,
            external_source: row.external_source,
            download_permission: row.download_permission.parse().unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Create item request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateItem {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Author must be 1-100 characters"))]
    pub author: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub publisher: Option<String>,
    /// Defaults to book
    pub media_type: Option<MediaType>,
    /// Defaults to physical for books and digital for videos
    pub kind: Option<ItemKind>,
    /// Physical items only, defaults to 1
    #[validate(range(min = 1, message = "A physical item needs at least one copy"))]
    pub total_copies: Option<i32>,
    pub is_available: Option<bool>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[validate(url(message = "External source must be a URL"))]
    pub external_source: Option<String>,
    pub download_permission: Option<DownloadPermission>,
}

/// Update item request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateItem {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Author must be 1-100 characters"))]
    pub author: Option<String>,
    #[validate(length(min = 1, message = "Description cannot be empty"))]
    pub description: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, message = "Copy count cannot be negative"))]
    pub total_copies: Option<i32>,
    pub is_available: Option<bool>,
    pub categories: Option<Vec<String>>,
    #[validate(url(message = "External source must be a URL"))]
    pub external_source: Option<String>,
    pub download_permission: Option<DownloadPermission>,
}

/// `LIKE` pattern matching `term` anywhere, with its wildcards escaped
pub fn like_contains(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Item search parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ItemQuery {
    /// Case-insensitive match on title, author or publisher
    pub q: Option<String>,
    /// Category name
    pub category: Option<String>,
    pub media_type: Option<MediaType>,
    pub kind: Option<ItemKind>,
    /// Only items with at least one copy on the shelf
    pub available: Option<bool>,
    /// Include unlisted items (administrators only)
    pub include_unlisted: Option<bool>,
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Items per page (default: 20, max: 100)
    pub per_page: Option<i64>,
}

/// Largest page whose offset still fits an `i64` at the maximum page size
const MAX_PAGE: i64 = i64::MAX / 100;

impl ItemQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).clamp(1, MAX_PAGE)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }

    /// Lowercased search term, None when blank
    pub fn term(&self) -> Option<String> {
        self.q
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }

    /// Search term as a `LIKE` pattern
    pub fn like_pattern(&self) -> Option<String> {
        self.term().as_deref().map(like_contains)
    }

    /// In-process equivalent of the SQL search predicate
    pub fn matches(&self, item: &CatalogItem) -> bool {
        if !self.include_unlisted.unwrap_or(false) && !item.is_available {
            return false;
        }
        if let Some(term) = self.term() {
            let hit = item.title.to_lowercase().contains(&term)
                || item.author.to_lowercase().contains(&term)
                || item
                    .publisher
                    .as_deref()
                    .map(|p| p.to_lowercase().contains(&term))
                    .unwrap_or(false);
            if !hit {
                return false;
            }
        }
        if let Some(ref category) = self.category {
            if !item.categories.iter().any(|c| c.eq_ignore_ascii_case(category)) {
                return false;
            }
        }
        if self.media_type.is_some_and(|m| m != item.media_type) {
            return false;
        }
        if self.kind.is_some_and(|k| k != item.kind) {
            return false;
        }
        if self.available == Some(true) && item.available_copies <= 0 {
            return false;
        }
        true
    }
}

/// What a search suggestion completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Title,
    Author,
}

/// Type-ahead entry for the search box
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SearchSuggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub value: String,
    /// Set for title suggestions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SuggestionQuery {
    /// Prefix or fragment typed so far
    pub q: Option<String>,
}

/// Catalog-wide counters for the stats endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema, FromRow)]
pub struct CatalogCounts {
    pub total_items: i64,
    pub books: i64,
    pub videos: i64,
    pub listed_items: i64,
    pub total_copies: i64,
    pub available_copies: i64,
}

/// Download link granted to the caller
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DownloadLink {
    pub item_id: String,
    pub url: String,
}
