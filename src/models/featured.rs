//! Featured set model

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::item::{CatalogItem, ItemDetails};

/// A time-boxed selection of promoted catalog items
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturedSet {
    pub id: i32,
    /// In selection order
    pub items: Vec<CatalogItem>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FeaturedSet {
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Featured set about to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeaturedSet {
    pub item_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Featured set as returned by the API; empty when no set could be produced
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeaturedSetView {
    pub id: Option<i32>,
    pub items: Vec<ItemDetails>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_current: bool,
}

impl FeaturedSetView {
    pub fn empty() -> Self {
        Self {
            id: None,
            items: Vec::new(),
            created_at: None,
            expires_at: None,
            is_current: false,
        }
    }

    pub fn from_set(set: FeaturedSet, now: DateTime<Utc>) -> Self {
        Self {
            id: Some(set.id),
            is_current: set.is_current(now),
            created_at: Some(set.created_at),
            expires_at: Some(set.expires_at),
            items: set.items.into_iter().map(ItemDetails::from).collect(),
        }
    }
}
