//! Item (catalog) endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::item::{
        CreateItem, DownloadLink, ItemDetails, ItemQuery, SearchSuggestion, SuggestionQuery, UpdateItem,
    },
};

use super::{AuthenticatedUser, MaybeUser};

/// One page of search results
#[derive(Serialize, ToSchema)]
pub struct ItemPage {
    pub items: Vec<ItemDetails>,
    /// Total number of matching items
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Search the catalog
#[utoipa::path(
    get,
    path = "/items",
    tag = "items",
    params(ItemQuery),
    responses(
        (status = 200, description = "Matching items", body = ItemPage)
    )
)]
pub async fn list_items(
    State(state): State<crate::AppState>,
    MaybeUser(claims): MaybeUser,
    Query(mut query): Query<ItemQuery>,
) -> AppResult<Json<ItemPage>> {
    // Unlisted items stay hidden from everyone but administrators
    if !claims.as_ref().is_some_and(|c| c.is_admin()) {
        query.include_unlisted = None;
    }

    let (items, total) = state.services.catalog.search_items(&query).await?;

    Ok(Json(ItemPage {
        items: items.into_iter().map(ItemDetails::from).collect(),
        total,
        page: query.page(),
        per_page: query.per_page(),
    }))
}

/// Get item details by ID
#[utoipa::path(
    get,
    path = "/items/{id}",
    tag = "items",
    params(("id" = String, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item details", body = ItemDetails),
        (status = 404, description = "Item not found")
    )
)]
pub async fn get_item(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ItemDetails>> {
    let item = state.services.catalog.get_item(&id).await?;
    Ok(Json(item.into()))
}

/// Items sharing categories with the given one
#[utoipa::path(
    get,
    path = "/items/{id}/related",
    tag = "items",
    params(("id" = String, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Up to four related items", body = Vec<ItemDetails>),
        (status = 404, description = "Item not found")
    )
)]
pub async fn related_items(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<ItemDetails>>> {
    let items = state.services.catalog.related_items(&id).await?;
    Ok(Json(items.into_iter().map(ItemDetails::from).collect()))
}

/// Type-ahead suggestions for the search box
#[utoipa::path(
    get,
    path = "/search/suggestions",
    tag = "items",
    params(SuggestionQuery),
    responses(
        (status = 200, description = "Matching titles and authors", body = Vec<SearchSuggestion>)
    )
)]
pub async fn search_suggestions(
    State(state): State<crate::AppState>,
    Query(query): Query<SuggestionQuery>,
) -> AppResult<Json<Vec<SearchSuggestion>>> {
    let suggestions = state
        .services
        .catalog
        .suggestions(query.q.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(suggestions))
}

/// Get the download link of a digital item
#[utoipa::path(
    get,
    path = "/items/{id}/download",
    tag = "items",
    params(("id" = String, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Download link", body = DownloadLink),
        (status = 401, description = "Sign-in required"),
        (status = 403, description = "Downloads disabled"),
        (status = 404, description = "Item or resource not found")
    )
)]
pub async fn download_item(
    State(state): State<crate::AppState>,
    MaybeUser(claims): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<DownloadLink>> {
    let link = state
        .services
        .catalog
        .download_link(&id, claims.is_some())
        .await?;
    Ok(Json(link))
}

/// Create a new item
#[utoipa::path(
    post,
    path = "/admin/items",
    tag = "items",
    security(("bearer_auth" = [])),
    request_body = CreateItem,
    responses(
        (status = 201, description = "Item created", body = ItemDetails),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn create_item(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(item): Json<CreateItem>,
) -> AppResult<(StatusCode, Json<ItemDetails>)> {
    claims.require_admin()?;

    let created = state.services.catalog.create_item(item).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Update an existing item
#[utoipa::path(
    put,
    path = "/admin/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Item ID")),
    request_body = UpdateItem,
    responses(
        (status = 200, description = "Item updated", body = ItemDetails),
        (status = 400, description = "Invalid input or copies on loan"),
        (status = 404, description = "Item not found")
    )
)]
pub async fn update_item(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
    Json(update): Json<UpdateItem>,
) -> AppResult<Json<ItemDetails>> {
    claims.require_admin()?;

    let updated = state.services.catalog.update_item(&id, update).await?;
    Ok(Json(updated.into()))
}

/// Delete an item
#[utoipa::path(
    delete,
    path = "/admin/items/{id}",
    tag = "items",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Item ID")),
    responses(
        (status = 204, description = "Item deleted"),
        (status = 400, description = "Item has active loans"),
        (status = 404, description = "Item not found")
    )
)]
pub async fn delete_item(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.catalog.delete_item(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
