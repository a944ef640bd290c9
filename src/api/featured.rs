//! Featured set endpoints

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;

use crate::{error::AppResult, models::featured::FeaturedSetView};

use super::AuthenticatedUser;

/// Current featured items; an empty set when none could be produced
#[utoipa::path(
    get,
    path = "/featured",
    tag = "featured",
    responses(
        (status = 200, description = "Current featured set", body = FeaturedSetView)
    )
)]
pub async fn get_featured(State(state): State<crate::AppState>) -> Json<FeaturedSetView> {
    Json(state.services.featured.get_current().await)
}

/// Draw a new featured set right away
#[utoipa::path(
    post,
    path = "/admin/featured/refresh",
    tag = "featured",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "New featured set", body = FeaturedSetView),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn refresh_featured(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<(StatusCode, Json<FeaturedSetView>)> {
    claims.require_admin()?;

    let set = state.services.featured.create_set().await?;
    Ok((StatusCode::CREATED, Json(FeaturedSetView::from_set(set, Utc::now()))))
}
