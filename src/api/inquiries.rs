//! Contact form endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::inquiry::{CreateInquiry, Inquiry},
};

use super::AuthenticatedUser;

/// Send a message to the library staff
#[utoipa::path(
    post,
    path = "/contact",
    tag = "inquiries",
    request_body = CreateInquiry,
    responses(
        (status = 201, description = "Inquiry received", body = Inquiry),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn submit_inquiry(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateInquiry>,
) -> AppResult<(StatusCode, Json<Inquiry>)> {
    let inquiry = state.services.inquiries.submit(request).await?;
    Ok((StatusCode::CREATED, Json(inquiry)))
}

/// List inquiries, newest first
#[utoipa::path(
    get,
    path = "/admin/inquiries",
    tag = "inquiries",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All inquiries", body = Vec<Inquiry>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_inquiries(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Inquiry>>> {
    claims.require_admin()?;

    let inquiries = state.services.inquiries.list().await?;
    Ok(Json(inquiries))
}
