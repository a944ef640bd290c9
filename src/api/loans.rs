//! Borrow, return and loan listing endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::loan::{BorrowRequest, LoanDetails, LoanRecord},
};

use super::AuthenticatedUser;

/// Borrow one copy of an item
#[utoipa::path(
    post,
    path = "/items/{id}/borrow",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Item ID")),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Loan opened", body = LoanRecord),
        (status = 400, description = "Item cannot be borrowed"),
        (status = 404, description = "Item not found")
    )
)]
pub async fn borrow_item(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<LoanRecord>)> {
    let loan = state
        .services
        .loans
        .borrow(&id, claims.user_id, request.days)
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return own loan of an item
#[utoipa::path(
    post,
    path = "/items/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Loan closed", body = LoanRecord),
        (status = 400, description = "Nothing to return"),
        (status = 404, description = "Item not found")
    )
)]
pub async fn return_item(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<LoanRecord>> {
    let loan = state.services.loans.return_item(&id, claims.user_id).await?;
    Ok(Json(loan))
}

/// Close any loan of an item
#[utoipa::path(
    post,
    path = "/admin/items/{id}/loans/{loan_id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Item ID"),
        ("loan_id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan closed", body = LoanRecord),
        (status = 400, description = "Loan already returned"),
        (status = 404, description = "Item or loan not found")
    )
)]
pub async fn admin_return(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((id, loan_id)): Path<(String, i32)>,
) -> AppResult<Json<LoanRecord>> {
    claims.require_admin()?;

    let loan = state.services.loans.admin_return(&id, loan_id).await?;
    Ok(Json(loan))
}

/// Own open loans
#[utoipa::path(
    get,
    path = "/loans/me",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Open loans", body = Vec<LoanDetails>)
    )
)]
pub async fn my_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.user_loans(claims.user_id).await?;
    Ok(Json(loans))
}

/// Own loan history, returned loans included
#[utoipa::path(
    get,
    path = "/loans/me/history",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All loans", body = Vec<LoanDetails>)
    )
)]
pub async fn my_history(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.user_history(claims.user_id).await?;
    Ok(Json(loans))
}

/// All open loans
#[utoipa::path(
    get,
    path = "/admin/loans/active",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Open loans", body = Vec<LoanDetails>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn active_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_admin()?;

    let loans = state.services.loans.active_loans().await?;
    Ok(Json(loans))
}

/// Open loans past their due date
#[utoipa::path(
    get,
    path = "/admin/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = Vec<LoanDetails>),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn overdue_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    claims.require_admin()?;

    let loans = state.services.loans.overdue_loans().await?;
    Ok(Json(loans))
}
