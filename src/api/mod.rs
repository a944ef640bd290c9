//! API handlers for Libris REST endpoints

pub mod auth;
pub mod categories;
pub mod featured;
pub mod health;
pub mod inquiries;
pub mod items;
pub mod loans;
pub mod openapi;
pub mod stats;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::UserClaims, AppState};

fn bearer_claims(parts: &Parts, state: &AppState) -> Option<Result<UserClaims, AppError>> {
    let auth_header = parts.headers.get(AUTHORIZATION)?;

    let claims = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))
        .and_then(|token| {
            UserClaims::from_token(token, &state.config.auth.jwt_secret)
                .map_err(|e| AppError::Authentication(e.to_string()))
        });

    Some(claims)
}

/// Re-read the account behind a token: deleted accounts are rejected and
/// the stored role replaces the one baked into the token.
async fn current_claims(mut claims: UserClaims, state: &AppState) -> Result<UserClaims, AppError> {
    let user = match state.services.users.get_by_id(claims.user_id).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => {
            return Err(AppError::Authentication("Account no longer exists".to_string()))
        }
        Err(e) => return Err(e),
    };
    claims.role = user.role;
    Ok(claims)
}

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state)
            .unwrap_or_else(|| Err(AppError::Authentication("Missing authorization header".to_string())))?;
        Ok(AuthenticatedUser(current_claims(claims, state).await?))
    }
}

/// Like [`AuthenticatedUser`], but anonymous callers are let through.
/// A token that is present but invalid is still rejected.
pub struct MaybeUser(pub Option<UserClaims>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_claims(parts, state).transpose()? {
            Some(claims) => Ok(MaybeUser(Some(current_claims(claims, state).await?))),
            None => Ok(MaybeUser(None)),
        }
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/profile", get(auth::get_profile).put(auth::update_profile))
        .route("/auth/change-password", post(auth::change_password))
        // Catalog
        .route("/items", get(items::list_items))
        .route("/items/:id", get(items::get_item))
        .route("/items/:id/download", get(items::download_item))
        .route("/items/:id/related", get(items::related_items))
        .route("/search/suggestions", get(items::search_suggestions))
        .route("/items/:id/borrow", post(loans::borrow_item))
        .route("/items/:id/return", post(loans::return_item))
        .route("/categories", get(categories::list_categories))
        .route("/featured", get(featured::get_featured))
        // Own loans
        .route("/loans/me", get(loans::my_loans))
        .route("/loans/me/history", get(loans::my_history))
        // Contact form
        .route("/contact", post(inquiries::submit_inquiry))
        // Statistics
        .route("/stats", get(stats::get_stats))
        // Administration
        .route("/admin/items", post(items::create_item))
        .route("/admin/items/:id", put(items::update_item).delete(items::delete_item))
        .route("/admin/items/:id/loans/:loan_id/return", post(loans::admin_return))
        .route("/admin/categories", post(categories::create_category))
        .route("/admin/categories/:id", delete(categories::delete_category))
        .route("/admin/featured/refresh", post(featured::refresh_featured))
        .route("/admin/loans/active", get(loans::active_loans))
        .route("/admin/loans/overdue", get(loans::overdue_loans))
        .route("/admin/inquiries", get(inquiries::list_inquiries))
        .route("/admin/users", get(users::list_users))
        .route("/admin/users/:id/role", put(users::update_role))
        .route("/admin/users/:id", delete(users::delete_user))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
