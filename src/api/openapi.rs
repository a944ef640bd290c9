//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, categories, featured, health, inquiries, items, loans, stats, users};

/// Registers the JWT bearer scheme referenced by protected paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "0.3.0",
        description = "Digital library REST API: catalog, lending and featured items",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::signup,
        auth::login,
        auth::get_profile,
        auth::update_profile,
        auth::change_password,
        // Items
        items::list_items,
        items::get_item,
        items::related_items,
        items::search_suggestions,
        items::download_item,
        items::create_item,
        items::update_item,
        items::delete_item,
        // Categories
        categories::list_categories,
        categories::create_category,
        categories::delete_category,
        // Loans
        loans::borrow_item,
        loans::return_item,
        loans::admin_return,
        loans::my_loans,
        loans::my_history,
        loans::active_loans,
        loans::overdue_loans,
        // Featured
        featured::get_featured,
        featured::refresh_featured,
        // Users
        users::list_users,
        users::update_role,
        users::delete_user,
        // Inquiries
        inquiries::submit_inquiry,
        inquiries::list_inquiries,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            // Items
            items::ItemPage,
            crate::models::item::CatalogItem,
            crate::models::item::ItemDetails,
            crate::models::item::CreateItem,
            crate::models::item::UpdateItem,
            crate::models::item::MediaType,
            crate::models::item::ItemKind,
            crate::models::item::DownloadPermission,
            crate::models::item::DownloadLink,
            crate::models::item::SearchSuggestion,
            crate::models::item::SuggestionKind,
            crate::models::category::Category,
            crate::models::category::CreateCategory,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::SignupRequest,
            crate::models::user::UpdateProfile,
            crate::models::user::ChangePassword,
            crate::models::user::UpdateRole,
            // Loans
            crate::models::loan::BorrowRequest,
            crate::models::loan::LoanRecord,
            crate::models::loan::LoanDetails,
            // Featured
            crate::models::featured::FeaturedSetView,
            // Inquiries
            crate::models::inquiry::Inquiry,
            crate::models::inquiry::CreateInquiry,
            // Stats
            crate::services::stats::LibraryStats,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Signup, login and own profile"),
        (name = "items", description = "Catalog items"),
        (name = "categories", description = "Catalog categories"),
        (name = "loans", description = "Borrowing and returns"),
        (name = "featured", description = "Featured items"),
        (name = "inquiries", description = "Contact form"),
        (name = "users", description = "User administration"),
        (name = "stats", description = "Statistics")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_lending_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/items/{id}/borrow"));
        assert!(doc.paths.paths.contains_key("/admin/items/{id}/loans/{loan_id}/return"));
        assert!(doc.paths.paths.contains_key("/contact"));
        assert!(doc.paths.paths.contains_key("/items/{id}/related"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
