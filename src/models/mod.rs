//! Data models for Libris

pub mod category;
pub mod featured;
pub mod inquiry;
pub mod item;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use category::Category;
pub use featured::{FeaturedSet, FeaturedSetView, NewFeaturedSet};
pub use inquiry::{CreateInquiry, Inquiry};
pub use item::{CatalogItem, DownloadPermission, ItemDetails, ItemKind, MediaType};
pub use loan::{LoanDetails, LoanRecord, OpenLoanOutcome};
pub use user::{Role, User, UserClaims};
