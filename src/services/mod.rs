//! Business logic services

pub mod catalog;
pub mod featured;
pub mod inquiries;
pub mod loans;
pub mod stats;
pub mod users;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LendingLedger,
    pub featured: Arc<featured::FeaturedRotator>,
    pub users: users::UsersService,
    pub stats: stats::StatsService,
    pub inquiries: inquiries::InquiriesService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let featured = Arc::new(featured::FeaturedRotator::new(
            repository.clone(),
            config.featured.clone(),
        ));

        Self {
            catalog: catalog::CatalogService::new(repository.clone()).with_hook(featured.clone()),
            loans: loans::LendingLedger::new(repository.clone(), config.lending.clone()),
            featured,
            users: users::UsersService::new(repository.clone(), config.auth.clone()),
            stats: stats::StatsService::new(repository.clone()),
            inquiries: inquiries::InquiriesService::new(repository),
        }
    }
}
