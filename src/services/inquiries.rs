//! Contact-form inquiries

use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppResult,
    models::inquiry::{CreateInquiry, Inquiry},
    repository::Repository,
};

#[derive(Clone)]
pub struct InquiriesService {
    repository: Repository,
}

impl InquiriesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Record a contact-form submission
    pub async fn submit(&self, request: CreateInquiry) -> AppResult<Inquiry> {
        request.validate()?;
        let request = CreateInquiry {
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            subject: request.subject.trim().to_string(),
            message: request.message,
        };

        let inquiry = self.repository.inquiries.create(&request, Utc::now()).await?;
        tracing::info!(inquiry_id = inquiry.id, "Inquiry received: {}", inquiry.subject);
        Ok(inquiry)
    }

    /// All inquiries, newest first
    pub async fn list(&self) -> AppResult<Vec<Inquiry>> {
        self.repository.inquiries.list().await
    }
}
