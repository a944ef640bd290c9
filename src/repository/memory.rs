//! Process-local store used by the `memory` backend and by tests.
//!
//! Every operation takes the single state lock for its whole duration, which
//! gives the same all-or-nothing behaviour the PostgreSQL adapters get from
//! transactions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::{AppError, AppResult},
    models::{
        category::Category,
        featured::{FeaturedSet, NewFeaturedSet},
        inquiry::{CreateInquiry, Inquiry},
        item::{
            CatalogCounts, CatalogItem, ItemKind, ItemQuery, MediaType, SearchSuggestion, SuggestionKind,
        },
        loan::{LoanDetails, LoanRecord, OpenLoanOutcome},
        user::{NewUser, User},
    },
};

use super::{CatalogStore, FeaturedStore, InquiriesStore, LedgerStore, UsersStore};

#[derive(Debug, Clone)]
struct StoredFeaturedSet {
    id: i32,
    item_ids: Vec<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    items: BTreeMap<String, CatalogItem>,
    categories: BTreeMap<i32, Category>,
    loans: BTreeMap<i32, LoanRecord>,
    users: BTreeMap<i32, User>,
    featured: Vec<StoredFeaturedSet>,
    inquiries: Vec<Inquiry>,
    next_category_id: i32,
    next_loan_id: i32,
    next_user_id: i32,
    next_featured_id: i32,
    next_inquiry_id: i32,
}

impl MemoryState {
    /// Keep only names of existing categories, spelled as stored, sorted
    fn resolve_categories(&self, names: &[String]) -> Vec<String> {
        let mut resolved: Vec<String> = self
            .categories
            .values()
            .filter(|c| names.iter().any(|n| n.eq_ignore_ascii_case(&c.name)))
            .map(|c| c.name.clone())
            .collect();
        resolved.sort();
        resolved
    }

    fn has_open_loan(&self, user_id: i32, item_id: &str) -> bool {
        self.loans
            .values()
            .any(|l| l.is_open() && l.user_id == user_id && l.item_id == item_id)
    }

    fn details(&self, loan: &LoanRecord, now: DateTime<Utc>) -> Option<LoanDetails> {
        let item = self.items.get(&loan.item_id)?;
        Some(LoanDetails {
            loan: loan.clone(),
            item_title: item.title.clone(),
            user_email: self.users.get(&loan.user_id).map(|u| u.email.clone()),
            is_overdue: loan.is_overdue(now),
        })
    }

    /// Newest first, matching the SQL listings
    fn list_details(&self, filter: impl Fn(&LoanRecord) -> bool) -> Vec<LoanDetails> {
        let now = Utc::now();
        let mut loans: Vec<LoanDetails> = self
            .loans
            .values()
            .filter(|l| filter(l))
            .filter_map(|l| self.details(l, now))
            .collect();
        loans.sort_by(|a, b| {
            b.loan
                .borrowed_at
                .cmp(&a.loan.borrowed_at)
                .then(b.loan.id.cmp(&a.loan.id))
        });
        loans
    }

    fn current_featured(&self, now: DateTime<Utc>) -> Option<FeaturedSet> {
        self.featured
            .iter()
            .filter(|s| s.expires_at > now)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .map(|s| self.materialize(s))
    }

    fn materialize(&self, stored: &StoredFeaturedSet) -> FeaturedSet {
        FeaturedSet {
            id: stored.id,
            items: stored
                .item_ids
                .iter()
                .filter_map(|id| self.items.get(id).cloned())
                .collect(),
            created_at: stored.created_at,
            expires_at: stored.expires_at,
        }
    }

    fn insert_featured(&mut self, set: &NewFeaturedSet) -> FeaturedSet {
        self.next_featured_id += 1;
        let stored = StoredFeaturedSet {
            id: self.next_featured_id,
            item_ids: set
                .item_ids
                .iter()
                .filter(|id| self.items.contains_key(*id))
                .cloned()
                .collect(),
            created_at: set.created_at,
            expires_at: set.expires_at,
        };
        let created = self.materialize(&stored);
        self.featured.push(stored);
        created
    }

    fn email_taken(&self, email: &str, except: Option<i32>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }
}

/// In-memory implementation of every store port
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get(&self, id: &str) -> AppResult<Option<CatalogItem>> {
        Ok(self.state.lock().await.items.get(id).cloned())
    }

    async fn search(&self, query: &ItemQuery) -> AppResult<(Vec<CatalogItem>, i64)> {
        let state = self.state.lock().await;
        let mut hits: Vec<&CatalogItem> = state.items.values().filter(|i| query.matches(i)).collect();
        hits.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        let total = hits.len() as i64;
        let page = hits
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.per_page() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn list_available(&self) -> AppResult<Vec<CatalogItem>> {
        let state = self.state.lock().await;
        Ok(state.items.values().filter(|i| i.is_available).cloned().collect())
    }

    async fn create(&self, item: &CatalogItem) -> AppResult<CatalogItem> {
        let mut state = self.state.lock().await;
        if state.items.contains_key(&item.id) {
            return Err(AppError::Conflict(format!("Item {} already exists", item.id)));
        }
        let mut stored = item.clone();
        stored.categories = state.resolve_categories(&item.categories);
        state.items.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update(&self, item: &CatalogItem, copies_delta: i32) -> AppResult<CatalogItem> {
        let mut state = self.state.lock().await;
        let categories = state.resolve_categories(&item.categories);
        let stored = state
            .items
            .get_mut(&item.id)
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", item.id)))?;

        if stored.available_copies + copies_delta < 0 {
            return Err(AppError::DomainViolation(
                "Cannot remove copies that are currently on loan".to_string(),
            ));
        }

        stored.title = item.title.clone();
        stored.author = item.author.clone();
        stored.description = item.description.clone();
        stored.publisher = item.publisher.clone();
        stored.is_available = item.is_available;
        stored.external_source = item.external_source.clone();
        stored.download_permission = item.download_permission;
        stored.total_copies += copies_delta;
        stored.available_copies += copies_delta;
        stored.categories = categories;
        stored.updated_at = item.updated_at;
        Ok(stored.clone())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.items.contains_key(id) {
            return Err(AppError::NotFound(format!("Item {} not found", id)));
        }
        if state.loans.values().any(|l| l.is_open() && l.item_id == id) {
            return Err(AppError::DomainViolation(
                "Item has active loans and cannot be deleted".to_string(),
            ));
        }
        state.items.remove(id);
        state.loans.retain(|_, l| l.item_id != id);
        for set in state.featured.iter_mut() {
            set.item_ids.retain(|i| i != id);
        }
        Ok(())
    }

    async fn related(&self, item: &CatalogItem, limit: i64) -> AppResult<Vec<CatalogItem>> {
        let state = self.state.lock().await;
        let shared_with = |other: &CatalogItem| {
            other
                .categories
                .iter()
                .filter(|c| item.categories.contains(c))
                .count()
        };

        let mut related: Vec<(usize, &CatalogItem)> = state
            .items
            .values()
            .filter(|other| other.id != item.id && other.is_available)
            .map(|other| (shared_with(other), other))
            .filter(|(shared, _)| *shared > 0)
            .collect();
        related.sort_by(|(a_shared, a), (b_shared, b)| {
            b_shared
                .cmp(a_shared)
                .then(a.title.cmp(&b.title))
                .then(a.id.cmp(&b.id))
        });

        Ok(related
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, other)| other.clone())
            .collect())
    }

    async fn suggest(&self, term: &str, limit: i64) -> AppResult<Vec<SearchSuggestion>> {
        let state = self.state.lock().await;
        let limit = limit.max(0) as usize;
        let listed = || state.items.values().filter(|i| i.is_available);

        let mut titles: Vec<&CatalogItem> = listed()
            .filter(|i| i.title.to_lowercase().contains(term))
            .collect();
        titles.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        let mut authors: Vec<&str> = listed()
            .map(|i| i.author.as_str())
            .filter(|a| a.to_lowercase().contains(term))
            .collect();
        authors.sort_unstable();
        authors.dedup();

        let titles = titles.into_iter().take(limit).map(|i| SearchSuggestion {
            kind: SuggestionKind::Title,
            value: i.title.clone(),
            item_id: Some(i.id.clone()),
        });
        let authors = authors.into_iter().take(limit).map(|a| SearchSuggestion {
            kind: SuggestionKind::Author,
            value: a.to_string(),
            item_id: None,
        });
        Ok(titles.chain(authors).collect())
    }

    async fn counts(&self) -> AppResult<CatalogCounts> {
        let state = self.state.lock().await;
        let mut counts = CatalogCounts::default();
        for item in state.items.values() {
            counts.total_items += 1;
            match item.media_type {
                MediaType::Book => counts.books += 1,
                MediaType::Video => counts.videos += 1,
            }
            if item.is_available {
                counts.listed_items += 1;
            }
            counts.total_copies += i64::from(item.total_copies);
            counts.available_copies += i64::from(item.available_copies);
        }
        Ok(counts)
    }

    async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let state = self.state.lock().await;
        let mut categories: Vec<Category> = state.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn create_category(&self, name: &str, description: &str) -> AppResult<Category> {
        let mut state = self.state.lock().await;
        if state.categories.values().any(|c| c.name.eq_ignore_ascii_case(name)) {
            return Err(AppError::Conflict(format!("Category '{}' already exists", name)));
        }
        state.next_category_id += 1;
        let category = Category {
            id: state.next_category_id,
            name: name.to_string(),
            description: description.to_string(),
        };
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn delete_category(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let removed = state
            .categories
            .remove(&id)
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))?;
        for item in state.items.values_mut() {
            item.categories.retain(|c| c != &removed.name);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<LoanRecord>> {
        Ok(self.state.lock().await.loans.get(&id).cloned())
    }

    async fn find_open(&self, user_id: i32, item_id: &str) -> AppResult<Option<LoanRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .loans
            .values()
            .find(|l| l.is_open() && l.user_id == user_id && l.item_id == item_id)
            .cloned())
    }

    async fn open_loan(
        &self,
        user_id: i32,
        item_id: &str,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
    ) -> AppResult<OpenLoanOutcome> {
        let mut state = self.state.lock().await;

        if state.has_open_loan(user_id, item_id) {
            return Ok(OpenLoanOutcome::AlreadyBorrowed);
        }

        match state.items.get_mut(item_id) {
            None => return Ok(OpenLoanOutcome::ItemMissing),
            Some(item) if item.kind != ItemKind::Physical || item.available_copies <= 0 => {
                return Ok(OpenLoanOutcome::NoCopies);
            }
            Some(item) => item.available_copies -= 1,
        }

        state.next_loan_id += 1;
        let loan = LoanRecord {
            id: state.next_loan_id,
            user_id,
            item_id: item_id.to_string(),
            borrowed_at,
            due_at,
            returned_at: None,
            returned: false,
        };
        state.loans.insert(loan.id, loan.clone());
        Ok(OpenLoanOutcome::Opened(loan))
    }

    async fn close_loan(&self, loan_id: i32, returned_at: DateTime<Utc>) -> AppResult<Option<LoanRecord>> {
        let mut state = self.state.lock().await;

        let loan = match state.loans.get_mut(&loan_id) {
            Some(loan) if loan.is_open() => {
                loan.returned = true;
                loan.returned_at = Some(returned_at);
                loan.clone()
            }
            _ => return Ok(None),
        };

        if let Some(item) = state.items.get_mut(&loan.item_id) {
            item.available_copies += 1;
        }
        Ok(Some(loan))
    }

    async fn list_for_user(&self, user_id: i32, include_returned: bool) -> AppResult<Vec<LoanDetails>> {
        let state = self.state.lock().await;
        Ok(state.list_details(|l| l.user_id == user_id && (include_returned || l.is_open())))
    }

    async fn list_open(&self) -> AppResult<Vec<LoanDetails>> {
        Ok(self.state.lock().await.list_details(LoanRecord::is_open))
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanDetails>> {
        Ok(self.state.lock().await.list_details(|l| l.is_overdue(now)))
    }

    async fn count_open(&self) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.loans.values().filter(|l| l.is_open()).count() as i64)
    }

    async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.loans.values().filter(|l| l.is_overdue(now)).count() as i64)
    }
}

#[async_trait]
impl FeaturedStore for MemoryStore {
    async fn current(&self, now: DateTime<Utc>) -> AppResult<Option<FeaturedSet>> {
        Ok(self.state.lock().await.current_featured(now))
    }

    async fn insert(&self, set: &NewFeaturedSet) -> AppResult<FeaturedSet> {
        Ok(self.state.lock().await.insert_featured(set))
    }

    async fn insert_unless_current(&self, set: &NewFeaturedSet) -> AppResult<FeaturedSet> {
        let mut state = self.state.lock().await;
        if let Some(current) = state.current_featured(set.created_at) {
            return Ok(current);
        }
        Ok(state.insert_featured(set))
    }
}

#[async_trait]
impl InquiriesStore for MemoryStore {
    async fn create(&self, inquiry: &CreateInquiry, created_at: DateTime<Utc>) -> AppResult<Inquiry> {
        let mut state = self.state.lock().await;
        state.next_inquiry_id += 1;
        let created = Inquiry {
            id: state.next_inquiry_id,
            name: inquiry.name.clone(),
            email: inquiry.email.clone(),
            subject: inquiry.subject.clone(),
            message: inquiry.message.clone(),
            created_at,
            is_resolved: false,
        };
        state.inquiries.push(created.clone());
        Ok(created)
    }

    async fn list(&self) -> AppResult<Vec<Inquiry>> {
        let state = self.state.lock().await;
        let mut inquiries = state.inquiries.clone();
        inquiries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(inquiries)
    }
}

#[async_trait]
impl UsersStore for MemoryStore {
    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.email_taken(&user.email, None) {
            return Err(AppError::Conflict(format!("Email {} is already registered", user.email)));
        }
        state.next_user_id += 1;
        let created = User {
            id: state.next_user_id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            password_hash: user.password_hash.clone(),
            created_at: Utc::now(),
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| {
            a.last_name
                .cmp(&b.last_name)
                .then(a.first_name.cmp(&b.first_name))
                .then(a.id.cmp(&b.id))
        });
        Ok(users)
    }

    async fn update(&self, user: &User) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.email_taken(&user.email, Some(user.id)) {
            return Err(AppError::Conflict(format!("Email {} is already registered", user.email)));
        }
        let stored = state
            .users
            .get_mut(&user.id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user.id)))?;
        stored.email = user.email.clone();
        stored.first_name = user.first_name.clone();
        stored.last_name = user.last_name.clone();
        stored.role = user.role;
        Ok(stored.clone())
    }

    async fn update_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        stored.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&id) {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        if state.loans.values().any(|l| l.is_open() && l.user_id == id) {
            return Err(AppError::DomainViolation(
                "User has active loans and cannot be deleted".to_string(),
            ));
        }
        state.users.remove(&id);
        state.loans.retain(|_, l| l.user_id != id);
        Ok(())
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.state.lock().await.users.len() as i64)
    }
}
