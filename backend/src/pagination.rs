//! Pagination and sorting helpers for list endpoints
//!
//! Lists accept either `skip`/`limit` or `page`/`size`. When both styles are
//! present the page form wins.

use serde::{Deserialize, Serialize};

/// Default page size if not specified
pub const DEFAULT_LIMIT: i64 = 100;
/// Maximum allowed page size
pub const MAX_LIMIT: i64 = 1000;

/// Standard pagination query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    /// Rows to skip
    pub skip: Option<i64>,
    /// Rows to return
    pub limit: Option<i64>,
    /// Page number (1-indexed)
    pub page: Option<i64>,
    /// Rows per page
    pub size: Option<i64>,
    /// Sort field
    pub sort_by: Option<String>,
    /// Sort direction (asc/desc)
    pub sort_order: Option<String>,
}

impl PaginationParams {
    /// Get SQL LIMIT value
    pub fn limit(&self) -> i64 {
        self.size
            .or(self.limit)
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT)
    }

    /// Get SQL OFFSET value
    pub fn offset(&self) -> i64 {
        match self.page {
            Some(page) => (page.max(1) - 1).saturating_mul(self.limit()),
            None => self.skip.unwrap_or(0).max(0),
        }
    }

    /// Current page (1-indexed), derived from the offset when `skip` was used
    pub fn page(&self) -> i64 {
        self.offset() / self.limit() + 1
    }

    /// Get sort direction as SQL string
    pub fn sort_direction(&self) -> &'static str {
        match self.sort_order.as_deref() {
            Some(order) if order.eq_ignore_ascii_case("desc") => "DESC",
            _ => "ASC",
        }
    }

    /// Validate and sanitize sort field against allowed fields
    pub fn validated_sort_field<'a>(&self, allowed: &[&'a str], default: &'a str) -> &'a str {
        self.sort_by
            .as_deref()
            .and_then(|s| allowed.iter().copied().find(|field| *field == s))
            .unwrap_or(default)
    }

    /// `ORDER BY` body built only from whitelisted identifiers
    pub fn order_clause(&self, allowed: &[&str], default: &str) -> String {
        format!(
            "{} {}",
            self.validated_sort_field(allowed, default),
            self.sort_direction()
        )
    }
}

/// Pagination metadata returned with list responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    /// Total number of live rows
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
    /// Current page (1-indexed)
    pub page: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Whether there's a next page
    pub has_next: bool,
    /// Whether there's a previous page
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(skip: i64, limit: i64, total: i64) -> Self {
        let total_pages = total.saturating_add(limit - 1) / limit;
        Self {
            total,
            skip,
            limit,
            page: skip / limit + 1,
            total_pages,
            has_next: skip.saturating_add(limit) < total,
            has_prev: skip > 0,
        }
    }
}

/// Standard paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// The actual data items
    pub data: Vec<T>,
    /// Pagination metadata
    pub meta: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        Self {
            data,
            meta: PaginationMeta::new(params.offset(), params.limit(), total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResponse<U> {
        PaginatedResponse {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}
