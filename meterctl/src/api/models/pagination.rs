//! Shared pagination types for API query parameters.
//!
//! List endpoints are paged with a 1-based `page` and a `page_size`, which are translated to the
//! offset/limit pair the repositories take.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Default number of items to return per page.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum number of items that can be requested per page.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page-based pagination parameters for admin list endpoints.
///
/// `page` starts at 1 and is raised to 1 if lower. `page_size` is clamped between 1 and 100.
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Page number, starting at 1 (default: 1)
    #[param(default = 1, minimum = 1)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page: Option<i64>,

    /// Items per page (default: 20, max: 100)
    #[param(default = 20, minimum = 1, maximum = 100)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page_size: Option<i64>,
}

impl Pagination {
    #[inline]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    #[inline]
    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// Offset and limit for the repository layer
    #[inline]
    pub fn params(&self) -> (i64, i64) {
        let page_size = self.page_size();
        ((self.page() - 1).saturating_mul(page_size), page_size)
    }
}

/// Generic paginated response wrapper for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T: ToSchema> {
    /// The items for the current page
    pub data: Vec<T>,
    /// Total number of items matching the query (before pagination)
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T: ToSchema> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            data,
            total,
            page: pagination.page(),
            page_size: pagination.page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let pagination = Pagination::default();
        assert_eq!(pagination.params(), (0, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn test_pagination_offsets_and_clamps() {
        let pagination = Pagination {
            page: Some(3),
            page_size: Some(10),
        };
        assert_eq!(pagination.params(), (20, 10));

        let pagination = Pagination {
            page: Some(0),
            page_size: Some(1000),
        };
        assert_eq!(pagination.params(), (0, MAX_PAGE_SIZE));

        let pagination = Pagination {
            page: Some(-4),
            page_size: Some(0),
        };
        assert_eq!(pagination.params(), (0, 1));
    }

    #[test]
    fn test_pagination_from_query_string() {
        let uri: axum::http::Uri = "/users?page=2&page_size=5".parse().unwrap();
        let pagination = axum::extract::Query::<Pagination>::try_from_uri(&uri).unwrap().0;
        assert_eq!(pagination.params(), (5, 5));
    }
}
