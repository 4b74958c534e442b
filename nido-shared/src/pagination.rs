/// Uniform pagination types
///
/// Every list endpoint returns the same paged envelope so clients can share
/// one pagination component. Page numbers are 1-based.
///
/// # Example
///
/// ```
/// use nido_shared::pagination::{Page, PageRequest};
///
/// let request = PageRequest { page: Some(2), limit: Some(10) };
/// assert_eq!(request.offset(), 10);
///
/// let page: Page<i32> = Page::new(vec![1, 2, 3], 23, request.page(), request.limit());
/// assert_eq!(page.total_pages, 3);
/// assert!(page.has_next_page);
/// assert!(page.has_previous_page);
/// ```

use serde::{Deserialize, Serialize};

/// Default page size when the client does not supply one
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Upper bound on page size; larger requests are clamped
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Client-supplied pagination parameters
///
/// Both fields are optional; out-of-range values are clamped rather than
/// rejected so that a sloppy client still gets a sensible page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number
    pub page: Option<i64>,

    /// Items per page
    pub limit: Option<i64>,
}

impl PageRequest {
    /// Effective page number (>= 1)
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Effective page size, clamped to [1, MAX_PAGE_LIMIT]
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    /// SQL OFFSET for the effective page
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}

/// Paged response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items for the requested page
    pub data: Vec<T>,

    /// Total matching items across all pages
    pub total_count: i64,

    /// 1-based page number that was returned
    pub current_page: i64,

    /// Total number of pages for this result set
    pub total_pages: i64,

    /// Whether a later page exists
    pub has_next_page: bool,

    /// Whether an earlier page exists
    pub has_previous_page: bool,
}

impl<T> Page<T> {
    /// Builds a page envelope from a slice of results and the total count
    ///
    /// `total_pages` is zero when there are no results at all.
    pub fn new(data: Vec<T>, total_count: i64, current_page: i64, limit: i64) -> Self {
        let limit = limit.max(1);
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + limit - 1) / limit
        };

        Self {
            data,
            total_count,
            current_page,
            has_next_page: current_page < total_pages,
            has_previous_page: current_page > 1 && total_count > 0,
            total_pages,
        }
    }

    /// Maps the item type while keeping the envelope intact
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total_count: self.total_count,
            current_page: self.current_page,
            total_pages: self.total_pages,
            has_next_page: self.has_next_page,
            has_previous_page: self.has_previous_page,
        }
    }
}
