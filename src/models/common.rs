// src/models/common.rs
// DOCUMENTATION: Pagination shared by every list endpoint

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Highest page whose offset still fits in an i64 at any page size
pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

/// Normalized page/limit pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
}

impl PageParams {
    /// Clamp raw query values: 1 <= page <= MAX_PAGE, 1 <= limit <= 100
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Paginated list response
/// DOCUMENTATION: Same envelope for every list endpoint
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    /// Array of results for the requested page
    pub data: Vec<T>,

    /// Total number of matches (regardless of pagination)
    pub total_count: i64,

    /// Current page number
    pub page: i64,

    /// Results per page
    pub limit: i64,

    /// Whether more results exist on next page
    pub has_more: bool,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total_count: i64, params: PageParams) -> Self {
        Self {
            data,
            total_count,
            page: params.page,
            limit: params.limit,
            has_more: total_count > params.page.saturating_mul(params.limit),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            limit: self.limit,
            has_more: self.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_clamping() {
        assert_eq!(PageParams::new(None, None), PageParams { page: 1, limit: 20 });
        assert_eq!(PageParams::new(Some(0), Some(500)), PageParams { page: 1, limit: 100 });
        assert_eq!(PageParams::new(Some(-3), Some(0)), PageParams { page: 1, limit: 1 });
        assert_eq!(PageParams::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn test_has_more() {
        let params = PageParams::new(Some(2), Some(10));
        assert!(Paginated::new(vec![1; 10], 21, params).has_more);
        assert!(!Paginated::new(vec![1; 10], 20, params).has_more);
    }

    #[test]
    fn test_huge_page_does_not_overflow() {
        let params = PageParams::new(Some(i64::MAX), Some(100));
        assert_eq!(params.page, MAX_PAGE);
        assert!(params.offset() > 0);

        let params = PageParams::new(Some(i64::MAX / 2), Some(100));
        let page = Paginated::new(Vec::<i32>::new(), 5, params);
        assert!(!page.has_more);
    }
}
