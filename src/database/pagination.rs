use serde::Serialize;

use crate::constants::MAX_PAGE_SIZE;

use super::error::Error;

/// A validated `page`/`limit` pair. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Result<Self, Error> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);

        if page < 1 {
            return Err(Error::validation("Page must be a positive number"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(Error::Validation(format!(
                "Limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        // offset() and the next-page check must stay within i64
        if (page - 1)
            .checked_mul(limit)
            .and_then(|offset| offset.checked_add(limit))
            .is_none()
        {
            return Err(Error::validation("Page number is too large"));
        }

        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// Builds a page of `rows` out of `total_rows` matches. Links point at `path`.
    pub fn from_rows(rows: Vec<T>, total_rows: i64, request: PageRequest, path: &str) -> Self {
        let link = |page: i64| format!("{path}?page={page}&limit={}", request.limit);

        let next = if request.offset() + request.limit < total_rows {
            Some(link(request.page + 1))
        } else {
            None
        };
        let previous = if request.page > 1 {
            Some(link(request.page - 1))
        } else {
            None
        };

        Self {
            count: total_rows,
            next,
            previous,
            results: rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page_links_both_ways() {
        let request = PageRequest::new(Some(2), Some(6), 6).unwrap();
        let page = PageContext::from_rows(vec![1, 2, 3, 4, 5, 6], 20, request, "/api/recipes");

        assert_eq!(request.offset(), 6);
        assert_eq!(page.count, 20);
        assert_eq!(page.next.as_deref(), Some("/api/recipes?page=3&limit=6"));
        assert_eq!(page.previous.as_deref(), Some("/api/recipes?page=1&limit=6"));
    }

    #[test]
    fn last_page_has_no_next() {
        let request = PageRequest::new(Some(4), None, 6).unwrap();
        let page = PageContext::from_rows(vec![1, 2], 20, request, "/api/recipes");

        assert_eq!(page.next, None);
    }

    #[test]
    fn out_of_range_requests_are_rejected() {
        assert!(PageRequest::new(Some(0), None, 6).is_err());
        assert!(PageRequest::new(None, Some(0), 6).is_err());
        assert!(PageRequest::new(None, Some(MAX_PAGE_SIZE + 1), 6).is_err());
    }

    #[test]
    fn huge_page_numbers_are_rejected() {
        assert!(matches!(
            PageRequest::new(Some(i64::MAX), Some(6), 6),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            PageRequest::new(Some(i64::MAX / 6 + 2), Some(6), 6),
            Err(Error::Validation(_))
        ));

        let request = PageRequest::new(Some(i64::MAX / 6 - 1), Some(6), 6).unwrap();
        let page = PageContext::from_rows(Vec::<i32>::new(), 3, request, "/api/recipes");
        assert_eq!(page.next, None);
    }
}
