/// Posts requested per feed page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Range to fetch for one page: rows `offset ..= offset + limit - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_index: usize,
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    /// Inclusive index of the last row, as range-based stores expect it.
    pub fn range_end(&self) -> usize {
        self.offset + self.limit.saturating_sub(1)
    }
}

/// Infinite-scroll state: which page comes next and whether one is loading.
///
/// At most one fetch is in flight; a page shorter than `page_size` ends the
/// feed and no further fetch is issued until [`PageCursor::reset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    page_index: usize,
    page_size: usize,
    has_more: bool,
    in_flight: bool,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl PageCursor {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_index: 0,
            page_size: page_size.max(1),
            has_more: true,
            in_flight: false,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Claim the next page, or `None` if a fetch is running or the feed ended.
    pub fn advance(&mut self) -> Option<PageRequest> {
        if self.in_flight || !self.has_more {
            return None;
        }
        self.in_flight = true;
        Some(PageRequest {
            page_index: self.page_index,
            offset: self.page_index * self.page_size,
            limit: self.page_size,
        })
    }

    /// Record a successful fetch of `request` that returned `returned` rows.
    ///
    /// Results for a request other than the one in flight (the cursor was
    /// reset meanwhile) are refused and leave the cursor untouched.
    pub fn complete(&mut self, request: PageRequest, returned: usize) -> bool {
        if !self.owns(request) {
            tracing::debug!(page = request.page_index, "Ignoring completion for stale page request");
            return false;
        }
        self.in_flight = false;
        self.has_more = returned == self.page_size;
        self.page_index += 1;
        true
    }

    /// Record a failed fetch: the page index stays, so the same page is retried next.
    pub fn fail(&mut self, request: PageRequest) -> bool {
        if !self.owns(request) {
            return false;
        }
        self.in_flight = false;
        true
    }

    /// Start over at page 0 (refresh).
    pub fn reset(&mut self) {
        *self = Self::new(self.page_size);
    }

    fn owns(&self, request: PageRequest) -> bool {
        self.in_flight && request.page_index == self.page_index && request.limit == self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_first_advance_requests_page_zero() {
        let mut cursor = PageCursor::new(10);
        let request = cursor.advance().unwrap();
        assert_eq!(
            request,
            PageRequest {
                page_index: 0,
                offset: 0,
                limit: 10
            }
        );
        assert_eq!(request.range_end(), 9);
    }

    #[test]
    fn test_advance_while_in_flight_is_noop() {
        let mut cursor = PageCursor::new(10);
        assert!(cursor.advance().is_some());
        assert!(cursor.advance().is_none());
        assert!(cursor.is_in_flight());
    }

    #[test]
    fn test_full_then_short_page_ends_feed() {
        let mut cursor = PageCursor::new(10);

        let first = cursor.advance().unwrap();
        assert!(cursor.complete(first, 10));
        let second = cursor.advance().unwrap();
        assert_eq!(second.offset, 10);
        assert!(cursor.complete(second, 4));

        assert!(!cursor.has_more());
        assert!(cursor.advance().is_none());
    }

    #[test]
    fn test_empty_first_page_ends_feed() {
        let mut cursor = PageCursor::new(10);
        let request = cursor.advance().unwrap();
        cursor.complete(request, 0);
        assert!(!cursor.has_more());
        assert!(cursor.advance().is_none());
    }

    #[test]
    fn test_failure_retries_same_page() {
        let mut cursor = PageCursor::new(10);
        let first = cursor.advance().unwrap();
        assert!(cursor.fail(first));
        assert_eq!(cursor.advance(), Some(first));
    }

    #[test]
    fn test_stale_completion_after_reset_is_refused() {
        let mut cursor = PageCursor::new(10);
        let first = cursor.advance().unwrap();
        cursor.complete(first, 10);
        let stale = cursor.advance().unwrap();

        cursor.reset();
        let fresh = cursor.advance().unwrap();
        assert_eq!(fresh.page_index, 0);

        assert!(!cursor.complete(stale, 10));
        assert!(cursor.is_in_flight());
        assert!(cursor.complete(fresh, 10));
        assert_eq!(cursor.page_index(), 1);
    }

    proptest! {
        #[test]
        fn prop_at_most_one_request_outstanding(ops in proptest::collection::vec(0u8..3, 1..40)) {
            let mut cursor = PageCursor::new(3);
            let mut outstanding: Option<PageRequest> = None;

            for op in ops {
                match op {
                    0 => {
                        let request = cursor.advance();
                        if outstanding.is_some() {
                            prop_assert!(request.is_none());
                        } else if let Some(r) = request {
                            prop_assert_eq!(r.offset, r.page_index * 3);
                            outstanding = Some(r);
                        }
                    }
                    1 => {
                        if let Some(r) = outstanding.take() {
                            cursor.complete(r, 3);
                        }
                    }
                    _ => {
                        if let Some(r) = outstanding.take() {
                            cursor.fail(r);
                        }
                    }
                }
                prop_assert_eq!(cursor.is_in_flight(), outstanding.is_some());
            }
        }
    }
}
