/// One page request against an offset/count endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub count: usize,
}

/// One page returned by the remote side. `total` is whatever the remote
/// reported for the whole collection on this call, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<usize>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: Option<usize>) -> Self {
        Self { items, total }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: None,
        }
    }
}

/// Offset pagination state machine.
///
/// Traversal ends on the first of: an empty page, a short page (fewer items
/// than requested), cumulative items reaching the reported total, or the
/// optional hard `limit`. The remote total may drift while the collection
/// changes underneath, so a short page always wins over the total.
#[derive(Debug, Clone)]
pub struct Paginator {
    page_size: usize,
    limit: Option<usize>,
    offset: usize,
    fetched: usize,
    in_flight: Option<PageRequest>,
    done: bool,
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            limit: None,
            offset: 0,
            fetched: 0,
            in_flight: None,
            done: false,
        }
    }

    /// Caps the number of items the traversal will ever yield.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        if limit == Some(0) {
            self.done = true;
        }
        self
    }

    /// Resets to offset 0, keeping page size and limit.
    pub fn restart(&mut self) {
        self.offset = 0;
        self.fetched = 0;
        self.in_flight = None;
        self.done = self.limit == Some(0);
    }

    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The next page to fetch, or `None` once the traversal has ended.
    pub fn next_request(&mut self) -> Option<PageRequest> {
        if self.done {
            return None;
        }
        let mut count = self.page_size;
        if let Some(limit) = self.limit {
            count = count.min(limit.saturating_sub(self.fetched));
        }
        if count == 0 {
            self.done = true;
            return None;
        }
        let request = PageRequest {
            offset: self.offset,
            count,
        };
        self.in_flight = Some(request);
        Some(request)
    }

    /// Records a fetched page and returns the items to keep.
    ///
    /// Items beyond the requested count are dropped so the limit stays a hard cap.
    pub fn accept<T>(&mut self, page: Page<T>) -> Vec<T> {
        let Some(request) = self.in_flight.take() else {
            return Vec::new();
        };
        let mut items = page.items;
        let returned = items.len();
        items.truncate(request.count);

        self.fetched += items.len();
        self.offset += items.len();

        let reached_total = page.total.is_some_and(|total| self.fetched >= total);
        let reached_limit = self.limit.is_some_and(|limit| self.fetched >= limit);
        if returned == 0 || returned < request.count || reached_total || reached_limit {
            self.done = true;
        }
        items
    }
}

/// Lazy iterator over every item of a paginated collection.
///
/// Built from a fetch closure `(offset, count) -> Result<Page<T>, E>`; each
/// iterator is a fresh traversal from offset 0. A fetch error is yielded once
/// and ends the iteration.
pub struct PageIter<T, E, F>
where
    F: FnMut(usize, usize) -> Result<Page<T>, E>,
{
    paginator: Paginator,
    fetch: F,
    buffer: std::vec::IntoIter<T>,
    pages: usize,
    failed: bool,
}

impl<T, E, F> PageIter<T, E, F>
where
    F: FnMut(usize, usize) -> Result<Page<T>, E>,
{
    pub fn new(mut paginator: Paginator, fetch: F) -> Self {
        paginator.restart();
        Self {
            paginator,
            fetch,
            buffer: Vec::new().into_iter(),
            pages: 0,
            failed: false,
        }
    }

    /// Number of non-empty pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }
}

impl<T, E, F> Iterator for PageIter<T, E, F>
where
    F: FnMut(usize, usize) -> Result<Page<T>, E>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.next() {
                return Some(Ok(item));
            }
            if self.failed {
                return None;
            }
            let request = self.paginator.next_request()?;
            match (self.fetch)(request.offset, request.count) {
                Ok(page) => {
                    let items = self.paginator.accept(page);
                    if !items.is_empty() {
                        self.pages += 1;
                    }
                    self.buffer = items.into_iter();
                }
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_clamps_request_count() {
        let mut paginator = Paginator::new(100).with_limit(Some(30));
        let request = paginator.next_request().unwrap();
        assert_eq!(request, PageRequest { offset: 0, count: 30 });
        let kept = paginator.accept(Page::new((0..30).collect::<Vec<_>>(), Some(500)));
        assert_eq!(kept.len(), 30);
        assert!(paginator.is_done());
        assert_eq!(paginator.next_request(), None);
    }

    #[test]
    fn surplus_items_are_dropped() {
        let mut paginator = Paginator::new(10);
        paginator.next_request();
        let kept = paginator.accept(Page::new((0..15).collect::<Vec<_>>(), None));
        assert_eq!(kept.len(), 10);
        assert_eq!(paginator.fetched(), 10);
        assert!(!paginator.is_done());
    }

    #[test]
    fn reported_total_ends_traversal() {
        let mut paginator = Paginator::new(2);
        paginator.next_request();
        paginator.accept(Page::new(vec![1, 2], Some(2)));
        assert!(paginator.is_done());
    }

    #[test]
    fn accept_without_request_is_ignored() {
        let mut paginator = Paginator::new(2);
        assert!(paginator.accept(Page::new(vec![1, 2], None)).is_empty());
        assert_eq!(paginator.fetched(), 0);
    }

    #[test]
    fn zero_limit_never_requests() {
        let mut paginator = Paginator::new(5).with_limit(Some(0));
        assert_eq!(paginator.next_request(), None);
    }
}
