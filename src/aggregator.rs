use crate::fetcher::{Collection, PageFetcher, TransportError};
use crate::query::{SortOrder, WorksQuery, INITIAL_CURSOR, MAX_ROWS};
use crate::state::{FetchSnapshot, FetchState};
use crate::work::{Member, Page, Work};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::watch;

/// Page size used when walking a full listing
pub const PAGE_SIZE: u32 = MAX_ROWS;

/// Sort applied to full listings unless the caller picks one
pub const DEFAULT_SORT: &str = "published";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("another request is already in progress")]
    ConcurrentRequest,
    #[error("server returned an already used cursor: {0}")]
    StalledCursor(String),
}

#[derive(Debug, Clone, Default)]
pub struct AggregatorOptions {
    /// Upper bound on page requests per `fetch_all`; `None` for unbounded
    pub max_pages: Option<usize>,
}

/// Drives a [`PageFetcher`] across cursor-paginated listings and publishes
/// progress through a shared [`FetchState`].
///
/// One top-level request runs at a time per aggregator; a second call made
/// while one is in flight fails with [`FetchError::ConcurrentRequest`].
pub struct WorksAggregator<F> {
    fetcher: F,
    state: FetchState,
    in_flight: AtomicBool,
    options: AggregatorOptions,
}

/// Marks the aggregator busy for the lifetime of one top-level request
struct InFlight<'a> {
    flag: &'a AtomicBool,
    state: &'a FetchState,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("request dropped before completion");
            self.state.abandon();
        }
        self.flag.store(false, Ordering::Release);
    }
}

impl<F: PageFetcher> WorksAggregator<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_options(fetcher, AggregatorOptions::default())
    }

    pub fn with_options(fetcher: F, options: AggregatorOptions) -> Self {
        Self {
            fetcher,
            state: FetchState::new(),
            in_flight: AtomicBool::new(false),
            options,
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchSnapshot> {
        self.state.subscribe()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn acquire(&self) -> Result<InFlight<'_>, FetchError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("rejecting request: another one is still in flight");
            return Err(FetchError::ConcurrentRequest);
        }
        self.state.begin();
        Ok(InFlight {
            flag: &self.in_flight,
            state: &self.state,
            settled: false,
        })
    }

    fn fail<T>(&self, guard: InFlight<'_>, error: FetchError) -> Result<T, FetchError> {
        tracing::warn!("{} request failed: {}", self.fetcher.name(), error);
        self.state.fail(error.to_string());
        guard.settle();
        Err(error)
    }

    /// Fetch one page exactly as described by `query`
    pub async fn fetch_single_page(
        &self,
        collection: &Collection,
        query: &WorksQuery,
    ) -> Result<Page, FetchError> {
        let guard = self.acquire()?;

        match self.fetcher.fetch_page(collection, query).await {
            Ok(page) => {
                self.state.succeed(page.items.clone());
                guard.settle();
                Ok(page)
            }
            Err(e) => self.fail(guard, e.into()),
        }
    }

    /// Look up a member record
    pub async fn fetch_member(&self, member_id: &str) -> Result<Member, FetchError> {
        let guard = self.acquire()?;

        match self.fetcher.fetch_member(member_id).await {
            Ok(member) => {
                self.state.succeed(Vec::new());
                guard.settle();
                Ok(member)
            }
            Err(e) => self.fail(guard, e.into()),
        }
    }

    /// Fetch every work in `collection`, newest first, stopping after
    /// `max_records` when given
    pub async fn fetch_all(
        &self,
        collection: &Collection,
        max_records: Option<usize>,
    ) -> Result<Vec<Work>, FetchError> {
        self.fetch_all_matching(collection, WorksQuery::new(), max_records)
            .await
    }

    /// Like [`fetch_all`](Self::fetch_all) but keeps `filter`, `query`,
    /// `select` and `sort` from `base`. Paging fields are always overridden.
    pub async fn fetch_all_matching(
        &self,
        collection: &Collection,
        base: WorksQuery,
        max_records: Option<usize>,
    ) -> Result<Vec<Work>, FetchError> {
        let guard = self.acquire()?;

        if max_records == Some(0) {
            self.state.succeed(Vec::new());
            guard.settle();
            return Ok(Vec::new());
        }

        match self.collect_pages(collection, base, max_records).await {
            Ok((works, pages)) => {
                tracing::info!(
                    "Fetched {} works from {} in {} page(s)",
                    works.len(),
                    collection,
                    pages
                );
                self.state.succeed(works.clone());
                guard.settle();
                Ok(works)
            }
            Err(e) => self.fail(guard, e),
        }
    }

    async fn collect_pages(
        &self,
        collection: &Collection,
        base: WorksQuery,
        max_records: Option<usize>,
    ) -> Result<(Vec<Work>, usize), FetchError> {
        let mut query = WorksQuery {
            rows: PAGE_SIZE,
            offset: None,
            cursor: Some(INITIAL_CURSOR.to_string()),
            ..base
        };
        if query.sort.is_none() {
            query = query.with_sort(DEFAULT_SORT, SortOrder::Desc);
        }

        let mut collected: Vec<Work> = Vec::new();
        let mut seen_cursors = HashSet::from([INITIAL_CURSOR.to_string()]);
        let mut pages = 0usize;

        loop {
            if self.options.max_pages.is_some_and(|max| pages >= max) {
                tracing::warn!(
                    "Stopping {} after {} page(s): page limit reached",
                    collection,
                    pages
                );
                break;
            }

            let page = self.fetcher.fetch_page(collection, &query).await?;
            pages += 1;

            let page_len = page.len();
            tracing::debug!(
                "Page {} of {}: {} works ({} total)",
                pages,
                collection,
                page_len,
                page.total_results
            );

            let mut items = page.items;
            if let Some(max) = max_records {
                items.truncate(max.saturating_sub(collected.len()));
            }
            self.state.extend(&items);
            collected.extend(items);

            if max_records.is_some_and(|max| collected.len() >= max) {
                break;
            }

            let next_cursor = match page.next_cursor {
                Some(cursor) if page_len >= query.effective_rows() as usize => cursor,
                _ => break,
            };

            if !seen_cursors.insert(next_cursor.clone()) {
                tracing::warn!("{} returned a cursor it already issued", collection);
                return Err(FetchError::StalledCursor(next_cursor));
            }
            query.cursor = Some(next_cursor);
        }

        Ok((collected, pages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Serves a fixed sequence of responses and records every query it saw
    #[derive(Default)]
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<Page, TransportError>>>,
        requests: Mutex<Vec<WorksQuery>>,
        /// State receiver sampled on every page request, when attached
        observer: Mutex<Option<watch::Receiver<FetchSnapshot>>>,
        observed_lengths: Mutex<Vec<usize>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<Page, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        /// Listing of `total` works laid out the way Crossref pages them
        fn listing(total: usize) -> Self {
            let mut responses = Vec::new();
            let mut start = 0;
            loop {
                let len = (total - start).min(PAGE_SIZE as usize);
                let cursor = format!("c{}", responses.len() + 1);
                responses.push(Ok(page(start, len, Some(&cursor))));
                start += len;
                if len < PAGE_SIZE as usize {
                    break;
                }
            }
            Self::new(responses)
        }

        fn requests(&self) -> Vec<WorksQuery> {
            self.requests.lock().unwrap().clone()
        }

        fn cursors(&self) -> Vec<String> {
            self.requests()
                .iter()
                .map(|q| q.effective_cursor().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(
            &self,
            _collection: &Collection,
            query: &WorksQuery,
        ) -> Result<Page, TransportError> {
            self.requests.lock().unwrap().push(query.clone());
            if let Some(rx) = self.observer.lock().unwrap().as_ref() {
                let len = rx.borrow().works().len();
                self.observed_lengths.lock().unwrap().push(len);
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Page::default()))
        }

        async fn fetch_member(&self, member_id: &str) -> Result<Member, TransportError> {
            let id = member_id
                .parse()
                .map_err(|_| TransportError::status(404, "Resource not found."))?;
            Ok(Member {
                id,
                primary_name: "Test Press".to_string(),
                ..Member::default()
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    /// Blocks every page request until released
    #[derive(Default)]
    struct GatedFetcher {
        gate: Notify,
    }

    #[async_trait]
    impl PageFetcher for GatedFetcher {
        async fn fetch_page(
            &self,
            _collection: &Collection,
            _query: &WorksQuery,
        ) -> Result<Page, TransportError> {
            self.gate.notified().await;
            Ok(page(0, 1, None))
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    fn page(start: usize, len: usize, cursor: Option<&str>) -> Page {
        Page {
            items: (start..start + len)
                .map(|i| Work::new(format!("10.5555/{}", i)))
                .collect(),
            total_results: 0,
            next_cursor: cursor.map(String::from),
        }
    }

    fn collection() -> Collection {
        Collection::member("98")
    }

    #[tokio::test]
    async fn cap_limits_result_length() {
        let cases = [
            (Some(0), 0, 0),
            (Some(1), 1, 1),
            (Some(100), 100, 1),
            (Some(101), 101, 2),
            (Some(250), 250, 3),
            (Some(1000), 250, 3),
            (None, 250, 3),
        ];

        for (max, expected_len, expected_requests) in cases {
            let aggregator = WorksAggregator::new(ScriptedFetcher::listing(250));
            let works = aggregator.fetch_all(&collection(), max).await.unwrap();

            assert_eq!(works.len(), expected_len, "max_records = {:?}", max);
            assert_eq!(
                aggregator.fetcher().requests().len(),
                expected_requests,
                "max_records = {:?}",
                max
            );
        }
    }

    #[tokio::test]
    async fn stops_after_short_page() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(0, 100, Some("c1"))),
            Ok(page(100, 100, Some("c2"))),
            Ok(page(200, 37, None)),
            Ok(page(237, 100, Some("never"))),
        ]);
        let aggregator = WorksAggregator::new(fetcher);

        let works = aggregator.fetch_all(&collection(), None).await.unwrap();

        assert_eq!(works.len(), 237);
        assert_eq!(works[236].doi, "10.5555/236");
        assert_eq!(aggregator.fetcher().cursors(), vec!["*", "c1", "c2"]);
    }

    #[tokio::test]
    async fn short_page_with_cursor_still_stops() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(0, 100, Some("c1"))),
            Ok(page(100, 37, Some("c2"))),
        ]);
        let aggregator = WorksAggregator::new(fetcher);

        let works = aggregator.fetch_all(&collection(), None).await.unwrap();

        assert_eq!(works.len(), 137);
        assert_eq!(aggregator.fetcher().requests().len(), 2);
    }

    #[tokio::test]
    async fn cap_is_checked_before_requesting_another_page() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(0, 100, Some("c1"))),
            Ok(page(100, 100, Some("c2"))),
            Ok(page(200, 100, Some("c3"))),
        ]);
        let aggregator = WorksAggregator::new(fetcher);

        let works = aggregator.fetch_all(&collection(), Some(150)).await.unwrap();

        assert_eq!(works.len(), 150);
        assert_eq!(works.last().unwrap().doi, "10.5555/149");
        assert_eq!(aggregator.fetcher().requests().len(), 2);
    }

    #[tokio::test]
    async fn full_page_without_cursor_stops() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(0, 100, None)),
            Ok(page(100, 100, Some("c2"))),
        ]);
        let aggregator = WorksAggregator::new(fetcher);

        let works = aggregator.fetch_all(&collection(), None).await.unwrap();

        assert_eq!(works.len(), 100);
        assert_eq!(aggregator.fetcher().requests().len(), 1);
    }

    #[tokio::test]
    async fn exact_multiple_ends_on_empty_page() {
        let aggregator = WorksAggregator::new(ScriptedFetcher::listing(200));

        let works = aggregator.fetch_all(&collection(), None).await.unwrap();

        assert_eq!(works.len(), 200);
        assert_eq!(aggregator.fetcher().cursors(), vec!["*", "c1", "c2"]);
    }

    #[tokio::test]
    async fn failure_mid_sequence_sets_error_state() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(0, 100, Some("c1"))),
            Err(TransportError::status(429, "rate limited")),
            Ok(page(100, 10, None)),
        ]);
        let aggregator = WorksAggregator::new(fetcher);

        let err = aggregator.fetch_all(&collection(), None).await.unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)));
        assert_eq!(err.to_string(), "rate limited");
        assert_eq!(aggregator.state().error().as_deref(), Some("rate limited"));
        assert!(!aggregator.state().is_loading());
        assert_eq!(aggregator.fetcher().requests().len(), 2);
    }

    #[tokio::test]
    async fn consecutive_calls_reset_state() {
        let aggregator = WorksAggregator::new(ScriptedFetcher::new(vec![
            Err(TransportError::status(503, "unavailable")),
            Ok(page(0, 100, Some("c1"))),
            Ok(page(100, 50, None)),
            Ok(page(500, 100, Some("d1"))),
        ]));

        assert!(aggregator.fetch_all(&collection(), None).await.is_err());
        assert_eq!(aggregator.state().error().as_deref(), Some("unavailable"));

        let first = aggregator.fetch_all(&collection(), Some(120)).await.unwrap();
        assert_eq!(first.len(), 120);
        assert_eq!(aggregator.state().error(), None);
        assert!(!aggregator.state().is_loading());

        let second = aggregator.fetch_all(&collection(), Some(5)).await.unwrap();
        assert_eq!(second.len(), 5);
        assert_eq!(second[0].doi, "10.5555/500");
        assert_eq!(aggregator.state().error(), None);
        assert!(!aggregator.state().is_loading());
        assert_eq!(aggregator.state().snapshot().works(), second.as_slice());
    }

    #[tokio::test]
    async fn zero_cap_issues_no_requests() {
        let aggregator = WorksAggregator::new(ScriptedFetcher::listing(250));

        let works = aggregator.fetch_all(&collection(), Some(0)).await.unwrap();

        assert!(works.is_empty());
        assert!(aggregator.fetcher().requests().is_empty());
        assert!(!aggregator.state().is_loading());
    }

    #[tokio::test]
    async fn repeated_cursor_is_reported() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(0, 100, Some("c1"))),
            Ok(page(100, 100, Some("c2"))),
            Ok(page(200, 100, Some("c1"))),
        ]);
        let aggregator = WorksAggregator::new(fetcher);

        let err = aggregator.fetch_all(&collection(), None).await.unwrap_err();

        assert!(matches!(err, FetchError::StalledCursor(ref c) if c == "c1"));
        assert_eq!(aggregator.fetcher().requests().len(), 3);
        assert!(aggregator.state().error().is_some());
        assert!(!aggregator.state().is_loading());
    }

    #[tokio::test]
    async fn page_limit_bounds_requests() {
        let options = AggregatorOptions { max_pages: Some(2) };
        let aggregator = WorksAggregator::with_options(ScriptedFetcher::listing(1000), options);

        let works = aggregator.fetch_all(&collection(), None).await.unwrap();

        assert_eq!(works.len(), 200);
        assert_eq!(aggregator.fetcher().requests().len(), 2);
    }

    #[tokio::test]
    async fn full_listing_uses_fixed_paging_and_keeps_filters() {
        let aggregator = WorksAggregator::new(ScriptedFetcher::listing(10));
        let base = WorksQuery::new()
            .with_rows(5)
            .with_offset(30)
            .with_filter("type:journal-article")
            .with_select("DOI,title");

        aggregator
            .fetch_all_matching(&collection(), base, None)
            .await
            .unwrap();

        let sent = &aggregator.fetcher().requests()[0];
        assert_eq!(sent.rows, PAGE_SIZE);
        assert_eq!(sent.offset, None);
        assert_eq!(sent.effective_cursor(), "*");
        assert_eq!(sent.sort.as_deref(), Some(DEFAULT_SORT));
        assert_eq!(sent.order, Some(SortOrder::Desc));
        assert_eq!(sent.filter.as_deref(), Some("type:journal-article"));
        assert_eq!(sent.select.as_deref(), Some("DOI,title"));
    }

    #[tokio::test]
    async fn single_page_passes_query_through() {
        let aggregator =
            WorksAggregator::new(ScriptedFetcher::new(vec![Ok(page(0, 50, Some("c1")))]));
        let query = WorksQuery::new()
            .with_rows(50)
            .with_sort("published", SortOrder::Desc);

        let page = aggregator
            .fetch_single_page(&collection(), &query)
            .await
            .unwrap();

        assert_eq!(page.len(), 50);
        assert_eq!(aggregator.fetcher().requests(), vec![query]);
        assert_eq!(aggregator.state().len(), 50);
        assert!(!aggregator.state().is_loading());
    }

    #[tokio::test]
    async fn single_page_failure_sets_error() {
        let aggregator = WorksAggregator::new(ScriptedFetcher::new(vec![Err(
            TransportError::status(404, "Resource not found."),
        )]));

        let err = aggregator
            .fetch_single_page(&collection(), &WorksQuery::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Resource not found.");
        assert_eq!(
            aggregator.state().error().as_deref(),
            Some("Resource not found.")
        );
        assert!(!aggregator.state().is_loading());
    }

    #[tokio::test]
    async fn member_lookup_clears_works() {
        let aggregator = WorksAggregator::new(ScriptedFetcher::listing(10));
        aggregator.fetch_all(&collection(), None).await.unwrap();
        assert_eq!(aggregator.state().len(), 10);

        let member = aggregator.fetch_member("98").await.unwrap();

        assert_eq!(member.id, 98);
        assert!(aggregator.state().is_empty());
        assert_eq!(aggregator.state().error(), None);
    }

    #[tokio::test]
    async fn failed_member_lookup_sets_error() {
        let aggregator = WorksAggregator::new(ScriptedFetcher::listing(10));
        aggregator.fetch_all(&collection(), None).await.unwrap();

        let err = aggregator.fetch_member("not-a-member").await.unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)));
        assert_eq!(err.to_string(), "Resource not found.");
        assert_eq!(
            aggregator.state().error().as_deref(),
            Some("Resource not found.")
        );
        assert!(!aggregator.state().is_loading());
        assert!(aggregator.state().is_empty());
    }

    #[tokio::test]
    async fn listing_only_fetcher_rejects_member_lookup() {
        let aggregator = WorksAggregator::new(GatedFetcher::default());

        let err = aggregator.fetch_member("98").await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::Transport(TransportError::InvalidRequest(_))
        ));
        assert!(aggregator.state().error().is_some());
        assert!(!aggregator.state().is_loading());
    }

    #[tokio::test]
    async fn published_works_never_exceed_cap() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(0, 100, Some("c1"))),
            Ok(page(100, 100, Some("c2"))),
            Ok(page(200, 100, Some("c3"))),
        ]);
        let aggregator = WorksAggregator::new(fetcher);
        *aggregator.fetcher().observer.lock().unwrap() = Some(aggregator.subscribe());

        let (works, pages) = aggregator
            .collect_pages(&collection(), WorksQuery::new(), Some(150))
            .await
            .unwrap();

        assert_eq!(pages, 2);
        assert_eq!(works.len(), 150);
        assert_eq!(aggregator.state().len(), 150);
        assert_eq!(
            *aggregator.fetcher().observed_lengths.lock().unwrap(),
            vec![0, 100]
        );
    }

    #[tokio::test]
    async fn concurrent_request_is_rejected() {
        let aggregator = WorksAggregator::new(GatedFetcher::default());
        let c = collection();

        let (first, second) = tokio::join!(aggregator.fetch_all(&c, None), async {
            tokio::task::yield_now().await;
            let second = aggregator.fetch_all(&c, Some(3)).await;
            assert!(aggregator.state().is_loading());
            aggregator.fetcher().gate.notify_one();
            second
        });

        assert!(matches!(second, Err(FetchError::ConcurrentRequest)));
        assert_eq!(first.unwrap().len(), 1);
        assert_eq!(aggregator.state().error(), None);
        assert!(!aggregator.state().is_loading());
    }

    #[tokio::test]
    async fn dropped_request_releases_aggregator() {
        let aggregator = WorksAggregator::new(GatedFetcher::default());

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            aggregator.fetch_all(&collection(), None),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(!aggregator.state().is_loading());

        aggregator.fetcher().gate.notify_one();
        let works = aggregator.fetch_all(&collection(), None).await.unwrap();
        assert_eq!(works.len(), 1);
    }

    #[tokio::test]
    async fn subscribers_observe_progress() {
        let aggregator = WorksAggregator::new(ScriptedFetcher::listing(150));
        let rx = aggregator.subscribe();

        aggregator.fetch_all(&collection(), None).await.unwrap();

        let snapshot = rx.borrow().clone();
        assert!(!snapshot.is_loading());
        assert_eq!(snapshot.works().len(), 150);
    }
}
