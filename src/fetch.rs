//! Cursor-driven page accumulation for one query at a time.
//!
//! Pages are requested strictly one after another: the cursor for page N+1
//! is only known once page N has arrived, so at most one page request is
//! ever outstanding per query version. Every `start` bumps the version;
//! a reply tagged with an older version is dropped on arrival.
//!
//! ```text
//! start(key) ──► fetch_next ──► [in flight] ──► on_page(Ok) ──► fetch_next ...
//!                    ▲                │
//!                    └── no-op while ─┘
//!                        in flight
//! ```

use std::sync::Arc;

use log::{debug, info, warn};

use crate::api::{ApiError, Item, Page, QueryRequest, Stats};
use crate::query::{Cursor, QueryKey, QueryVersion};
use crate::worker::{Job, Transport};

/// What `on_page` did with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Reply belonged to a superseded query; nothing changed.
    Stale,
    /// Items were appended (possibly zero).
    Appended { added: usize },
    /// The request failed; accumulated items are untouched.
    Failed,
}

pub struct FetchController {
    page_size: u32,
    key: Option<QueryKey>,
    version: QueryVersion,
    items: Vec<Arc<Item>>,
    capture_names: Vec<String>,
    next_cursor: Option<Cursor>,
    more_available: bool,
    fetching: bool,
    pages_loaded: usize,
    stats: Stats,
    error: Option<ApiError>,
}

impl FetchController {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            key: None,
            version: QueryVersion::default(),
            items: Vec::new(),
            capture_names: Vec::new(),
            next_cursor: None,
            more_available: false,
            fetching: false,
            pages_loaded: 0,
            stats: Stats::default(),
            error: None,
        }
    }

    /// Begin a new query: discard everything accumulated and bump the version.
    ///
    /// Does not issue a request; call `fetch_next` for the first page.
    pub fn start(&mut self, key: QueryKey) -> QueryVersion {
        self.version = self.version.next();
        info!(
            "fetch: start {} pattern={:?} mode={}",
            self.version, key.pattern, key.mode
        );
        self.key = Some(key);
        self.items.clear();
        self.capture_names.clear();
        self.next_cursor = None;
        self.more_available = true;
        self.fetching = false;
        self.pages_loaded = 0;
        self.stats = Stats::default();
        self.error = None;
        self.version
    }

    /// Request the next page if one may exist and none is outstanding.
    ///
    /// Returns whether a request was dispatched. Repeated calls while a
    /// request is in flight coalesce into that single request.
    pub fn fetch_next(&mut self, transport: &dyn Transport) -> bool {
        let Some(key) = &self.key else {
            return false;
        };
        if !self.has_more() || self.fetching {
            return false;
        }
        let request = QueryRequest::new(key, self.page_size, self.next_cursor.clone());
        debug!(
            "fetch: requesting page {} of {} (cursor={:?})",
            self.pages_loaded + 1,
            self.version,
            request.cursor.as_ref().map(|c| c.0.as_str())
        );
        self.fetching = true;
        transport.dispatch(Job::Page {
            version: self.version,
            request,
        });
        true
    }

    /// Apply a page reply.
    pub fn on_page(&mut self, version: QueryVersion, result: Result<Page, ApiError>) -> PageOutcome {
        if version != self.version {
            warn!(
                "fetch: dropping stale page reply {version} (current {})",
                self.version
            );
            return PageOutcome::Stale;
        }
        self.fetching = false;
        match result {
            Ok(page) => {
                if self.pages_loaded == 0 {
                    self.capture_names = page.capture_names;
                }
                let added = page.items.len();
                self.items.extend(page.items.into_iter().map(Arc::new));
                self.more_available = page.next_cursor.is_some();
                self.next_cursor = page.next_cursor;
                self.pages_loaded += 1;
                if let Some(s) = page.stats {
                    self.stats.scanned_prefixes += s.scanned_prefixes;
                    self.stats.scanned_objects += s.scanned_objects;
                    self.stats.matched += s.matched;
                }
                debug!(
                    "fetch: page {} of {} added {added} item(s), total {}, more={}",
                    self.pages_loaded,
                    self.version,
                    self.items.len(),
                    self.more_available
                );
                PageOutcome::Appended { added }
            }
            Err(e) => {
                warn!("fetch: page {} of {} failed: {e}", self.pages_loaded + 1, self.version);
                self.error = Some(e);
                PageOutcome::Failed
            }
        }
    }

    pub fn key(&self) -> Option<&QueryKey> {
        self.key.as_ref()
    }

    pub fn version(&self) -> QueryVersion {
        self.version
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// All items in arrival order.
    pub fn items(&self) -> &[Arc<Item>] {
        &self.items
    }

    /// Capture names from the first page (empty until it arrives).
    pub fn capture_names(&self) -> &[String] {
        &self.capture_names
    }

    /// A further page can be requested. False after a failure.
    pub fn has_more(&self) -> bool {
        self.more_available && self.error.is_none()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    /// No further page exists and none is in flight.
    pub fn all_loaded(&self) -> bool {
        self.key.is_some() && !self.more_available && !self.fetching
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// The very first page failed, so there is nothing to show.
    pub fn first_page_failed(&self) -> bool {
        self.error.is_some() && self.pages_loaded == 0
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded
    }

    /// Scan counters summed over all loaded pages.
    pub fn stats(&self) -> Stats {
        self.stats
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::query::QueryMode;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    /// Transport that just records what was dispatched.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub jobs: RefCell<Vec<Job>>,
    }

    impl Transport for Recorder {
        fn dispatch(&self, job: Job) {
            self.jobs.borrow_mut().push(job);
        }
    }

    impl Recorder {
        pub(crate) fn page_cursors(&self) -> Vec<Option<String>> {
            self.jobs
                .borrow()
                .iter()
                .filter_map(|j| match j {
                    Job::Page { request, .. } => Some(request.cursor.as_ref().map(|c| c.0.clone())),
                    _ => None,
                })
                .collect()
        }
    }

    pub(crate) fn item(object: &str, captures: &[(&str, &str)]) -> Item {
        Item {
            object: object.into(),
            url: format!("https://img.invalid/{object}"),
            captures: captures
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    pub(crate) fn page(names: &[&str], items: Vec<Item>, next: Option<&str>) -> Page {
        Page {
            capture_names: names.iter().map(|s| s.to_string()).collect(),
            items,
            next_cursor: next.map(|c| Cursor(c.into())),
            stats: None,
        }
    }

    fn key() -> QueryKey {
        QueryKey::new("gs://b/%x%.jpg", QueryMode::Percent)
    }

    #[test]
    fn fetch_before_start_is_noop() {
        let rec = Recorder::default();
        let mut fc = FetchController::new(10);
        assert!(!fc.fetch_next(&rec));
        assert!(rec.jobs.borrow().is_empty());
        assert!(!fc.all_loaded());
    }

    #[test]
    fn first_page_uses_no_cursor_then_follows_cursor() {
        let rec = Recorder::default();
        let mut fc = FetchController::new(10);
        let v = fc.start(key());
        assert!(fc.fetch_next(&rec));
        fc.on_page(v, Ok(page(&["x"], vec![item("a", &[("x", "1")])], Some("c1"))));
        assert!(fc.fetch_next(&rec));
        fc.on_page(v, Ok(page(&[], vec![item("b", &[("x", "2")])], None)));
        assert_eq!(rec.page_cursors(), vec![None, Some("c1".to_string())]);
        assert!(fc.all_loaded());
        assert!(!fc.has_more());
        assert!(!fc.fetch_next(&rec));
    }

    #[test]
    fn concurrent_fetch_next_coalesces() {
        let rec = Recorder::default();
        let mut fc = FetchController::new(10);
        fc.start(key());
        assert!(fc.fetch_next(&rec));
        assert!(!fc.fetch_next(&rec));
        assert!(!fc.fetch_next(&rec));
        assert_eq!(rec.jobs.borrow().len(), 1);
        assert!(fc.is_fetching());
    }

    #[test]
    fn capture_names_fixed_by_first_page() {
        let rec = Recorder::default();
        let mut fc = FetchController::new(10);
        let v = fc.start(key());
        fc.fetch_next(&rec);
        fc.on_page(v, Ok(page(&["exp", "class"], vec![], Some("c1"))));
        fc.fetch_next(&rec);
        fc.on_page(v, Ok(page(&["other"], vec![], None)));
        assert_eq!(fc.capture_names(), ["exp", "class"]);
    }

    #[test]
    fn items_accumulate_in_arrival_order() {
        let rec = Recorder::default();
        let mut fc = FetchController::new(2);
        let v = fc.start(key());
        fc.fetch_next(&rec);
        fc.on_page(v, Ok(page(&["x"], vec![item("b", &[]), item("a", &[])], Some("c"))));
        fc.fetch_next(&rec);
        fc.on_page(v, Ok(page(&["x"], vec![item("c", &[])], None)));
        let objects: Vec<&str> = fc.items().iter().map(|i| i.object.as_str()).collect();
        assert_eq!(objects, ["b", "a", "c"]);
        assert_eq!(fc.pages_loaded(), 2);
    }

    #[test]
    fn stale_reply_is_discarded() {
        let rec = Recorder::default();
        let mut fc = FetchController::new(10);
        let old = fc.start(key());
        fc.fetch_next(&rec);
        let new = fc.start(QueryKey::new("gs://b/%y%.jpg", QueryMode::Percent));
        assert_ne!(old, new);
        let outcome = fc.on_page(old, Ok(page(&["x"], vec![item("stale", &[])], None)));
        assert_eq!(outcome, PageOutcome::Stale);
        assert!(fc.items().is_empty());
        assert!(fc.capture_names().is_empty());
        assert!(fc.has_more());
        // The stale reply must not clear the new version's fetch flag either.
        fc.fetch_next(&rec);
        assert!(fc.is_fetching());
        fc.on_page(old, Err(ApiError::Transport("late".into())));
        assert!(fc.is_fetching());
        assert!(fc.error().is_none());
    }

    #[test]
    fn later_failure_keeps_items_and_halts() {
        let rec = Recorder::default();
        let mut fc = FetchController::new(10);
        let v = fc.start(key());
        fc.fetch_next(&rec);
        fc.on_page(v, Ok(page(&["x"], vec![item("a", &[])], Some("c1"))));
        fc.fetch_next(&rec);
        let outcome = fc.on_page(v, Err(ApiError::Transport("boom".into())));
        assert_eq!(outcome, PageOutcome::Failed);
        assert_eq!(fc.items().len(), 1);
        assert!(!fc.first_page_failed());
        assert!(!fc.has_more());
        assert!(!fc.all_loaded());
        assert!(!fc.fetch_next(&rec));
        assert_eq!(rec.jobs.borrow().len(), 2);
    }

    #[test]
    fn first_page_failure() {
        let rec = Recorder::default();
        let mut fc = FetchController::new(10);
        let v = fc.start(key());
        fc.fetch_next(&rec);
        fc.on_page(v, Err(ApiError::Status { status: 400, message: "bad".into() }));
        assert!(fc.first_page_failed());
        // A new submission clears the error.
        fc.start(key());
        assert!(fc.error().is_none());
        assert!(fc.fetch_next(&rec));
    }

    #[test]
    fn stats_are_summed() {
        let rec = Recorder::default();
        let mut fc = FetchController::new(10);
        let v = fc.start(key());
        let stats = Stats { scanned_prefixes: 1, scanned_objects: 10, matched: 2 };
        for next in [Some("c"), None] {
            fc.fetch_next(&rec);
            let mut p = page(&["x"], vec![], next);
            p.stats = Some(stats);
            fc.on_page(v, Ok(p));
        }
        assert_eq!(fc.stats().scanned_objects, 20);
        assert_eq!(fc.stats().matched, 4);
    }
}
