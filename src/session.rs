//! Session: the single state store behind the UI.
//!
//! Owns the fetch, count and navigation controllers plus the derived
//! grouping. Every mutation happens here, on the UI thread, in response to
//! either user input or a worker reply. Derived views (`Grouped`, the
//! viewport model) are rebuilt from scratch whenever an input to them
//! changes; observers poll `take_dirty` to learn that something did.

use log::{debug, info};

use crate::api::{ApiError, Page};
use crate::count::CountController;
use crate::fetch::{FetchController, PageOutcome};
use crate::group::{Grouped, MatchItem, group, resolve_dimension};
use crate::navigation::{Direction, NavState, NavigationController, Pager};
use crate::pattern::{self, PatternError, PatternInfo};
use crate::query::{QueryKey, QueryVersion};
use crate::viewport::{RowHeights, ViewportModel};
use crate::worker::Transport;

/// Column counts offered by the UI.
pub const COLUMN_CHOICES: [usize; 4] = [2, 4, 6, 8];

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub page_size: u32,
    pub columns: usize,
    pub group_by: Option<String>,
    pub heights: RowHeights,
    pub lookahead: usize,
}

/// Coarse state of the current query, for choosing what the grid shows.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPhase {
    /// Nothing submitted yet.
    Idle,
    /// First page still in flight.
    Scanning,
    /// First page failed; nothing to show but the error.
    Failed(ApiError),
    /// At least one page loaded (may be empty).
    Ready,
}

/// Adapts the fetch controller to the navigator's `Pager` seam.
struct FetchPager<'a> {
    fetch: &'a mut FetchController,
    transport: &'a dyn Transport,
}

impl Pager for FetchPager<'_> {
    fn all_loaded(&self) -> bool {
        self.fetch.all_loaded()
    }

    fn is_fetching(&self) -> bool {
        self.fetch.is_fetching()
    }

    fn request_next(&mut self) -> bool {
        self.fetch.fetch_next(self.transport)
    }
}

pub struct Session<T: Transport> {
    transport: T,
    fetch: FetchController,
    count: CountController,
    nav: NavigationController,
    requested_group: Option<String>,
    columns: usize,
    heights: RowHeights,
    lookahead: usize,
    grouped: Grouped,
    preview: Option<PatternInfo>,
    dirty: bool,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            fetch: FetchController::new(config.page_size),
            count: CountController::new(),
            nav: NavigationController::new(),
            requested_group: config.group_by,
            columns: config.columns.max(1),
            heights: config.heights,
            lookahead: config.lookahead,
            grouped: Grouped::default(),
            preview: None,
            dirty: true,
        }
    }

    // -----------------------------------------------------------------------
    // Query lifecycle
    // -----------------------------------------------------------------------

    /// Submit a new pattern. Validates it locally first; on error the
    /// current query is left untouched.
    pub fn submit(&mut self, key: QueryKey) -> Result<QueryVersion, PatternError> {
        let info = pattern::inspect(&key.pattern, key.mode)?;
        let key = QueryKey::new(key.pattern.trim(), key.mode);
        let version = self.fetch.start(key.clone());
        self.count
            .start(&key, version, self.fetch.page_size(), &self.transport);
        self.nav.reset();
        self.preview = Some(info);
        self.grouped = Grouped::default();
        self.fetch.fetch_next(&self.transport);
        self.dirty = true;
        Ok(version)
    }

    /// Resubmit the current key under a fresh version.
    pub fn resubmit(&mut self) -> Option<Result<QueryVersion, PatternError>> {
        let key = self.fetch.key()?.clone();
        Some(self.submit(key))
    }

    pub fn on_page(&mut self, version: QueryVersion, result: Result<Page, ApiError>) {
        match self.fetch.on_page(version, result) {
            PageOutcome::Stale => {}
            PageOutcome::Appended { .. } => {
                self.regroup_items();
                self.reconcile_nav();
                self.dirty = true;
            }
            PageOutcome::Failed => {
                self.reconcile_nav();
                self.dirty = true;
            }
        }
    }

    pub fn on_count(&mut self, version: QueryVersion, result: Result<u64, ApiError>) {
        if self.count.on_count(version, result) {
            self.dirty = true;
        }
    }

    /// Ask for the next page (no-op if nothing more or already fetching).
    pub fn request_more(&mut self) -> bool {
        let issued = self.fetch.fetch_next(&self.transport);
        if issued {
            self.dirty = true;
        }
        issued
    }

    /// Report the highest visible row index after drawing the grid.
    pub fn on_visible_rows(&mut self, visible_stop: usize) -> bool {
        let viewport = self.viewport();
        if viewport.should_fetch(
            visible_stop,
            self.fetch.has_more(),
            self.fetch.is_fetching(),
            self.lookahead,
        ) {
            debug!(
                "session: row {visible_stop}/{} within lookahead, fetching next page",
                viewport.len()
            );
            return self.request_more();
        }
        false
    }

    // -----------------------------------------------------------------------
    // Grouping and layout
    // -----------------------------------------------------------------------

    /// Group dimension in effect (always one of the capture names).
    pub fn group_dimension(&self) -> Option<&str> {
        resolve_dimension(self.fetch.capture_names(), self.requested_group.as_deref())
    }

    /// Change the group dimension. Unknown names are rejected.
    pub fn set_group_by(&mut self, name: &str) -> bool {
        if !self.fetch.capture_names().iter().any(|n| n == name) {
            return false;
        }
        if self.group_dimension() == Some(name) {
            self.requested_group = Some(name.to_string());
            return true;
        }
        info!("session: group by {name}");
        self.requested_group = Some(name.to_string());
        self.regroup_items();
        self.nav.regroup();
        self.reconcile_nav();
        self.dirty = true;
        true
    }

    /// Step through the capture names.
    pub fn cycle_group(&mut self, forward: bool) -> Option<String> {
        let names = self.fetch.capture_names();
        if names.is_empty() {
            return None;
        }
        let current = self
            .group_dimension()
            .and_then(|d| names.iter().position(|n| n == d))
            .unwrap_or(0);
        let len = names.len();
        let next = if forward {
            (current + 1) % len
        } else {
            (current + len - 1) % len
        };
        let name = names[next].clone();
        self.set_group_by(&name);
        Some(name)
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn set_columns(&mut self, columns: usize) {
        let columns = columns.max(1);
        if columns == self.columns {
            return;
        }
        debug!("session: columns {} → {columns}", self.columns);
        self.columns = columns;
        self.regroup_items();
        self.reconcile_nav();
        self.dirty = true;
    }

    /// Move to the next/previous entry of `COLUMN_CHOICES`.
    pub fn cycle_columns(&mut self, forward: bool) -> usize {
        let pos = COLUMN_CHOICES.iter().position(|&c| c == self.columns);
        let next = match (pos, forward) {
            (Some(i), true) => COLUMN_CHOICES[(i + 1).min(COLUMN_CHOICES.len() - 1)],
            (Some(i), false) => COLUMN_CHOICES[i.saturating_sub(1)],
            (None, _) => COLUMN_CHOICES[1],
        };
        self.set_columns(next);
        self.columns
    }

    pub fn grouped(&self) -> &Grouped {
        &self.grouped
    }

    /// Row model for the current grid, including the loading row.
    pub fn viewport(&self) -> ViewportModel {
        let more_pending = self.fetch.has_more() || self.fetch.is_fetching();
        ViewportModel::new(&self.grouped.rows, more_pending, self.heights)
    }

    // -----------------------------------------------------------------------
    // Viewer navigation
    // -----------------------------------------------------------------------

    pub fn open(&mut self, global_index: usize) -> bool {
        let opened = self.nav.open(global_index);
        self.dirty |= opened;
        opened
    }

    pub fn close(&mut self) {
        if self.nav.is_open() {
            self.nav.close();
            self.dirty = true;
        }
    }

    pub fn navigate(&mut self, dir: Direction) -> NavState {
        let before = self.nav.state();
        let mut pager = FetchPager {
            fetch: &mut self.fetch,
            transport: &self.transport,
        };
        let after = self.nav.navigate(dir, &mut pager);
        if after != before {
            self.dirty = true;
        }
        after
    }

    pub fn nav(&self) -> &NavigationController {
        &self.nav
    }

    /// The match shown in the viewer, if any (none while awaiting).
    pub fn selected_match(&self) -> Option<&MatchItem> {
        match self.nav.state() {
            NavState::Viewing(i) => self.grouped.matches.get(i),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> QueryPhase {
        if self.fetch.key().is_none() {
            QueryPhase::Idle
        } else if let Some(e) = self.fetch.error().filter(|_| self.fetch.first_page_failed()) {
            QueryPhase::Failed(e.clone())
        } else if self.fetch.pages_loaded() == 0 {
            QueryPhase::Scanning
        } else {
            QueryPhase::Ready
        }
    }

    pub fn fetch(&self) -> &FetchController {
        &self.fetch
    }

    pub fn count(&self) -> &CountController {
        &self.count
    }

    pub fn capture_names(&self) -> &[String] {
        self.fetch.capture_names()
    }

    /// Inspection result of the current pattern.
    pub fn preview(&self) -> Option<&PatternInfo> {
        self.preview.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether anything changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // -----------------------------------------------------------------------

    fn regroup_items(&mut self) {
        let dim = resolve_dimension(self.fetch.capture_names(), self.requested_group.as_deref());
        self.grouped = group(self.fetch.items(), dim, self.columns);
    }

    fn reconcile_nav(&mut self) {
        let total = self.grouped.total();
        let mut pager = FetchPager {
            fetch: &mut self.fetch,
            transport: &self.transport,
        };
        self.nav.reconcile(total, &mut pager);
    }
}
