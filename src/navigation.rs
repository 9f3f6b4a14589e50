//! Detail-viewer navigation over a match list whose tail is still loading.
//!
//! States:
//!
//! ```text
//!            open(i)                       navigate(+1) at last item,
//!   Closed ─────────► Viewing(i) ───────── list not fully loaded ──────► AwaitingNext
//!     ▲                  │   ▲                                            │    │
//!     └──── close() ─────┘   └──── page arrived (Viewing(frontier)) ──────┘    │
//!                            └──── navigate(-1) (Viewing(total-1)) ────────────┘
//! ```
//!
//! `AwaitingNext` is reported as the sentinel index `total`: the user asked
//! for the item after the last loaded one and it has not arrived yet.
//! Wrapping around either end is only allowed once the whole result set is
//! loaded.

use log::debug;

/// Page-loading capability the navigator needs from the fetch side.
pub trait Pager {
    /// No further page exists and none is in flight.
    fn all_loaded(&self) -> bool;
    fn is_fetching(&self) -> bool;
    /// Request the next page. Returns false if none could be requested
    /// (nothing more to load, or pagination halted after an error).
    fn request_next(&mut self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Closed,
    Viewing(usize),
    /// Waiting for the first item past the loaded tail.
    AwaitingNext,
}

#[derive(Debug)]
pub struct NavigationController {
    state: NavState,
    /// Match count as of the last `reconcile`.
    total: usize,
    /// `total` at the moment `AwaitingNext` was entered.
    frontier: usize,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationController {
    pub fn new() -> Self {
        Self {
            state: NavState::Closed,
            total: 0,
            frontier: 0,
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    /// `None` when closed, the sentinel `total` while awaiting the next item.
    pub fn selected_index(&self) -> Option<usize> {
        match self.state {
            NavState::Closed => None,
            NavState::Viewing(i) => Some(i),
            NavState::AwaitingNext => Some(self.total),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state != NavState::Closed
    }

    pub fn is_loading_ahead(&self) -> bool {
        self.state == NavState::AwaitingNext
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Show the match at `global_index`. Out-of-range indices are ignored.
    pub fn open(&mut self, global_index: usize) -> bool {
        if global_index >= self.total {
            debug!("nav: open({global_index}) ignored, total={}", self.total);
            return false;
        }
        self.transition(NavState::Viewing(global_index));
        true
    }

    pub fn close(&mut self) {
        self.transition(NavState::Closed);
    }

    /// Indices are not comparable across groupings, so any regroup closes
    /// the viewer.
    pub fn regroup(&mut self) {
        self.transition(NavState::Closed);
    }

    /// Forget everything; used when a new query is submitted.
    pub fn reset(&mut self) {
        self.transition(NavState::Closed);
        self.total = 0;
        self.frontier = 0;
    }

    /// Step one item in `dir`.
    pub fn navigate(&mut self, dir: Direction, pager: &mut dyn Pager) -> NavState {
        let total = self.total;
        let next = match (self.state, dir) {
            (NavState::Closed, _) => NavState::Closed,

            (NavState::Viewing(i), Direction::Next) if i + 1 < total => NavState::Viewing(i + 1),
            (NavState::Viewing(i), Direction::Next) => {
                if pager.all_loaded() {
                    NavState::Viewing(0)
                } else if pager.is_fetching() || pager.request_next() {
                    self.frontier = total;
                    NavState::AwaitingNext
                } else {
                    // Pagination halted; nothing will ever arrive.
                    NavState::Viewing(i)
                }
            }

            (NavState::Viewing(0), Direction::Prev) => {
                if pager.all_loaded() && total > 0 {
                    NavState::Viewing(total - 1)
                } else {
                    NavState::Viewing(0)
                }
            }
            (NavState::Viewing(i), Direction::Prev) => NavState::Viewing(i - 1),

            // Already at the frontier; only a page arrival moves us on.
            (NavState::AwaitingNext, Direction::Next) => NavState::AwaitingNext,
            (NavState::AwaitingNext, Direction::Prev) => clamp_last(total),
        };
        self.transition(next);
        self.state
    }

    /// Revalidate after the match count or load status changed.
    ///
    /// Must be called whenever a page arrives or fails and whenever the
    /// flattened list is rebuilt.
    pub fn reconcile(&mut self, total: usize, pager: &mut dyn Pager) {
        self.total = total;
        let next = match self.state {
            NavState::AwaitingNext if total > self.frontier => NavState::Viewing(self.frontier),
            NavState::AwaitingNext => {
                if pager.is_fetching() {
                    NavState::AwaitingNext
                } else if !pager.all_loaded() && pager.request_next() {
                    // A page arrived without items; keep pulling.
                    NavState::AwaitingNext
                } else {
                    // The frontier really was the end, or loading stopped.
                    clamp_last(total)
                }
            }
            NavState::Viewing(i) if i >= total => clamp_last(total),
            other => other,
        };
        self.transition(next);
    }

    fn transition(&mut self, next: NavState) {
        if next != self.state {
            debug!("nav: {:?} → {:?} (total={})", self.state, next, self.total);
            self.state = next;
        }
    }
}

fn clamp_last(total: usize) -> NavState {
    if total == 0 {
        NavState::Closed
    } else {
        NavState::Viewing(total - 1)
    }
}
