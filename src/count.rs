//! Total-match count, fetched once per query version.
//!
//! Display-only: the grid and pagination never wait on it, and a failure
//! is not retried.

use log::{debug, warn};

use crate::api::{ApiError, CountRequest};
use crate::query::{QueryKey, QueryVersion};
use crate::worker::{Job, Transport};

#[derive(Debug, Clone, PartialEq)]
pub enum CountState {
    /// No query submitted yet.
    Idle,
    Counting,
    Known(u64),
    Unavailable(ApiError),
}

pub struct CountController {
    version: QueryVersion,
    state: CountState,
}

impl Default for CountController {
    fn default() -> Self {
        Self::new()
    }
}

impl CountController {
    pub fn new() -> Self {
        Self {
            version: QueryVersion::default(),
            state: CountState::Idle,
        }
    }

    /// Fire the count request for a freshly started query version.
    pub fn start(&mut self, key: &QueryKey, version: QueryVersion, page_size: u32, transport: &dyn Transport) {
        debug!("count: requesting total for {version}");
        self.version = version;
        self.state = CountState::Counting;
        transport.dispatch(Job::Count {
            version,
            request: CountRequest::new(key, page_size),
        });
    }

    /// Apply a count reply. Returns false if the reply was stale.
    pub fn on_count(&mut self, version: QueryVersion, result: Result<u64, ApiError>) -> bool {
        if version != self.version {
            warn!("count: dropping stale reply {version} (current {})", self.version);
            return false;
        }
        self.state = match result {
            Ok(total) => CountState::Known(total),
            Err(e) => {
                warn!("count: {version} failed: {e}");
                CountState::Unavailable(e)
            }
        };
        true
    }

    pub fn state(&self) -> &CountState {
        &self.state
    }

    /// Status bar text.
    pub fn label(&self) -> String {
        match &self.state {
            CountState::Idle => String::new(),
            CountState::Counting => "counting…".into(),
            CountState::Known(n) => format!("{} files", group_thousands(*n)),
            CountState::Unavailable(_) => "count unavailable".into(),
        }
    }
}

/// `1234567` → `1,234,567`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
