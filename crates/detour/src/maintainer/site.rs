//! Per-site maintenance state.

use super::queue::SiteQueue;
use crate::error::RebuildError;
use crate::index::SiteIndex;
use crate::model::SiteId;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Externally visible lifecycle of a site's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SiteState {
    /// No index has ever been installed.
    Absent,
    /// A rebuild is queued or running; the previous index (if any) keeps serving.
    Rebuilding,
    /// Serving lookups and applying item updates.
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum RebuildPhase {
    #[default]
    Idle,
    Queued,
    Running,
}

/// Last rebuild failure and when the next attempt is allowed.
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub error: RebuildError,
    pub attempts: u32,
    pub at: DateTime<Utc>,
    pub retry_at: Instant,
}

#[derive(Debug, Default)]
pub(crate) struct RebuildState {
    pub phase: RebuildPhase,
    pub failure: Option<Failure>,
    pub last_success: Option<DateTime<Utc>>,
    pub provisional: bool,
    pub completed: u64,
}

pub(crate) struct SiteSlot {
    pub id: SiteId,
    pub root_segment: Option<String>,
    pub index: ArcSwapOption<SiteIndex>,
    pub queue: SiteQueue,
    pub rebuild: Mutex<RebuildState>,
    generation: AtomicU64,
    fetching: AtomicBool,
}

/// Holds the site's single full-fetch slot until dropped.
pub(crate) struct FetchInFlight(Arc<SiteSlot>);

impl FetchInFlight {
    pub fn site(&self) -> &str {
        &self.0.id
    }
}

impl Drop for FetchInFlight {
    fn drop(&mut self) {
        self.0.fetching.store(false, Ordering::SeqCst);
    }
}

impl SiteSlot {
    pub fn new(id: impl Into<SiteId>, root_segment: Option<String>) -> Self {
        Self {
            id: id.into(),
            root_segment,
            index: ArcSwapOption::empty(),
            queue: SiteQueue::new(),
            rebuild: Mutex::new(RebuildState::default()),
            generation: AtomicU64::new(0),
            fetching: AtomicBool::new(false),
        }
    }

    /// Claim the fetch slot; `None` while an earlier fetch has not returned.
    pub fn begin_fetch(self: &Arc<Self>) -> Option<FetchInFlight> {
        if self.fetching.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(FetchInFlight(Arc::clone(self)))
        }
    }

    pub fn current(&self) -> Option<Arc<SiteIndex>> {
        self.index.load_full()
    }

    /// Atomically replace the whole index. Readers keep whatever they loaded.
    pub fn install(&self, index: SiteIndex) {
        self.index.store(Some(Arc::new(index)));
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Bumped on every wholesale replacement of the index.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SiteState {
        let phase = self.rebuild.lock().phase;
        match (phase, self.index.load().is_some()) {
            (RebuildPhase::Queued | RebuildPhase::Running, _) => SiteState::Rebuilding,
            (RebuildPhase::Idle, true) => SiteState::Ready,
            (RebuildPhase::Idle, false) => SiteState::Absent,
        }
    }

    pub fn status(&self) -> SiteStatus {
        let state = self.state();
        let rebuild = self.rebuild.lock();
        SiteStatus {
            site: self.id.clone(),
            state,
            rules: self.current().map_or(0, |index| index.len()),
            pending_updates: self.queue.len(),
            provisional: rebuild.provisional,
            rebuilds: rebuild.completed,
            last_success: rebuild.last_success,
            last_error: rebuild.failure.as_ref().map(|f| f.error.to_string()),
            failed_attempts: rebuild.failure.as_ref().map_or(0, |f| f.attempts),
        }
    }
}

/// Snapshot of one site's maintenance state, served by the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatus {
    pub site: SiteId,
    pub state: SiteState,
    pub rules: usize,
    pub pending_updates: usize,
    pub provisional: bool,
    pub rebuilds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub failed_attempts: u32,
}
