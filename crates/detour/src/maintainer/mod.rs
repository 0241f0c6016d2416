//! Keeps one [`SiteIndex`] per site converged with the rules source.
//!
//! # Architecture
//!
//! ```text
//!  change events ──► apply() ──► SiteQueue (per site, FIFO) ──► item pool
//!                                    │ pause/resume                 │ upsert/remove
//!                                    ▼                              ▼
//!  bootstrap / first event ──► rebuild pool ──fetch──► SiteIndex ══swap══► ArcSwap
//!                                    ▲                                      │
//!  janitor (due retries) ────────────┘                         resolve() ◄──┘
//! ```
//!
//! Per-site lifecycle: `Absent → Rebuilding → Ready → Rebuilding → ...`.
//!
//! A rebuild pauses the site's queue (waiting for an in-flight update), fetches
//! every rule with a bounded wait, builds a fresh index, swaps it in atomically
//! and resumes the queue. Updates that queued up meanwhile are replayed in
//! order. Item updates always re-read the rule from the source when they run,
//! so a replayed update applies the source's current state rather than the
//! state at the time the event was raised.

mod pool;
mod queue;
mod site;

pub use queue::ItemTask;
pub use site::{SiteState, SiteStatus};

use crate::backoff::retry_delay;
use crate::error::{IndexError, MaintainerError, RebuildError, SourceError};
use crate::events::ChangeEvent;
use crate::index::{IndexOptions, SiteIndex};
use crate::matcher::{self, Decision};
use crate::metrics;
use crate::model::{QueryParams, Rule, RuleId, RuleRecord, SiteId};
use crate::source::RuleSource;
use chrono::{DateTime, Utc};
use crossbeam::channel::{bounded, unbounded, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use pool::WorkerPool;
use site::{Failure, RebuildPhase, SiteSlot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Item updates re-run when a rebuild swapped the index underneath them.
const MAX_ITEM_ATTEMPTS: u32 = 3;

/// Runtime configuration of the maintainer.
#[derive(Clone, Debug)]
pub struct MaintainerConfig {
    /// Threads draining per-site item queues.
    pub item_workers: usize,
    /// Rebuild threads; `None` means one per known site.
    pub site_workers: Option<usize>,
    /// Bounded wait for a full-site fetch (and for an in-flight item update).
    pub rebuild_timeout: Duration,
    /// How long a missing rules source is trusted before retrying.
    pub missing_source_retry: Duration,
    pub retry_base: Duration,
    pub retry_max: Duration,
    /// How often the janitor looks for due retries.
    pub janitor_interval: Duration,
    pub index_options: IndexOptions,
}

impl Default for MaintainerConfig {
    fn default() -> Self {
        Self {
            item_workers: 4,
            site_workers: None,
            rebuild_timeout: Duration::from_secs(30),
            missing_source_retry: Duration::from_secs(4 * 60 * 60),
            retry_base: Duration::from_secs(1),
            retry_max: Duration::from_secs(300),
            janitor_interval: Duration::from_secs(1),
            index_options: IndexOptions::default(),
        }
    }
}

/// A site known at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSpec {
    pub id: SiteId,
    /// Lowercased and prepended to every rule source of the site.
    pub root_segment: Option<String>,
}

impl SiteSpec {
    pub fn new(id: impl Into<SiteId>) -> Self {
        Self {
            id: id.into(),
            root_segment: None,
        }
    }

    pub fn with_root_segment(mut self, segment: impl Into<String>) -> Self {
        self.root_segment = Some(segment.into());
        self
    }
}

/// Result of asking for a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildRequest {
    Scheduled,
    /// A rebuild for the site is already queued or running and will satisfy this one.
    Collapsed,
    /// The site failed recently and its retry window has not elapsed.
    RateLimited,
}

/// Result of applying a change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Queued { site: SiteId },
    /// The site had no index yet; a rebuild was requested as well.
    QueuedWithRebuild { site: SiteId, rebuild: RebuildRequest },
    /// The rule resolved to no configured site; the event was dropped.
    Orphaned,
}

struct Shared {
    config: MaintainerConfig,
    source: Arc<dyn RuleSource>,
    sites: DashMap<SiteId, Arc<SiteSlot>>,
    item_tx: Sender<Arc<SiteSlot>>,
    rebuild_tx: Sender<Arc<SiteSlot>>,
    shut_down: AtomicBool,
}

/// Owner of every site's index and of the two worker pools that maintain them.
pub struct IndexMaintainer {
    shared: Arc<Shared>,
    item_pool: Mutex<WorkerPool<Arc<SiteSlot>>>,
    rebuild_pool: Mutex<WorkerPool<Arc<SiteSlot>>>,
    janitor: Mutex<Option<JoinHandle<()>>>,
    janitor_stop: Sender<()>,
}

impl IndexMaintainer {
    pub fn new(
        config: MaintainerConfig,
        source: Arc<dyn RuleSource>,
        sites: Vec<SiteSpec>,
    ) -> Result<Self, MaintainerError> {
        let rebuild_workers = config.site_workers.unwrap_or(sites.len()).max(1);
        let item_workers = config.item_workers.max(1);
        info!(
            "Starting index maintainer: {} sites, {} item workers, {} rebuild workers",
            sites.len(),
            item_workers,
            rebuild_workers
        );

        let (item_tx, item_rx) = unbounded();
        let (rebuild_tx, rebuild_rx) = unbounded();
        let janitor_interval = config.janitor_interval;

        let shared = Arc::new(Shared {
            config,
            source,
            sites: DashMap::new(),
            item_tx,
            rebuild_tx,
            shut_down: AtomicBool::new(false),
        });
        for spec in sites {
            let slot = SiteSlot::new(spec.id.clone(), spec.root_segment);
            shared.sites.insert(spec.id, Arc::new(slot));
        }

        let item_pool = {
            let shared = Arc::clone(&shared);
            WorkerPool::spawn("detour-item", item_workers, item_rx, move |slot| {
                shared.drain_items(&slot)
            })?
        };
        let rebuild_pool = {
            let shared = Arc::clone(&shared);
            WorkerPool::spawn("detour-rebuild", rebuild_workers, rebuild_rx, move |slot| {
                shared.run_rebuild(&slot)
            })?
        };

        let (janitor_stop, stop_rx) = bounded::<()>(1);
        let janitor = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("detour-janitor".to_string())
                .spawn(move || loop {
                    match stop_rx.recv_timeout(janitor_interval) {
                        Err(RecvTimeoutError::Timeout) => shared.retry_due(),
                        _ => break,
                    }
                })?
        };

        Ok(Self {
            shared,
            item_pool: Mutex::new(item_pool),
            rebuild_pool: Mutex::new(rebuild_pool),
            janitor: Mutex::new(Some(janitor)),
            janitor_stop,
        })
    }

    /// Resolve a request for `site` against the currently installed index.
    ///
    /// Never blocks on maintenance; an unknown or not yet built site yields `None`.
    pub fn resolve(&self, site: &str, path: &str, query: &QueryParams) -> Decision {
        self.resolve_at(site, path, query, Utc::now())
    }

    pub fn resolve_at(
        &self,
        site: &str,
        path: &str,
        query: &QueryParams,
        now: DateTime<Utc>,
    ) -> Decision {
        match self.index(site) {
            Some(index) => matcher::resolve(&index, path, query, now),
            None => Decision::None,
        }
    }

    /// Route a change event to its site's queue, rebuilding the site first if it has no index.
    ///
    /// Only configured sites are maintained; events for any other site are orphans.
    pub fn apply(&self, event: ChangeEvent) -> Result<ApplyOutcome, MaintainerError> {
        self.shared.ensure_running()?;

        let Some(slot) = self.shared.event_slot(&event) else {
            metrics::record_orphan_event();
            return Ok(ApplyOutcome::Orphaned);
        };
        let site = slot.id.clone();
        debug!(
            "Queueing {} update for rule {} on site {}",
            event.kind.as_str(),
            event.rule_id,
            site
        );
        if slot.queue.push(ItemTask::new(event.rule_id, event.kind)) {
            self.shared.schedule_items(&slot);
        }

        if slot.current().is_none() {
            let rebuild = self.shared.request_rebuild(&slot, false)?;
            return Ok(ApplyOutcome::QueuedWithRebuild { site, rebuild });
        }
        Ok(ApplyOutcome::Queued { site })
    }

    /// Request a rebuild, honouring the failure retry window.
    pub fn trigger_rebuild(&self, site: &str) -> Result<RebuildRequest, MaintainerError> {
        let slot = self.shared.known_slot(site)?;
        self.shared.request_rebuild(&slot, false)
    }

    /// Request a rebuild regardless of recent failures.
    pub fn force_rebuild(&self, site: &str) -> Result<RebuildRequest, MaintainerError> {
        let slot = self.shared.known_slot(site)?;
        self.shared.request_rebuild(&slot, true)
    }

    /// Rebuild every known site, e.g. at bootstrap. Returns how many were scheduled.
    pub fn prewarm(&self) -> Result<usize, MaintainerError> {
        let mut scheduled = 0;
        for site in self.sites() {
            if self.force_rebuild(&site)? == RebuildRequest::Scheduled {
                scheduled += 1;
            }
        }
        info!("Pre-warming redirect indexes for {} sites", scheduled);
        Ok(scheduled)
    }

    /// Install an index restored from a snapshot, unless the site already has one.
    ///
    /// The index is marked provisional until the next successful rebuild.
    /// Sites that are not configured are ignored.
    pub fn install_provisional(&self, site: &str, index: SiteIndex) -> bool {
        let Ok(slot) = self.shared.known_slot(site) else {
            warn!("Ignoring saved index for unconfigured site {}", site);
            return false;
        };
        let mut rebuild = slot.rebuild.lock();
        if slot.current().is_some() || rebuild.phase != RebuildPhase::Idle {
            return false;
        }
        metrics::set_indexed_rules(site, index.len());
        slot.install(index);
        rebuild.provisional = true;
        true
    }

    pub fn index(&self, site: &str) -> Option<Arc<SiteIndex>> {
        self.shared.sites.get(site).and_then(|slot| slot.current())
    }

    pub fn state(&self, site: &str) -> SiteState {
        self.shared
            .sites
            .get(site)
            .map_or(SiteState::Absent, |slot| slot.state())
    }

    pub fn sites(&self) -> Vec<SiteId> {
        let mut sites: Vec<SiteId> = self.shared.sites.iter().map(|e| e.key().clone()).collect();
        sites.sort();
        sites
    }

    pub fn site_status(&self, site: &str) -> Option<SiteStatus> {
        self.shared.sites.get(site).map(|slot| slot.status())
    }

    pub fn status(&self) -> Vec<SiteStatus> {
        let mut statuses: Vec<SiteStatus> = self
            .shared
            .sites
            .iter()
            .map(|entry| entry.value().status())
            .collect();
        statuses.sort_by(|a, b| a.site.cmp(&b.site));
        statuses
    }

    pub fn config(&self) -> &MaintainerConfig {
        &self.shared.config
    }

    pub fn item_worker_count(&self) -> usize {
        self.item_pool.lock().worker_count()
    }

    pub fn rebuild_worker_count(&self) -> usize {
        self.rebuild_pool.lock().worker_count()
    }

    /// True when no rebuild is pending and every queue is drained.
    pub fn is_idle(&self) -> bool {
        let pools_idle = {
            let items = self.item_pool.lock();
            let rebuilds = self.rebuild_pool.lock();
            items.active_jobs() == 0
                && items.queued_jobs() == 0
                && rebuilds.active_jobs() == 0
                && rebuilds.queued_jobs() == 0
        };
        pools_idle
            && self.shared.sites.iter().all(|entry| {
                let slot = entry.value();
                slot.rebuild.lock().phase == RebuildPhase::Idle && slot.queue.is_idle()
            })
    }

    /// Poll until [`Self::is_idle`] or the timeout elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.is_idle() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.is_idle()
    }

    /// Stop the janitor and both pools, waiting for in-flight work.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down index maintainer");
        let _ = self.janitor_stop.try_send(());
        if let Some(handle) = self.janitor.lock().take() {
            let _ = handle.join();
        }
        self.rebuild_pool.lock().shutdown();
        self.item_pool.lock().shutdown();
    }
}

impl Drop for IndexMaintainer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn ensure_running(&self) -> Result<(), MaintainerError> {
        if self.shut_down.load(Ordering::SeqCst) {
            Err(MaintainerError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn known_slot(&self, site: &str) -> Result<Arc<SiteSlot>, MaintainerError> {
        self.sites
            .get(site)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| MaintainerError::UnknownSite(site.to_string()))
    }

    /// Configured site an event belongs to, logging why when there is none.
    fn event_slot(&self, event: &ChangeEvent) -> Option<Arc<SiteSlot>> {
        let site = match &event.site_id {
            Some(site) => site.clone(),
            None => match self.locate(event) {
                Some(site) => site,
                None => {
                    error!(
                        "No site found for rule {}, dropping {} event",
                        event.rule_id,
                        event.kind.as_str()
                    );
                    return None;
                }
            },
        };
        match self.sites.get(&site) {
            Some(slot) => Some(Arc::clone(slot.value())),
            None => {
                error!(
                    "Rule {} belongs to unconfigured site {}, dropping {} event",
                    event.rule_id,
                    site,
                    event.kind.as_str()
                );
                None
            }
        }
    }

    /// Site of an event without one: loaded indexes first, then the source.
    fn locate(&self, event: &ChangeEvent) -> Option<SiteId> {
        let id = RuleId::new(event.rule_id.as_str());
        let loaded = self
            .sites
            .iter()
            .find(|entry| entry.value().current().is_some_and(|index| index.contains(&id)))
            .map(|entry| entry.key().clone());
        if loaded.is_some() {
            return loaded;
        }
        match self.source.locate_rule(&event.rule_id) {
            Ok(site) => site,
            Err(e) => {
                warn!("Could not locate rule {} in rules source: {}", event.rule_id, e);
                None
            }
        }
    }

    fn schedule_items(&self, slot: &Arc<SiteSlot>) {
        if self.item_tx.send(Arc::clone(slot)).is_err() {
            warn!("Item pool is gone; updates for site {} stay queued", slot.id);
        }
    }

    fn request_rebuild(
        &self,
        slot: &Arc<SiteSlot>,
        force: bool,
    ) -> Result<RebuildRequest, MaintainerError> {
        self.ensure_running()?;

        let mut rebuild = slot.rebuild.lock();
        if rebuild.phase != RebuildPhase::Idle {
            debug!("Rebuild for site {} already pending", slot.id);
            return Ok(RebuildRequest::Collapsed);
        }
        if !force {
            if let Some(failure) = &rebuild.failure {
                if failure.retry_at > Instant::now() {
                    debug!(
                        "Rebuild for site {} rate limited after {} failures",
                        slot.id, failure.attempts
                    );
                    return Ok(RebuildRequest::RateLimited);
                }
            }
        }
        rebuild.phase = RebuildPhase::Queued;
        drop(rebuild);

        if self.rebuild_tx.send(Arc::clone(slot)).is_err() {
            slot.rebuild.lock().phase = RebuildPhase::Idle;
            return Err(MaintainerError::ShutDown);
        }
        Ok(RebuildRequest::Scheduled)
    }

    fn retry_due(&self) {
        let now = Instant::now();
        let due: Vec<Arc<SiteSlot>> = self
            .sites
            .iter()
            .filter(|entry| {
                let rebuild = entry.value().rebuild.lock();
                rebuild.phase == RebuildPhase::Idle
                    && rebuild.failure.as_ref().is_some_and(|f| f.retry_at <= now)
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for slot in due {
            debug!("Retrying rebuild for site {}", slot.id);
            let _ = self.request_rebuild(&slot, false);
        }
    }

    // ------------------------------------------------------------------
    // Item updates
    // ------------------------------------------------------------------

    fn drain_items(&self, slot: &Arc<SiteSlot>) {
        while let Some(task) = slot.queue.next() {
            if self.shut_down.load(Ordering::SeqCst) {
                continue;
            }
            self.run_item(slot, &task);
        }
    }

    fn run_item(&self, slot: &Arc<SiteSlot>, task: &ItemTask) {
        let started = Instant::now();
        for attempt in 1..=MAX_ITEM_ATTEMPTS {
            let generation = slot.generation();
            let outcome = self.apply_item(slot, task);
            if slot.generation() == generation || attempt == MAX_ITEM_ATTEMPTS {
                debug!(
                    "Item update for rule {} on site {}: {} in {:?} (queued {:?})",
                    task.rule_id,
                    slot.id,
                    outcome,
                    started.elapsed(),
                    started.duration_since(task.enqueued_at)
                );
                metrics::record_item_update(outcome);
                return;
            }
            debug!(
                "Index for site {} replaced during update of rule {}, re-running",
                slot.id, task.rule_id
            );
        }
    }

    fn apply_item(&self, slot: &Arc<SiteSlot>, task: &ItemTask) -> &'static str {
        let fetched = self.source.fetch_rule_by_id(&slot.id, &task.rule_id);

        let Some(index) = slot.current() else {
            debug!(
                "Site {} has no index yet; rule {} is left to its rebuild",
                slot.id, task.rule_id
            );
            return "deferred";
        };
        let id = RuleId::new(task.rule_id.as_str());

        let outcome = match fetched {
            Ok(Some(record)) => match Rule::from_record(record, slot.root_segment.as_deref()) {
                Ok(rule) => match index.upsert(rule) {
                    Ok(()) => "upserted",
                    Err(e @ IndexError::InvalidPattern { .. }) => {
                        warn!("Site {}: {}", slot.id, e);
                        "skipped"
                    }
                    Err(e) => {
                        error!("Site {}: {}; rebuilding its index", slot.id, e);
                        let _ = self.request_rebuild(slot, true);
                        "failed"
                    }
                },
                Err(e) => {
                    debug!("Site {}: {}; removing rule", slot.id, e);
                    index.remove(&id);
                    "removed"
                }
            },
            Ok(None) => {
                index.remove(&id);
                "removed"
            }
            Err(e) if task.kind.is_removal() => {
                debug!(
                    "Source lookup for removed rule {} failed ({}); removing anyway",
                    task.rule_id, e
                );
                index.remove(&id);
                "removed"
            }
            Err(e) => {
                warn!(
                    "Item update for rule {} on site {} failed: {}",
                    task.rule_id, slot.id, e
                );
                let _ = self.request_rebuild(slot, false);
                "failed"
            }
        };
        metrics::set_indexed_rules(&slot.id, index.len());
        outcome
    }

    // ------------------------------------------------------------------
    // Rebuilds
    // ------------------------------------------------------------------

    fn run_rebuild(&self, slot: &Arc<SiteSlot>) {
        if self.shut_down.load(Ordering::SeqCst) {
            slot.rebuild.lock().phase = RebuildPhase::Idle;
            return;
        }
        slot.rebuild.lock().phase = RebuildPhase::Running;
        let started = Instant::now();

        if !slot.queue.pause(self.config.rebuild_timeout) {
            warn!(
                "Item update on site {} still running after {:?}; rebuilding anyway",
                slot.id, self.config.rebuild_timeout
            );
        }

        let outcome = match self.fetch_with_deadline(slot) {
            Ok(records) => match self.install_rebuilt(slot, records, started) {
                Ok(()) => "success",
                Err(error) => {
                    self.record_failure(slot, error.into());
                    "rejected"
                }
            },
            Err(error @ SourceError::NotFound(_)) => {
                // a site without a source serves no redirects instead of failing requests
                slot.install(SiteIndex::new(self.config.index_options));
                metrics::set_indexed_rules(&slot.id, 0);
                self.record_failure(slot, error.into());
                "missing"
            }
            Err(error) => {
                self.record_failure(slot, error.into());
                "failed"
            }
        };
        metrics::record_rebuild(&slot.id, outcome, started.elapsed());

        let mut rebuild = slot.rebuild.lock();
        rebuild.phase = RebuildPhase::Idle;
        if slot.queue.resume() {
            self.schedule_items(slot);
        }
    }

    /// Run the fetch on a helper thread so an unresponsive source cannot hold
    /// the site's queue paused past the rebuild timeout.
    ///
    /// A fetch that outlived its deadline keeps the site's fetch slot until the
    /// source returns; no second fetch is started for the site meanwhile.
    fn fetch_with_deadline(&self, slot: &Arc<SiteSlot>) -> Result<Vec<RuleRecord>, SourceError> {
        let Some(in_flight) = slot.begin_fetch() else {
            return Err(SourceError::Unavailable(
                "previous fetch has not returned yet".to_string(),
            ));
        };
        let (tx, rx) = bounded(1);
        let source = Arc::clone(&self.source);
        thread::Builder::new()
            .name(format!("detour-fetch-{}", slot.id))
            .spawn(move || {
                let result = source.fetch_rules_for_site(in_flight.site());
                drop(in_flight);
                let _ = tx.send(result);
            })
            .map_err(|e| SourceError::Unavailable(format!("cannot spawn fetch thread: {e}")))?;

        match rx.recv_timeout(self.config.rebuild_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(SourceError::Unavailable(format!(
                "fetch timed out after {:?}",
                self.config.rebuild_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(SourceError::Unavailable("fetch thread panicked".to_string()))
            }
        }
    }

    /// Build and install a fresh index. An index failing its consistency check
    /// is never installed; the previous one keeps serving.
    fn install_rebuilt(
        &self,
        slot: &Arc<SiteSlot>,
        records: Vec<RuleRecord>,
        started: Instant,
    ) -> Result<(), IndexError> {
        let total = records.len();
        let rules: Vec<Rule> = records
            .into_iter()
            .filter_map(|record| match Rule::from_record(record, slot.root_segment.as_deref()) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    debug!("Site {}: skipping record: {}", slot.id, e);
                    None
                }
            })
            .collect();

        let (index, errors) = SiteIndex::build(rules, self.config.index_options);
        for e in &errors {
            warn!("Site {}: {}", slot.id, e);
        }
        self.commit_rebuilt(slot, index, total, started)
    }

    fn commit_rebuilt(
        &self,
        slot: &Arc<SiteSlot>,
        index: SiteIndex,
        total: usize,
        started: Instant,
    ) -> Result<(), IndexError> {
        index.check_invariants()?;

        let count = index.len();
        slot.install(index);
        {
            let mut rebuild = slot.rebuild.lock();
            rebuild.failure = None;
            rebuild.last_success = Some(Utc::now());
            rebuild.provisional = false;
            rebuild.completed += 1;
        }
        metrics::set_indexed_rules(&slot.id, count);
        info!(
            "Rebuilt redirect index for site {}: {} rules active, {} skipped, in {:?}",
            slot.id,
            count,
            total.saturating_sub(count),
            started.elapsed()
        );
        Ok(())
    }

    fn record_failure(&self, slot: &Arc<SiteSlot>, error: RebuildError) {
        let mut rebuild = slot.rebuild.lock();
        let repeated = rebuild.failure.as_ref().is_some_and(|f| f.error == error);
        let attempts = rebuild.failure.as_ref().map_or(0, |f| f.attempts) + 1;

        let missing = matches!(error, RebuildError::Source(SourceError::NotFound(_)));
        let delay = if missing {
            self.config.missing_source_retry
        } else {
            retry_delay(attempts, self.config.retry_base, self.config.retry_max)
        };

        if repeated {
            debug!(
                "Rebuild for site {} failed again ({} attempts): {}; next retry in {:?}",
                slot.id, attempts, error, delay
            );
        } else if missing {
            error!(
                "No rules source for site {}; serving no redirects, retrying in {:?}",
                slot.id, delay
            );
        } else {
            warn!(
                "Rebuild for site {} failed: {}; keeping previous index, retrying in {:?}",
                slot.id, error, delay
            );
        }

        rebuild.failure = Some(Failure {
            error,
            attempts,
            at: Utc::now(),
            retry_at: Instant::now() + delay,
        });
    }
}
