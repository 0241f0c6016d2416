//! Per-site serial queue of item updates.
//!
//! A queue is *scheduled* when it has been handed to the item pool and a
//! worker owns draining it; at most one worker drains a given site, which is
//! what makes updates for one site strictly FIFO while different sites run in
//! parallel.
//!
//! ```text
//!   push ──► [t1, t2, t3] ──► worker (one per site at a time)
//!                 ▲
//!   pause ────────┘  (rebuild: stop handing out tasks, wait for in-flight one)
//!   resume ──► reschedule if backlog is non-empty
//! ```

use crate::events::ChangeKind;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One queued change for a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemTask {
    pub rule_id: String,
    pub kind: ChangeKind,
    pub enqueued_at: Instant,
}

impl ItemTask {
    pub fn new(rule_id: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            rule_id: rule_id.into(),
            kind,
            enqueued_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<ItemTask>,
    paused: bool,
    scheduled: bool,
    running: bool,
}

#[derive(Debug, Default)]
pub struct SiteQueue {
    state: Mutex<QueueState>,
    idle: Condvar,
}

impl SiteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. Returns `true` when the caller must hand the queue to the pool.
    pub fn push(&self, task: ItemTask) -> bool {
        let mut state = self.state.lock();
        state.tasks.push_back(task);
        Self::claim_schedule(&mut state)
    }

    /// Next task for the worker currently draining this queue.
    ///
    /// `None` releases the queue: it is no longer scheduled and no task is in flight.
    pub fn next(&self) -> Option<ItemTask> {
        let mut state = self.state.lock();
        let task = if state.paused {
            None
        } else {
            state.tasks.pop_front()
        };
        match task {
            Some(task) => {
                state.running = true;
                Some(task)
            }
            None => {
                state.running = false;
                state.scheduled = false;
                self.idle.notify_all();
                None
            }
        }
    }

    /// Stop handing out tasks and wait up to `timeout` for the in-flight one.
    ///
    /// Returns `false` if a task was still running when the wait expired.
    pub fn pause(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        state.paused = true;
        while state.running {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return !state.running;
            }
        }
        true
    }

    /// Resume handing out tasks. Returns `true` when the caller must reschedule.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        state.paused = false;
        Self::claim_schedule(&mut state)
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }

    /// No backlog, no worker assigned and nothing in flight.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.tasks.is_empty() && !state.scheduled && !state.running
    }

    fn claim_schedule(state: &mut QueueState) -> bool {
        if state.paused || state.scheduled || state.tasks.is_empty() {
            return false;
        }
        state.scheduled = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn task(id: &str) -> ItemTask {
        ItemTask::new(id, ChangeKind::Modified)
    }

    #[test]
    fn test_push_schedules_once() {
        let queue = SiteQueue::new();
        assert!(queue.push(task("1")));
        assert!(!queue.push(task("2")));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_fifo_drain_releases_schedule() {
        let queue = SiteQueue::new();
        queue.push(task("1"));
        queue.push(task("2"));

        assert_eq!(queue.next().map(|t| t.rule_id), Some("1".to_string()));
        assert_eq!(queue.next().map(|t| t.rule_id), Some("2".to_string()));
        assert!(queue.next().is_none());
        assert!(queue.is_idle());
        assert!(queue.push(task("3")));
    }

    #[test]
    fn test_paused_queue_keeps_backlog() {
        let queue = SiteQueue::new();
        assert!(queue.pause(Duration::from_millis(10)));
        assert!(!queue.push(task("1")));
        assert!(!queue.push(task("2")));
        assert!(queue.is_paused());
        assert_eq!(queue.len(), 2);

        assert!(queue.resume());
        assert_eq!(queue.next().map(|t| t.rule_id), Some("1".to_string()));
    }

    #[test]
    fn test_pause_stops_worker_between_tasks() {
        let queue = SiteQueue::new();
        queue.push(task("1"));
        queue.push(task("2"));

        assert!(queue.next().is_some());
        queue.state.lock().paused = true;
        assert!(queue.next().is_none());
        assert_eq!(queue.len(), 1);
        // resume reschedules because the worker released the queue
        assert!(queue.resume());
    }

    #[test]
    fn test_pause_waits_for_in_flight_task() {
        let queue = Arc::new(SiteQueue::new());
        queue.push(task("1"));
        let in_flight = queue.next().unwrap();

        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                drop(in_flight);
                queue.next()
            })
        };

        let started = Instant::now();
        assert!(queue.pause(Duration::from_secs(5)));
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(worker.join().unwrap().is_none());
    }

    #[test]
    fn test_pause_times_out() {
        let queue = SiteQueue::new();
        queue.push(task("1"));
        let _in_flight = queue.next().unwrap();
        assert!(!queue.pause(Duration::from_millis(20)));
    }
}
