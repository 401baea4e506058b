// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet},
    sync::{Arc, Condvar, Mutex},
    thread,
    time::{Duration, Instant},
};

use dd_trace::dd_error;

/// Runs recurring tasks on one dedicated worker thread.
///
/// Tasks fire from a priority queue of deadlines; callbacks run serially on
/// the worker, so no two callbacks ever overlap. Cancellation is synchronous:
/// [`CancelToken::cancel`] returns only after any in-flight invocation of the
/// cancelled callback has returned.
pub struct EventScheduler {
    shared: Arc<SchedulerShared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    condvar: Condvar,
}

struct SchedulerState {
    queue: BinaryHeap<Reverse<(Instant, u64)>>,
    tasks: HashMap<u64, TaskEntry>,
    cancelled: HashSet<u64>,
    running: Option<u64>,
    shutdown: bool,
    next_id: u64,
}

struct TaskEntry {
    interval: Duration,
    // Taken out while the callback runs on the worker
    callback: Option<Box<dyn FnMut() + Send>>,
}

/// Handle to a scheduled task.
///
/// Dropping the token does NOT cancel the task; call [`CancelToken::cancel`].
pub struct CancelToken {
    id: u64,
    shared: Arc<SchedulerShared>,
}

impl CancelToken {
    /// Cancels the task, blocking until any in-flight invocation returns.
    ///
    /// Must not be called from inside the task's own callback.
    pub fn cancel(self) {
        let mut state = self.shared.state.lock().unwrap();
        state.cancelled.insert(self.id);
        if state.running != Some(self.id) {
            state.tasks.remove(&self.id);
        }
        while state.running == Some(self.id) {
            state = self.shared.condvar.wait(state).unwrap();
        }
    }
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventScheduler {
    pub fn new() -> Self {
        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(SchedulerState {
                queue: BinaryHeap::new(),
                tasks: HashMap::new(),
                cancelled: HashSet::new(),
                running: None,
                shutdown: false,
                next_id: 0,
            }),
            condvar: Condvar::new(),
        });

        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("dd-trace-scheduler".to_string())
                .spawn(move || run_worker(&shared))
                .expect("failed to spawn the scheduler thread")
        };

        EventScheduler {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Schedules `callback` to run every `interval`, first firing one
    /// interval from now.
    pub fn schedule_recurring(
        &self,
        interval: Duration,
        callback: Box<dyn FnMut() + Send>,
    ) -> CancelToken {
        let mut state = self.shared.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.tasks.insert(
            id,
            TaskEntry {
                interval,
                callback: Some(callback),
            },
        );
        state.queue.push(Reverse((Instant::now() + interval, id)));
        drop(state);
        self.shared.condvar.notify_all();

        CancelToken {
            id,
            shared: self.shared.clone(),
        }
    }

    /// Stops the worker and joins it. Queued tasks stop firing; an in-flight
    /// callback finishes first.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
        }
        self.shared.condvar.notify_all();

        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                dd_error!("EventScheduler.shutdown: worker panicked");
            }
        }
    }
}

impl Drop for EventScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &SchedulerShared) {
    loop {
        let mut state = shared.state.lock().unwrap();
        if state.shutdown {
            break;
        }

        let next = state.queue.peek().copied();
        let Some(Reverse((fire_at, id))) = next else {
            let _unused = shared.condvar.wait(state).unwrap();
            continue;
        };

        let now = Instant::now();
        if fire_at > now {
            let (_unused, _timeout) = shared
                .condvar
                .wait_timeout(state, fire_at - now)
                .unwrap();
            continue;
        }

        state.queue.pop();
        if state.cancelled.remove(&id) {
            state.tasks.remove(&id);
            continue;
        }
        let Some(entry) = state.tasks.get_mut(&id) else {
            continue;
        };
        let Some(mut callback) = entry.callback.take() else {
            continue;
        };
        let interval = entry.interval;
        state.running = Some(id);
        drop(state);

        callback();

        let mut state = shared.state.lock().unwrap();
        state.running = None;
        if state.cancelled.remove(&id) {
            state.tasks.remove(&id);
        } else if let Some(entry) = state.tasks.get_mut(&id) {
            entry.callback = Some(callback);
            state.queue.push(Reverse((fire_at + interval, id)));
        }
        drop(state);
        shared.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::{Duration, Instant},
    };

    use super::EventScheduler;

    #[test]
    fn test_recurring_task_fires_repeatedly() {
        let scheduler = EventScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let token = {
            let fired = fired.clone();
            scheduler.schedule_recurring(
                Duration::from_millis(10),
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while fired.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(fired.load(Ordering::SeqCst) >= 3);
        token.cancel();
    }

    #[test]
    fn test_cancel_stops_firing() {
        let scheduler = EventScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let token = {
            let fired = fired.clone();
            scheduler.schedule_recurring(
                Duration::from_millis(5),
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            )
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while fired.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }

        token.cancel();
        let count_after_cancel = fired.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), count_after_cancel);
    }

    #[test]
    fn test_cancel_waits_for_in_flight_callback() {
        let scheduler = EventScheduler::new();
        let in_callback = Arc::new(Mutex::new(false));

        let token = {
            let in_callback = in_callback.clone();
            scheduler.schedule_recurring(
                Duration::from_millis(1),
                Box::new(move || {
                    *in_callback.lock().unwrap() = true;
                    std::thread::sleep(Duration::from_millis(50));
                    *in_callback.lock().unwrap() = false;
                }),
            )
        };

        // Let the callback start
        let deadline = Instant::now() + Duration::from_secs(5);
        while !*in_callback.lock().unwrap() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        token.cancel();
        // Synchronous cancellation: the callback is not running anymore
        assert!(!*in_callback.lock().unwrap());
    }

    #[test]
    fn test_tasks_run_serially() {
        let scheduler = EventScheduler::new();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(AtomicUsize::new(0));

        let mut tokens = Vec::new();
        for _ in 0..4 {
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            let fired = fired.clone();
            tokens.push(scheduler.schedule_recurring(
                Duration::from_millis(5),
                Box::new(move || {
                    let current = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(current, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            ));
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while fired.load(Ordering::SeqCst) < 8 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        for token in tokens {
            token.cancel();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(fired.load(Ordering::SeqCst) >= 8);
    }

    #[test]
    fn test_shutdown_joins_worker() {
        let scheduler = EventScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = fired.clone();
            scheduler.schedule_recurring(
                Duration::from_millis(1),
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        scheduler.shutdown();
        let count = fired.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), count);
    }
}
