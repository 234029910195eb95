//! Persistent segment workers driven through a two-phase barrier.
//!
//! A [`Taskset`] owns one thread per segment for its entire lifetime. Each
//! call to [`Taskset::cycle`] hands every worker its descriptor, releases
//! them all at once ("start"), and blocks until every segment has reported
//! back ("done"). Segment `i` is always processed by worker `i`, so results
//! never depend on scheduling.
//!
//! Dropping the taskset raises the stop flag; workers notice it at their
//! next start wait and exit, and the threads are joined.

use crate::error::{DeinterlaceError, Result};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

struct State<A, R> {
    /// Bumped by the dispatcher for every cycle.
    generation: u64,
    /// Per-segment descriptors, taken by their worker.
    args: Vec<Option<A>>,
    /// Per-segment results; `Err` when the worker panicked.
    results: Vec<Option<std::result::Result<R, ()>>>,
    /// Segments not yet complete in the current cycle.
    pending: usize,
    stop: bool,
}

struct Shared<A, R> {
    state: Mutex<State<A, R>>,
    start: Condvar,
    done: Condvar,
}

/// A fixed pool of segment workers.
pub struct Taskset<A, R> {
    shared: Arc<Shared<A, R>>,
    handles: Vec<JoinHandle<()>>,
    name: String,
}

impl<A, R> Taskset<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Spawn `count` workers. Worker `i` runs `work(i, descriptor)` once
    /// per cycle.
    pub fn spawn<F>(name: &str, count: usize, work: F) -> Result<Self>
    where
        F: Fn(usize, A) -> R + Send + Sync + 'static,
    {
        if count == 0 {
            return Err(DeinterlaceError::invalid_settings(
                "taskset needs at least one segment",
            ));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                generation: 0,
                args: (0..count).map(|_| None).collect(),
                results: (0..count).map(|_| None).collect(),
                pending: 0,
                stop: false,
            }),
            start: Condvar::new(),
            done: Condvar::new(),
        });
        let work = Arc::new(work);

        let mut taskset = Self {
            shared,
            handles: Vec::with_capacity(count),
            name: name.to_string(),
        };

        for segment in 0..count {
            let shared = Arc::clone(&taskset.shared);
            let work = Arc::clone(&work);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, segment))
                .spawn(move || worker_loop(&shared, segment, &*work))
                .map_err(|e| DeinterlaceError::thread_spawn(e.to_string()))?;
            taskset.handles.push(handle);
        }

        Ok(taskset)
    }

    /// Number of segments.
    pub fn count(&self) -> usize {
        self.handles.len()
    }

    /// Run one cycle: one descriptor per segment, results in segment order.
    ///
    /// # Panics
    ///
    /// Panics if `args.len()` differs from the segment count, or if a worker
    /// panicked while processing its segment.
    pub fn cycle(&self, args: Vec<A>) -> Vec<R> {
        let count = self.count();
        assert_eq!(args.len(), count, "taskset segment count mismatch");

        let mut state = self.shared.state.lock();
        for (slot, arg) in state.args.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        state.pending = count;
        state.generation = state.generation.wrapping_add(1);
        self.shared.start.notify_all();

        while state.pending > 0 {
            self.shared.done.wait(&mut state);
        }

        let mut out = Vec::with_capacity(count);
        for (segment, result) in state.results.iter_mut().enumerate() {
            match result.take() {
                Some(Ok(r)) => out.push(r),
                Some(Err(())) => panic!("{} worker for segment {} panicked", self.name, segment),
                None => panic!("{} segment {} completed without a result", self.name, segment),
            }
        }
        out
    }
}

fn worker_loop<A, R, F>(shared: &Shared<A, R>, segment: usize, work: &F)
where
    F: Fn(usize, A) -> R,
{
    debug!(segment, "segment worker started");
    let mut seen = 0u64;
    loop {
        let arg = {
            let mut state = shared.state.lock();
            while state.generation == seen && !state.stop {
                shared.start.wait(&mut state);
            }
            if state.stop {
                break;
            }
            seen = state.generation;
            state.args[segment].take()
        };

        let result = match arg {
            Some(arg) => panic::catch_unwind(AssertUnwindSafe(|| work(segment, arg))).map_err(|_| {
                error!(segment, "segment worker panicked");
            }),
            None => {
                error!(segment, "segment worker started with no work");
                Err(())
            }
        };

        let mut state = shared.state.lock();
        state.results[segment] = Some(result);
        state.pending -= 1;
        if state.pending == 0 {
            shared.done.notify_one();
        }
    }
    debug!(segment, "segment worker stopped");
}

impl<A, R> Drop for Taskset<A, R> {
    fn drop(&mut self) {
        self.shared.state.lock().stop = true;
        self.shared.start.notify_all();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!(taskset = %self.name, "segment worker exited abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_results_in_segment_order() {
        let taskset = Taskset::spawn("test", 4, |segment, base: u32| base + segment as u32).unwrap();
        assert_eq!(taskset.count(), 4);
        assert_eq!(taskset.cycle(vec![10, 10, 10, 10]), vec![10, 11, 12, 13]);
        assert_eq!(taskset.cycle(vec![0, 100, 200, 300]), vec![0, 101, 202, 303]);
    }

    #[test]
    fn test_workers_persist_across_cycles() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let taskset = Taskset::spawn("test", 3, move |_, ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::current().id()
        })
        .unwrap();

        let first = taskset.cycle(vec![(), (), ()]);
        for _ in 0..20 {
            assert_eq!(taskset.cycle(vec![(), (), ()]), first);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 63);
    }

    #[test]
    fn test_drop_joins_workers() {
        let taskset = Taskset::spawn("test", 8, |s, x: usize| s * x).unwrap();
        taskset.cycle(vec![1; 8]);
        drop(taskset);
    }

    #[test]
    fn test_zero_segments_rejected() {
        assert!(Taskset::spawn("test", 0, |_, ()| ()).is_err());
    }

    #[test]
    #[should_panic(expected = "segment count mismatch")]
    fn test_wrong_descriptor_count() {
        let taskset = Taskset::spawn("test", 2, |_, ()| ()).unwrap();
        taskset.cycle(vec![()]);
    }

    #[test]
    #[should_panic(expected = "panicked")]
    fn test_worker_panic_reported() {
        let taskset = Taskset::spawn("test", 2, |segment, ()| {
            if segment == 1 {
                panic!("boom");
            }
        })
        .unwrap();
        taskset.cycle(vec![(), ()]);
    }
}
