//! Per-key coalescing of concurrent cache misses.
//!
//! The first caller for a key becomes the leader and computes; callers
//! arriving while the flight is pending block until the leader
//! finishes. A leader that fails (or is dropped mid-flight) releases
//! followers with no value; a follower whose deadline expires gets
//! [`JoinOutcome::TimedOut`] and nothing is cached for it.

use crate::engine::Deadline;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug)]
enum Status {
    Pending,
    Done(Option<String>),
}

#[derive(Debug)]
struct FlightState {
    status: Mutex<Status>,
    cv: Condvar,
}

impl FlightState {
    fn new() -> Self {
        Self {
            status: Mutex::new(Status::Pending),
            cv: Condvar::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SingleFlight {
    flights: Arc<DashMap<String, Arc<FlightState>>>,
}

pub enum JoinOutcome {
    /// This caller computes; it must call [`FlightGuard::complete`].
    Leader(FlightGuard),
    /// Another caller computed; the payload is its serialized result,
    /// or `None` if it failed.
    Follower(Option<String>),
    /// The deadline expired while waiting.
    TimedOut,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, key: &str, deadline: Deadline) -> JoinOutcome {
        let state = match self.flights.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                let state = Arc::new(FlightState::new());
                vacant.insert(state.clone());
                return JoinOutcome::Leader(FlightGuard {
                    key: key.to_string(),
                    state,
                    flights: Arc::clone(&self.flights),
                    finished: false,
                });
            }
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
        };

        let mut status = state.status.lock().expect("flight mutex poisoned");
        loop {
            match &*status {
                Status::Done(value) => return JoinOutcome::Follower(value.clone()),
                Status::Pending => match deadline.remaining() {
                    None => {
                        status = state.cv.wait(status).expect("flight mutex poisoned");
                    }
                    Some(wait) if wait.is_zero() => return JoinOutcome::TimedOut,
                    Some(wait) => {
                        let (guard, timeout) = state
                            .cv
                            .wait_timeout(status, wait)
                            .expect("flight mutex poisoned");
                        status = guard;
                        if timeout.timed_out() && matches!(*status, Status::Pending) {
                            return JoinOutcome::TimedOut;
                        }
                    }
                },
            }
        }
    }
}

/// Leadership of one in-flight computation. Dropping the guard without
/// completing releases followers empty-handed.
pub struct FlightGuard {
    key: String,
    state: Arc<FlightState>,
    flights: Arc<DashMap<String, Arc<FlightState>>>,
    finished: bool,
}

impl FlightGuard {
    pub fn complete(mut self, value: Option<String>) {
        self.finish(value);
    }

    fn finish(&mut self, value: Option<String>) {
        if self.finished {
            return;
        }
        self.finished = true;
        *self.state.status.lock().expect("flight mutex poisoned") = Status::Done(value);
        self.state.cv.notify_all();
        self.flights.remove(&self.key);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.finish(None);
    }
}
