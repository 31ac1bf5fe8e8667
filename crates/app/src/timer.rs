//! Restartable one-shot and recurring timers.
//!
//! A [`Timer`] owns at most one tokio task. Arming spawns the task, which
//! sleeps for the interval and then runs the action; restarting aborts the
//! pending task and spawns a fresh one. Every arm bumps a generation
//! counter that is handed to the action, so a consumer can tell a firing
//! that was already in flight when the timer was restarted from a current
//! one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::task::JoinHandle;

use rulehub_domain::schedule::ScheduleSpec;

type Action = Arc<dyn Fn(u64) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// When a timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interval {
    /// Once, after a fixed delay.
    After(Duration),
    /// On every occurrence of a local wall-clock schedule.
    Schedule(ScheduleSpec),
}

/// The occurrence of `spec` strictly after `last`, and how long from `now`
/// until it. `last` is the previous occurrence, never the clock, so an
/// occurrence fires once even when the clock reads behind it.
fn next_occurrence<Tz: TimeZone>(
    spec: &ScheduleSpec,
    last: &DateTime<Tz>,
    now: &DateTime<Tz>,
) -> Option<(DateTime<Tz>, Duration)> {
    let next = spec.next_after(last)?;
    let delay = (next.clone() - now.clone()).to_std().unwrap_or_default();
    Some((next, delay))
}

/// A cancellable, restartable deferred action.
///
/// Dropping a timer cancels it.
pub struct Timer {
    interval: Interval,
    action: Option<Action>,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    #[must_use]
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            action: None,
            generation: 0,
            handle: None,
        }
    }

    /// Replace the interval. Takes effect on the next arm.
    pub fn set_interval(&mut self, interval: Interval) {
        self.interval = interval;
    }

    /// Replace the action run on expiry. Takes effect on the next arm.
    ///
    /// The action receives the generation of the arm that fired.
    pub fn action<F, Fut>(&mut self, action: F)
    where
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: Action = Arc::new(
            move |generation| -> Pin<Box<dyn Future<Output = ()> + Send>> {
                Box::pin(action(generation))
            },
        );
        self.action = Some(action);
    }

    /// Arm the timer unless it is already armed.
    ///
    /// Returns the generation of the pending firing.
    pub fn start(&mut self) -> u64 {
        if !self.is_armed() {
            self.arm();
        }
        self.generation
    }

    /// Cancel any pending firing and arm again with the same interval.
    ///
    /// Returns the generation of the new firing.
    pub fn restart(&mut self) -> u64 {
        self.cancel();
        self.arm();
        self.generation
    }

    /// Cancel the pending firing, if any. No-op once the timer has fired.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn arm(&mut self) {
        self.generation += 1;
        let Some(action) = self.action.clone() else {
            return;
        };
        let interval = self.interval.clone();
        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            match interval {
                Interval::After(delay) => {
                    tokio::time::sleep(delay).await;
                    action(generation).await;
                }
                Interval::Schedule(spec) => {
                    let mut last = Local::now();
                    while let Some((next, delay)) = next_occurrence(&spec, &last, &Local::now()) {
                        tokio::time::sleep(delay).await;
                        action(generation).await;
                        last = next;
                    }
                }
            }
        }));
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("interval", &self.interval)
            .field("generation", &self.generation)
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}
