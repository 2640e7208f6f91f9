//! Periodic background work
//!
//! A [`PeriodicTask`] owns the `JoinHandle` of a timer loop. The loop stops
//! when its tick returns [`ControlFlow::Break`], when [`PeriodicTask::cancel`]
//! is called, or when the handle is dropped.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// Cancellable timer loop
pub struct PeriodicTask {
    name: String,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// First tick after one full `period`
    pub fn spawn<F, Fut>(name: impl Into<String>, period: Duration, tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        Self::start(name.into(), period, false, tick)
    }

    /// First tick right away, then every `period`
    pub fn spawn_immediate<F, Fut>(name: impl Into<String>, period: Duration, tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        Self::start(name.into(), period, true, tick)
    }

    fn start<F, Fut>(name: String, period: Duration, immediate: bool, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let loop_name = name.clone();
        let handle = tokio::spawn(async move {
            let start = if immediate {
                time::Instant::now()
            } else {
                time::Instant::now() + period
            };
            let mut interval = time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if tick().await.is_break() {
                    debug!("Periodic task {} finished", loop_name);
                    break;
                }
            }
        });

        Self { name, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the loop; an in-flight tick is dropped at its next await point
    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            debug!("Cancelling periodic task {}", self.name);
            self.handle.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
