use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{TickOutcome, TickReport, Trader};
use crate::api::Exchange;

/// Source of time for the scheduler
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn sleep_until(&self, deadline: DateTime<Utc>) -> impl Future<Output = ()> + Send;
}

/// Wall clock backed by tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        let delay = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(delay).await;
    }
}

/// Clock that only moves when slept on or advanced. Sleeping jumps straight
/// to the deadline, so ticks can be driven synthetically.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep_until(&self, deadline: DateTime<Utc>) -> impl Future<Output = ()> + Send {
        let now = self.now.clone();
        async move {
            let mut now = now.lock().unwrap_or_else(|e| e.into_inner());
            if deadline > *now {
                *now = deadline;
            }
        }
    }
}

/// Next multiple of `interval` (since the epoch) strictly after `now`
pub fn next_boundary(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = interval.as_secs().max(1) as i64;
    let next = (now.timestamp().div_euclid(step) + 1) * step;
    DateTime::from_timestamp(next, 0).unwrap_or(now)
}

/// Runs one trader tick per interval boundary until shutdown
///
/// Ticks never overlap: the next boundary is computed after the previous
/// tick finished, so boundaries missed by a slow tick are skipped.
pub struct Scheduler<E: Exchange, C: Clock> {
    trader: Trader<E>,
    clock: C,
    interval: Duration,
    max_ticks: Option<u64>,
    ticks_run: u64,
}

impl<E: Exchange, C: Clock> Scheduler<E, C> {
    pub fn new(trader: Trader<E>, clock: C, interval: Duration) -> Self {
        Self {
            trader,
            clock,
            interval,
            max_ticks: None,
            ticks_run: 0,
        }
    }

    /// Stop after this many ticks
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    pub fn trader(&self) -> &Trader<E> {
        &self.trader
    }

    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }

    /// Loop until `shutdown` resolves or the tick limit is reached.
    /// Shutdown is only observed between ticks. Returns the tick count.
    pub async fn run<S>(&mut self, shutdown: S) -> u64
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            if self.max_ticks.is_some_and(|max| self.ticks_run >= max) {
                tracing::info!("Tick limit reached");
                break;
            }

            let next = next_boundary(self.clock.now(), self.interval);
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("⚠️  Shutdown requested, stopping scheduler");
                    break;
                }
                _ = self.clock.sleep_until(next) => {}
            }

            self.run_tick().await;
        }

        self.ticks_run
    }

    /// Run a single tick now, logging its result
    pub async fn run_tick(&mut self) -> Option<TickReport> {
        self.ticks_run += 1;
        let now = self.clock.now();
        tracing::info!("💹 [TICK {}] {}", self.ticks_run, now.format("%H:%M:%S"));

        match self.trader.tick(now).await {
            Ok(report) => {
                match &report.outcome {
                    TickOutcome::NoAction { reason } => {
                        tracing::info!("  → {} ({:?})", reason, report.phase_after);
                    }
                    TickOutcome::Placed { order, .. } => {
                        tracing::info!(
                            "  → {:?} → {:?} via order {}",
                            report.phase_before,
                            report.phase_after,
                            order.id
                        );
                    }
                    TickOutcome::PlacementFailed { request, .. } => {
                        tracing::info!("  → {:?} order not placed, retrying next tick", request.side);
                    }
                }
                Some(report)
            }
            Err(e) => {
                tracing::warn!("  ✗ Tick skipped: {}", e);
                None
            }
        }
    }
}
