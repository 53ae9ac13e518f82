//! The sweep loop: connect, read every mapped block, publish, sleep.
//!
//! Connection-level failures are counted; after `failure_threshold`
//! consecutive failures polling is disabled and the loop only probes the
//! device once per recovery interval until it answers again.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::registers::{self, RegisterSpace};
use crate::session::{Session, SessionError};

use super::snapshot::Snapshot;
use super::Shared;

pub(crate) enum SweepOutcome {
    /// Every block was attempted; protocol faults may have left stale values.
    Complete(Snapshot),
    /// A connection-level fault aborted the sweep. `partial` holds the merged
    /// snapshot if at least one block had already been read.
    Aborted {
        partial: Option<Snapshot>,
        error: SessionError,
    },
}

/// Read every mapped block once, merging over the previous snapshot. The
/// session must already be connected.
pub(crate) async fn run_sweep(session: &mut Session, previous: &Snapshot) -> SweepOutcome {
    let mut next = previous.carry_forward();
    let mut read_any = false;

    for space in RegisterSpace::ALL {
        for block in registers::blocks(space) {
            match session.read_block(space, block.start, block.count).await {
                Ok(values) => {
                    next.merge_block(space, block.start, values);
                    read_any = true;
                }
                Err(e) if e.is_connection_level() => {
                    return SweepOutcome::Aborted {
                        partial: read_any.then_some(next),
                        error: e,
                    };
                }
                Err(e) => {
                    log::warn!(
                        "Skipping {space} block {}..{}: {e}",
                        block.start,
                        block.end()
                    );
                }
            }
        }
    }

    SweepOutcome::Complete(next)
}

pub(crate) struct Scheduler {
    session: Arc<Mutex<Session>>,
    shared: Arc<Shared>,
    poll_interval: Duration,
    recovery_interval: Duration,
    failure_threshold: u32,
    last_success_start: Option<Instant>,
    refresh_rx: flume::Receiver<()>,
    shutdown_rx: flume::Receiver<()>,
}

impl Scheduler {
    pub(crate) fn new(
        session: Arc<Mutex<Session>>,
        shared: Arc<Shared>,
        poll_interval: Duration,
        recovery_interval: Duration,
        failure_threshold: u32,
        refresh_rx: flume::Receiver<()>,
        shutdown_rx: flume::Receiver<()>,
    ) -> Self {
        Scheduler {
            session,
            shared,
            poll_interval,
            recovery_interval,
            failure_threshold,
            last_success_start: None,
            refresh_rx,
            shutdown_rx,
        }
    }

    pub(crate) async fn run(mut self) {
        log::info!(
            "Poll loop started; interval {:.0}s",
            self.poll_interval.as_secs_f32()
        );

        loop {
            if self.shared.disabled.load(Ordering::Acquire) {
                self.probe().await;
            } else {
                self.sweep().await;
            }

            let pause = if self.shared.disabled.load(Ordering::Acquire) {
                self.recovery_interval
            } else {
                self.poll_interval
            };

            tokio::select! {
                _ = sleep(pause) => {}
                msg = self.refresh_rx.recv_async() => {
                    if msg.is_err() {
                        break;
                    }
                    log::debug!("Refresh requested; sweeping ahead of schedule");
                }
                _ = self.shutdown_rx.recv_async() => break,
            }
        }

        self.session.lock().await.close().await;
        log::info!("Poll loop stopped");
    }

    /// One reconnect attempt while polling is disabled. Success re-enables
    /// polling and sweeps immediately.
    async fn probe(&mut self) {
        let mut session = self.session.lock().await;
        match session.connect().await {
            Ok(()) => {
                drop(session);
                self.shared.disabled.store(false, Ordering::Release);
                self.shared.failures.store(0, Ordering::Release);
                log::info!("Device reachable again; resuming polling");
                self.sweep().await;
            }
            Err(e) => {
                log::warn!("Reconnect probe failed: {e}");
            }
        }
    }

    async fn sweep(&mut self) {
        let started = Instant::now();
        let previous = self.shared.store.current();

        let mut session = self.session.lock().await;
        if let Err(e) = session.connect().await {
            log::error!("Sweep skipped: {e}");
            self.register_failure(&mut session).await;
            return;
        }

        match run_sweep(&mut session, &previous).await {
            SweepOutcome::Complete(mut next) => {
                drop(session);
                next.last_interval = self
                    .last_success_start
                    .map(|prev| started.duration_since(prev));
                self.last_success_start = Some(started);
                self.shared.failures.store(0, Ordering::Release);
                self.publish(next);
                log::debug!(
                    "Sweep finished in {:.0}ms",
                    started.elapsed().as_secs_f32() * 1000.0
                );
            }
            SweepOutcome::Aborted { partial, error } => {
                log::error!("Sweep aborted: {error}");
                self.register_failure(&mut session).await;
                drop(session);
                if let Some(next) = partial {
                    // Blocks read before the fault are still fresh data.
                    self.publish(next);
                }
            }
        }
    }

    async fn register_failure(&self, session: &mut Session) {
        session.close().await;
        let failures = self.shared.failures.fetch_add(1, Ordering::AcqRel) + 1;

        if failures >= self.failure_threshold {
            if !self.shared.disabled.swap(true, Ordering::AcqRel) {
                log::error!(
                    "{failures} consecutive connection failures; polling disabled, probing every {:.0}s",
                    self.recovery_interval.as_secs_f32()
                );
            }
        } else {
            log::warn!(
                "Connection failure {failures} of {}",
                self.failure_threshold
            );
        }
    }

    fn publish(&self, snapshot: Snapshot) {
        if self.shared.stopping.load(Ordering::Acquire) {
            return;
        }
        self.shared.store.publish(snapshot);
    }
}
