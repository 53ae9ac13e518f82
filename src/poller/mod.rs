//! Poller: owns the device session, the background sweep loop, and the
//! published snapshot. Everything external goes through the [`Poller`]
//! handle; the session itself is never handed out.

mod scheduler;
mod snapshot;

pub use snapshot::{word_as_signed, RegisterValue, Snapshot, SnapshotStore};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::constants::defaults;
use crate::registers::RegisterSpace;
use crate::session::{Session, SessionConfig, SessionError};

use scheduler::{run_sweep, Scheduler, SweepOutcome};

#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub poll_interval: Duration,
    /// Pause between reconnect probes while polling is disabled.
    pub recovery_interval: Duration,
    pub request_timeout: Duration,
    /// Consecutive connection failures tolerated before polling is disabled.
    pub failure_threshold: u32,
}

impl PollerConfig {
    pub fn new(host: impl Into<String>) -> Self {
        PollerConfig {
            host: host.into(),
            port: defaults::PORT,
            unit_id: defaults::UNIT_ID,
            poll_interval: defaults::POLL_INTERVAL,
            recovery_interval: defaults::RECOVERY_INTERVAL,
            request_timeout: defaults::REQUEST_TIMEOUT,
            failure_threshold: defaults::FAILURE_THRESHOLD,
        }
    }
}

/// State shared between the handle and the background loop.
pub(crate) struct Shared {
    pub(crate) store: SnapshotStore,
    /// Set after repeated connection failures; cleared by a successful probe.
    pub(crate) disabled: AtomicBool,
    pub(crate) failures: AtomicU32,
    pub(crate) stopping: AtomicBool,
}

pub struct Poller {
    config: PollerConfig,
    session: Arc<Mutex<Session>>,
    shared: Arc<Shared>,
    refresh_tx: Option<flume::Sender<()>>,
    shutdown_tx: Option<flume::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        let session = Session::new(SessionConfig {
            host: config.host.clone(),
            port: config.port,
            unit_id: config.unit_id,
            request_timeout: config.request_timeout,
        });

        Poller {
            config,
            session: Arc::new(Mutex::new(session)),
            shared: Arc::new(Shared {
                store: SnapshotStore::new(),
                disabled: AtomicBool::new(false),
                failures: AtomicU32::new(0),
                stopping: AtomicBool::new(false),
            }),
            refresh_tx: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Spawn the background sweep loop. A no-op if it is already running.
    pub fn start(&mut self) {
        if self.task.is_some() {
            log::warn!("Poll loop already running");
            return;
        }

        self.shared.stopping.store(false, Ordering::Release);
        let (refresh_tx, refresh_rx) = flume::bounded(1);
        let (shutdown_tx, shutdown_rx) = flume::bounded(1);

        let scheduler = Scheduler::new(
            Arc::clone(&self.session),
            Arc::clone(&self.shared),
            self.config.poll_interval,
            self.config.recovery_interval,
            self.config.failure_threshold,
            refresh_rx,
            shutdown_rx,
        );

        self.task = Some(tokio::spawn(scheduler.run()));
        self.refresh_tx = Some(refresh_tx);
        self.shutdown_tx = Some(shutdown_tx);
    }

    /// Signal the loop to exit and wait for it; the session is closed by the
    /// loop on its way out. Nothing is published once this has been called.
    pub async fn stop(&mut self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.refresh_tx = None;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Poll loop did not shut down cleanly: {e}");
            }
        }
    }

    /// Ask the loop to sweep ahead of schedule, typically after a write.
    /// Coalesces when a request is already pending; a no-op when stopped.
    pub fn request_refresh(&self) {
        if let Some(tx) = &self.refresh_tx {
            let _ = tx.try_send(());
        }
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.shared.store.current()
    }

    /// Cached value for an address; `None` means "not read yet", never an
    /// error. Addresses outside the register map are always `None`.
    pub fn get(&self, space: RegisterSpace, address: u16) -> Option<RegisterValue> {
        self.shared.store.current().get(space, address)
    }

    /// Seconds between the two most recent successful sweep starts. Grows
    /// stale (stays at its last value) while the device is unreachable.
    pub fn last_update_interval(&self) -> Option<Duration> {
        self.shared.store.current().last_interval
    }

    /// Whether polling is currently disabled after repeated failures.
    pub fn polling_disabled(&self) -> bool {
        self.shared.disabled.load(Ordering::Acquire)
    }

    /// Consecutive connection-level failures since the last successful sweep.
    pub fn consecutive_failures(&self) -> u32 {
        self.shared.failures.load(Ordering::Acquire)
    }

    /// Write a single holding register. Takes the same lock as the sweep, so
    /// the write never lands in the middle of one. Returns `false` on any
    /// failure; the cache is only updated by a later sweep (see
    /// [`Poller::request_refresh`]).
    pub async fn write_register(&self, address: u16, value: u16) -> bool {
        if self.polling_disabled() {
            log::warn!("Write to register {address} refused: device is unreachable");
            return false;
        }

        let mut session = self.session.lock().await;
        if let Err(e) = session.connect().await {
            log::error!("Write to register {address} failed: {e}");
            return false;
        }

        match session.write_single(address, value).await {
            Ok(()) => {
                log::info!("Wrote {value} to register {address}");
                true
            }
            Err(e) => {
                log::error!("Write to register {address} failed: {e}");
                false
            }
        }
    }

    /// One synchronous sweep outside the background loop; used by the one-shot
    /// CLI path and by callers that cannot wait for the next scheduled pass.
    pub async fn sweep_now(&self) -> Result<Arc<Snapshot>, SessionError> {
        let previous = self.shared.store.current();

        let mut session = self.session.lock().await;
        session.connect().await?;

        match run_sweep(&mut session, &previous).await {
            SweepOutcome::Complete(next) => {
                drop(session);
                self.shared.store.publish(next);
                Ok(self.shared.store.current())
            }
            SweepOutcome::Aborted { partial, error } => {
                session.close().await;
                drop(session);
                if let Some(next) = partial {
                    self.shared.store.publish(next);
                }
                Err(error)
            }
        }
    }
}
