//! Background task that keeps the shared TLS trust in line with the stored
//! configuration.
//!
//! Exactly one loop runs per backend. `start` and `stop` are serialized by
//! their own lock so the running check never contends with the records lock
//! taken by logins and administrative writes.

use crate::{
    backend::{config, storage::Storage},
    vault::RemoteConnectionMaterial,
    Error, Result,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{oneshot, Mutex, RwLock},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No configuration stored yet.
    Skipped,
    Unchanged,
    Updated,
}

#[derive(Debug)]
struct Refresher {
    storage: Arc<dyn Storage>,
    material: Arc<RemoteConnectionMaterial>,
    records: Arc<RwLock<()>>,
}

impl Refresher {
    async fn refresh(&self) -> Result<RefreshOutcome> {
        // Holding the records lock pairs this config read with the install,
        // so a concurrent config write cannot be overwritten by a stale read.
        let _records = self.records.read().await;

        let Some(config) = config::load(self.storage.as_ref()).await? else {
            trace!("configuration is not set, TLS config update skipped");
            return Ok(RefreshOutcome::Skipped);
        };

        let swapped = self
            .material
            .install(&config.ca_cert, config.insecure_skip_verify)
            .await?;

        Ok(if swapped {
            RefreshOutcome::Updated
        } else {
            RefreshOutcome::Unchanged
        })
    }

    async fn run(
        self: Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
        ready: oneshot::Sender<()>,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let _ = ready.send(());
        info!(period = ?period, "TLS config updater started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "TLS config update failed");
                    }
                }
            }
        }

        debug!("TLS config updater shutdown complete");
    }
}

#[derive(Debug, Default)]
struct LoopState {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl LoopState {
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

#[derive(Debug)]
pub struct TrustMaterialUpdater {
    refresher: Arc<Refresher>,
    state: Mutex<LoopState>,
}

impl TrustMaterialUpdater {
    /// `records` is the lock guarding configuration and role records.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        material: Arc<RemoteConnectionMaterial>,
        records: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            refresher: Arc::new(Refresher {
                storage,
                material,
                records,
            }),
            state: Mutex::new(LoopState::default()),
        }
    }

    /// Start the refresh loop. The first refresh runs immediately, then every `period`.
    ///
    /// Returns once the loop is running; a second call while it runs is a no-op.
    /// # Errors
    /// Returns `Error::Precondition` if `period` is zero, the connection material
    /// is not set up, or the loop exits before it is ready.
    pub async fn start(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::Precondition(
                "TLS config refresh period must be non-zero".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if state.is_running() {
            debug!("TLS config updater already running");
            return Ok(());
        }

        self.refresher.material.validate()?;

        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(
            self.refresher
                .clone()
                .run(period, cancel.clone(), ready_tx),
        );
        if ready_rx.await.is_err() {
            cancel.cancel();
            let detail = match task.await {
                Err(e) => e.to_string(),
                Ok(()) => "exited".to_string(),
            };
            return Err(Error::Precondition(format!(
                "TLS config updater failed to start: {detail}"
            )));
        }

        state.cancel = Some(cancel);
        state.task = Some(task);
        Ok(())
    }

    /// Stop the loop and wait for it to exit. Safe to call repeatedly or before `start`.
    pub async fn stop(&self) {
        let (cancel, task) = {
            let mut state = self.state.lock().await;
            (state.cancel.take(), state.task.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "TLS config updater task ended abnormally");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_running()
    }

    /// Run one refresh outside the loop.
    /// # Errors
    /// Returns an error if the configuration cannot be read or the client cannot be rebuilt.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        self.refresher.refresh().await
    }
}

impl Drop for TrustMaterialUpdater {
    fn drop(&mut self) {
        if let Some(cancel) = &self.state.get_mut().cancel {
            cancel.cancel();
        }
    }
}
