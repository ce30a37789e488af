//! Position service module
//!
//! Ties the position store, the pending set and the replicated log together.
//!
//! # Overview
//!
//! Local callers read and write positions through [`PositionService`]. Writes
//! only touch the local table and mark the partition pending;
//! [`PositionService::synchronize`] later broadcasts every pending partition
//! in one `POSITION_CHANGE` message. Messages delivered by the log (including
//! this worker's own) are merged into the table, and registered listeners
//! are told when a merge changed something.
//!
//! ```text
//!  put / remove ──► PositionStore ◄── merge ◄── delivery task ◄── ReplicatedLog
//!        │                                           │                 ▲
//!        └──────► PendingSet ──► synchronize ────────┼─────────────────┘
//!                                                    └──► listeners
//! ```

mod listener;

pub use listener::{ListenerId, ListenerRegistry, PositionUpdateListener};

use crate::error::{Error, Result};
use crate::store::{PendingSet, PositionStore};
use crate::sync::{Delivery, PositionMessage, ReplicatedLog};
use crate::types::{Offset, Partition, PositionTable};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Background flush settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Broadcast pending positions this often
    pub sync_interval: Option<Duration>,
    /// Persist the table this often
    pub persist_interval: Option<Duration>,
}

impl ServiceConfig {
    /// Create a config with no background flushing
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the synchronize interval
    #[must_use]
    pub fn sync_every(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Set the persist interval
    #[must_use]
    pub fn persist_every(mut self, interval: Duration) -> Self {
        self.persist_interval = Some(interval);
        self
    }
}

/// Lifecycle state of a [`PositionService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

struct Lifecycle {
    state: ServiceState,
    token: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    store: PositionStore,
    pending: PendingSet,
    log: Arc<dyn ReplicatedLog>,
    listeners: ListenerRegistry,
    config: ServiceConfig,
    lifecycle: Mutex<Lifecycle>,
}

/// Per-worker position management service.
///
/// Cheap to clone; all clones share the same table, pending set and log.
#[derive(Clone)]
pub struct PositionService {
    inner: Arc<Inner>,
}

impl PositionService {
    /// Create a service without background flushing
    pub fn new(store: PositionStore, log: Arc<dyn ReplicatedLog>) -> Self {
        Self::with_config(store, log, ServiceConfig::default())
    }

    /// Create a service with the given flush settings
    pub fn with_config(
        store: PositionStore,
        log: Arc<dyn ReplicatedLog>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                pending: PendingSet::new(),
                log,
                listeners: ListenerRegistry::new(),
                config,
                lifecycle: Mutex::new(Lifecycle {
                    state: ServiceState::Stopped,
                    token: None,
                    tasks: Vec::new(),
                }),
            }),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load the table, start consuming the log and announce this worker.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.state != ServiceState::Stopped {
            return Err(Error::lifecycle("start", lifecycle.state));
        }
        lifecycle.state = ServiceState::Starting;

        if let Err(e) = self.launch(&mut lifecycle).await {
            lifecycle.state = ServiceState::Stopped;
            return Err(e);
        }

        lifecycle.state = ServiceState::Running;
        info!(
            positions = self.inner.store.len().await,
            path = %self.inner.store.path().display(),
            "Position service started"
        );
        Ok(())
    }

    async fn launch(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        self.inner.store.load().await?;
        let deliveries = self.inner.log.subscribe().await?;

        let token = CancellationToken::new();
        lifecycle.tasks.push(tokio::spawn(
            self.clone().run_delivery_loop(deliveries, token.clone()),
        ));
        if let Some(task) = self.spawn_maintenance(token.clone()) {
            lifecycle.tasks.push(task);
        }
        lifecycle.token = Some(token);

        self.announce().await;
        Ok(())
    }

    /// Broadcast pending positions, persist, then stop consuming the log.
    ///
    /// The consumer is torn down even if persisting fails; the persist error
    /// is still returned.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.state != ServiceState::Running {
            return Err(Error::lifecycle("stop", lifecycle.state));
        }
        lifecycle.state = ServiceState::Stopping;

        let flushed = self.synchronize().await;
        let persisted = self.inner.store.persist().await;

        if let Some(token) = lifecycle.token.take() {
            token.cancel();
        }
        for result in futures::future::join_all(lifecycle.tasks.drain(..)).await {
            if let Err(e) = result {
                warn!(error = %e, "Position service task ended abnormally");
            }
        }
        self.inner.log.unsubscribe().await;
        lifecycle.state = ServiceState::Stopped;

        match &persisted {
            Ok(()) => info!(flushed, "Position service stopped"),
            Err(e) => error!(flushed, error = %e, "Position service stopped without persisting"),
        }
        persisted
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ServiceState {
        self.inner.lifecycle.lock().await.state
    }

    /// Persist the table now
    pub async fn persist(&self) -> Result<()> {
        self.inner.store.persist().await
    }

    /// Reload the table from disk
    pub async fn load(&self) -> Result<()> {
        self.inner.store.load().await
    }

    // ========================================================================
    // Positions
    // ========================================================================

    /// Get the offset recorded for a partition
    pub async fn get_position(&self, partition: &Partition) -> Option<Offset> {
        self.inner.store.get(partition).await
    }

    /// Copy of the whole table
    pub async fn get_position_table(&self) -> PositionTable {
        self.inner.store.snapshot().await
    }

    /// Record progress for a partition; broadcast on the next synchronize
    pub async fn put_position(&self, partition: Partition, offset: Offset) {
        let mut table = self.inner.store.table_mut().await;
        table.insert(partition.clone(), offset);
        self.inner.pending.insert(partition);
    }

    /// Record progress for many partitions at once
    pub async fn put_positions(&self, positions: PositionTable) {
        if positions.is_empty() {
            return;
        }
        let mut table = self.inner.store.table_mut().await;
        self.inner.pending.extend(positions.keys().cloned());
        table.extend(positions);
    }

    /// Forget partitions, both locally and for the next synchronize
    pub async fn remove_positions(&self, partitions: &[Partition]) {
        if partitions.is_empty() {
            return;
        }
        let mut table = self.inner.store.table_mut().await;
        for partition in partitions {
            self.inner.pending.remove(partition);
            table.remove(partition);
        }
    }

    /// Number of partitions waiting for the next synchronize
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Broadcast every pending partition as one `POSITION_CHANGE` message.
    ///
    /// Partitions written after the pending set is swapped out wait for the
    /// next call. Returns the number of positions broadcast.
    pub async fn synchronize(&self) -> usize {
        let changed: PositionTable = {
            // Writers hold the write lock across table and pending updates,
            // so the swap and the lookup below see one consistent state.
            let table = self.inner.store.table().await;
            let taken = self.inner.pending.take().await;
            taken
                .into_iter()
                .filter_map(|partition| {
                    let offset = table.get(&partition)?.clone();
                    Some((partition, offset))
                })
                .collect()
        };

        let count = changed.len();
        debug!(positions = count, "Broadcasting pending positions");
        self.inner.log.send(PositionMessage::PositionChange(changed));
        count
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a listener for merged updates
    pub fn register_listener(&self, listener: Arc<dyn PositionUpdateListener>) -> ListenerId {
        self.inner.listeners.register(listener)
    }

    /// Unregister a listener; returns whether it was registered
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.unregister(id)
    }

    // ========================================================================
    // Inbound messages
    // ========================================================================

    /// Process one delivery from the log. Returns whether listeners were notified.
    pub async fn handle_delivery(&self, delivery: Delivery) -> bool {
        let message = match delivery {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undeliverable position message");
                return false;
            }
        };

        let changed = match message {
            PositionMessage::Online(announced) => {
                debug!(
                    announced = announced.len(),
                    "Worker came online, rebroadcasting positions"
                );
                self.broadcast_all().await;
                true
            }
            PositionMessage::PositionChange(positions) => {
                let changed = self.inner.store.merge(&positions).await;
                debug!(positions = positions.len(), changed, "Merged position change");
                changed
            }
        };

        if changed {
            self.inner.listeners.notify();
        }
        changed
    }

    async fn run_delivery_loop(
        self,
        mut deliveries: mpsc::Receiver<Delivery>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                delivery = deliveries.recv() => {
                    let Some(delivery) = delivery else {
                        warn!("Replicated log closed the delivery channel");
                        break;
                    };
                    self.handle_delivery(delivery).await;
                }
            }
        }
        debug!("Position delivery loop stopped");
    }

    fn spawn_maintenance(&self, token: CancellationToken) -> Option<JoinHandle<()>> {
        let ServiceConfig {
            sync_interval,
            persist_interval,
        } = self.inner.config.clone();
        let sync_interval = sync_interval.filter(|d| !d.is_zero());
        let persist_interval = persist_interval.filter(|d| !d.is_zero());
        if sync_interval.is_none() && persist_interval.is_none() {
            return None;
        }

        let service = self.clone();
        Some(tokio::spawn(async move {
            let mut sync_ticker = sync_interval.map(ticker);
            let mut persist_ticker = persist_interval.map(ticker);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick(&mut sync_ticker) => {
                        if !service.inner.pending.is_empty() {
                            service.synchronize().await;
                        }
                    }
                    _ = tick(&mut persist_ticker) => {
                        if let Err(e) = service.persist().await {
                            error!(error = %e, "Periodic position persist failed");
                        }
                    }
                }
            }
        }))
    }

    async fn announce(&self) {
        let table = self.inner.store.snapshot().await;
        debug!(positions = table.len(), "Announcing worker online");
        self.inner.log.send(PositionMessage::Online(table));
    }

    async fn broadcast_all(&self) {
        let table = self.inner.store.snapshot().await;
        self.inner.log.send(PositionMessage::PositionChange(table));
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl fmt::Debug for PositionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionService")
            .field("store", &self.inner.store)
            .field("pending", &self.inner.pending.len())
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}
