// ── Pool client ──
//
// Full lifecycle management for one pool: bootstrap on availability,
// cascading teardown on loss, background refresh, command routing, and
// reactive data streaming through the PoolStore.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use strum::Display;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{decode_class_info, decode_class_info_fallback, decode_controller_properties};
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::PoolConfig;
use crate::engine::{self, EngineHandle, EngineStatus};
use crate::error::CoreError;
use crate::model::{ControllerClass, EntityKind};
use crate::source::{ClassQuery, PoolSource};
use crate::store::{ChangeSet, PoolStore, ReconcileOutcome};
use crate::stream::{ObserverId, Subscription};

const COMMAND_CHANNEL_SIZE: usize = 64;

// ── Availability ────────────────────────────────────────────────────

/// Availability of the pool as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum Availability {
    Unavailable,
    /// Transition to available in progress; collections are filling up.
    Bootstrapping,
    Available,
}

/// What one bootstrap loaded and what it could not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub epoch: u64,
    /// Entity count per collection that loaded, in bootstrap order.
    pub loaded: IndexMap<EntityKind, usize>,
    /// Collections whose fetch failed, with the reason. They stay empty.
    pub failed: IndexMap<EntityKind, String>,
    /// Class, controller or group metadata queries that failed.
    pub metadata_failures: usize,
    pub completed_at: DateTime<Utc>,
}

impl BootstrapReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ── PoolClient ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Owns the synchronization
/// engine, follows the pool's availability, and keeps every collection
/// in step with the remote side.
#[derive(Clone)]
pub struct PoolClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: PoolConfig,
    source: Arc<dyn PoolSource>,
    engine: EngineHandle,
    store: PoolStore,
    availability: watch::Sender<Availability>,
    epoch: AtomicU64,
    last_refresh: watch::Sender<Option<DateTime<Utc>>>,
    last_report: Mutex<Option<BootstrapReport>>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    /// Serializes availability transitions.
    lifecycle: Mutex<()>,
    cancel: CancellationToken,
    epoch_cancel: Mutex<Option<CancellationToken>>,
    /// Tasks living for one availability epoch.
    epoch_tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Tasks living as long as the client.
    service_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolClient {
    /// Create a client for `source`, starting unavailable.
    ///
    /// Spawns the engine and the command processor, so it must run
    /// inside a Tokio runtime. If the source publishes its own
    /// availability the client follows it; otherwise call
    /// [`set_available()`](Self::set_available) yourself.
    pub fn new<S: PoolSource>(config: PoolConfig, source: S) -> Self {
        let source: Arc<dyn PoolSource> = Arc::new(source);
        let (engine, store, engine_task) = engine::spawn(config.name.clone());
        let (availability, _) = watch::channel(Availability::Unavailable);
        let (last_refresh, _) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let followed = source.availability();

        let client = Self {
            inner: Arc::new(ClientInner {
                config,
                source,
                engine,
                store,
                availability,
                epoch: AtomicU64::new(0),
                last_refresh,
                last_report: Mutex::new(None),
                command_tx,
                lifecycle: Mutex::new(()),
                cancel: CancellationToken::new(),
                epoch_cancel: Mutex::new(None),
                epoch_tasks: Mutex::new(Vec::new()),
                service_tasks: Mutex::new(Vec::new()),
            }),
        };

        let mut services = vec![engine_task, tokio::spawn(command_processor_task(client.clone(), command_rx))];
        if let Some(rx) = followed {
            services.push(tokio::spawn(availability_task(client.clone(), rx)));
        }
        if let Ok(mut tasks) = client.inner.service_tasks.try_lock() {
            tasks.extend(services);
        }
        client
    }

    /// Access the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Access the reactive store.
    pub fn store(&self) -> &PoolStore {
        &self.inner.store
    }

    // ── Availability lifecycle ───────────────────────────────────────

    /// Transition to available: bootstrap every collection in
    /// dependency order, fetch metadata, then start the refresher.
    ///
    /// A collection whose fetch fails stays empty and is listed in the
    /// report; the others still load. Calling this while available
    /// returns the report of the running epoch.
    pub async fn set_available(&self) -> Result<BootstrapReport, CoreError> {
        let _guard = self.inner.lifecycle.lock().await;
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::EngineStopped);
        }
        if *self.inner.availability.borrow() == Availability::Available {
            if let Some(report) = self.inner.last_report.lock().await.clone() {
                return Ok(report);
            }
        }

        let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let token = self.inner.cancel.child_token();
        *self.inner.epoch_cancel.lock().await = Some(token.clone());
        self.inner.availability.send_replace(Availability::Bootstrapping);
        info!(pool = %self.inner.config.name, epoch, "pool available, bootstrapping");

        self.inner.engine.activate(epoch).await?;
        let report = match self.bootstrap(epoch, &token).await {
            Ok(report) => report,
            Err(e) => {
                warn!(pool = %self.inner.config.name, epoch, error = %e, "bootstrap aborted");
                self.inner.engine.teardown().await?;
                self.inner.availability.send_replace(Availability::Unavailable);
                return Err(e);
            }
        };

        let interval = self.inner.config.refresh_interval;
        if !interval.is_zero() {
            let handle = tokio::spawn(refresh_task(self.clone(), interval, token));
            self.inner.epoch_tasks.lock().await.push(handle);
        }

        *self.inner.last_report.lock().await = Some(report.clone());
        self.inner.last_refresh.send_replace(Some(report.completed_at));
        self.inner.availability.send_replace(Availability::Available);
        info!(
            pool = %self.inner.config.name,
            epoch,
            entities = report.loaded.values().sum::<usize>(),
            failed = report.failed.len(),
            "pool bootstrap complete"
        );
        Ok(report)
    }

    /// Transition to unavailable: stop the refresher, then clean up and
    /// drop every entity and every observer registration.
    pub async fn set_unavailable(&self) {
        // Interrupt a bootstrap in flight before waiting for it.
        if let Some(token) = self.inner.epoch_cancel.lock().await.take() {
            token.cancel();
        }
        let _guard = self.inner.lifecycle.lock().await;
        if *self.inner.availability.borrow() == Availability::Unavailable {
            return;
        }

        let handles: Vec<JoinHandle<()>> = self.inner.epoch_tasks.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        if let Err(e) = self.inner.engine.teardown().await {
            warn!(pool = %self.inner.config.name, error = %e, "teardown failed");
        }
        *self.inner.last_report.lock().await = None;
        self.inner.availability.send_replace(Availability::Unavailable);
        info!(pool = %self.inner.config.name, "pool unavailable");
    }

    /// Leave the pool and stop every background task.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.set_unavailable().await;
        let handles: Vec<JoinHandle<()>> = self.inner.service_tasks.lock().await.drain(..).collect();
        // The engine task stops once the last handle is dropped.
        for handle in handles.into_iter().skip(1) {
            let _ = handle.await;
        }
        debug!(pool = %self.inner.config.name, "client shut down");
    }

    async fn bootstrap(&self, epoch: u64, token: &CancellationToken) -> Result<BootstrapReport, CoreError> {
        let interrupted = || CoreError::BootstrapInterrupted {
            pool: self.inner.config.name.clone(),
        };
        let mut loaded = IndexMap::new();
        let mut failed = IndexMap::new();

        for kind in EntityKind::BOOTSTRAP_ORDER {
            let fetched = tokio::select! {
                biased;
                () = token.cancelled() => return Err(interrupted()),
                lines = self.inner.source.read_list(kind) => lines,
            };
            match fetched {
                Ok(lines) => {
                    let outcome = self.inner.engine.snapshot(epoch, kind, lines, false).await?;
                    if matches!(outcome, ReconcileOutcome::Discarded(_)) {
                        return Err(interrupted());
                    }
                    loaded.insert(kind, self.inner.store.snapshot(kind).len());
                }
                Err(e) => {
                    warn!(pool = %self.inner.config.name, kind = %kind, error = %e, "collection fetch failed");
                    failed.insert(kind, e.to_string());
                }
            }
        }

        let mut metadata_failures = 0;
        if self.inner.config.fetch_metadata {
            for kind in [
                EntityKind::ControllerClasses,
                EntityKind::Controllers,
                EntityKind::MeasurementGroups,
            ] {
                if token.is_cancelled() {
                    return Err(interrupted());
                }
                metadata_failures += self.fetch_metadata(epoch, kind, None).await?;
            }
        }

        Ok(BootstrapReport {
            epoch,
            loaded,
            failed,
            metadata_failures,
            completed_at: Utc::now(),
        })
    }

    // ── Metadata ─────────────────────────────────────────────────────

    /// Fetch metadata for the entities of `kind`, or only for `names`.
    /// Returns the number of failed queries.
    async fn fetch_metadata(&self, epoch: u64, kind: EntityKind, names: Option<&[String]>) -> Result<usize, CoreError> {
        let wanted = |name: &str| names.is_none_or(|n| n.iter().any(|w| w == name));
        let mut failures = 0;
        match kind {
            EntityKind::ControllerClasses => {
                for class in self.inner.store.classes_snapshot().iter() {
                    if !wanted(&class.key()) {
                        continue;
                    }
                    if !self.fetch_class_info(epoch, class).await? {
                        failures += 1;
                    }
                }
            }
            EntityKind::Controllers => {
                for ctrl in self.inner.store.controllers_snapshot().iter() {
                    if !wanted(ctrl.name()) {
                        continue;
                    }
                    let query = ClassQuery {
                        controller_type: ctrl.declared_type().to_string(),
                        file_name: ctrl.library().to_owned(),
                        class_name: ctrl.class_name().to_owned(),
                        instance: Some(ctrl.name().to_owned()),
                    };
                    match self.inner.source.class_info(&query).await {
                        Ok(fields) => {
                            let properties = decode_controller_properties(&fields);
                            self.inner
                                .engine
                                .controller_properties(epoch, ctrl.name().to_owned(), properties)
                                .await?;
                        }
                        Err(e) => {
                            warn!(controller = ctrl.name(), error = %e, "controller properties unavailable");
                            failures += 1;
                        }
                    }
                }
            }
            EntityKind::MeasurementGroups => {
                for group in self.inner.store.elements_snapshot(kind).iter() {
                    if !wanted(group.name()) {
                        continue;
                    }
                    match self.inner.source.measurement_settings(group.address()).await {
                        Ok(settings) => {
                            self.inner
                                .engine
                                .measurement_settings(epoch, group.name().to_owned(), settings)
                                .await?;
                        }
                        Err(e) => {
                            warn!(group = group.name(), error = %e, "measurement group settings unavailable");
                            failures += 1;
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(failures)
    }

    /// `GetControllerInfoEx`, falling back to `GetControllerInfo`.
    /// Returns `false` if neither query answered.
    async fn fetch_class_info(&self, epoch: u64, class: &ControllerClass) -> Result<bool, CoreError> {
        let query = ClassQuery {
            controller_type: class.controller_type().to_string(),
            file_name: class.module().file_name.clone(),
            class_name: class.class_name().to_owned(),
            instance: None,
        };
        let info = match self.inner.source.class_info_ex(&query).await {
            Ok(blob) => decode_class_info(class.controller_type(), blob),
            Err(ex_err) => {
                debug!(class = %class.key(), error = %ex_err, "falling back to string class info");
                match self.inner.source.class_info(&query).await {
                    Ok(fields) => decode_class_info_fallback(&fields),
                    Err(e) => {
                        warn!(class = %class.key(), error = %e, "class metadata unavailable");
                        return Ok(false);
                    }
                }
            }
        };
        self.inner.engine.class_info(epoch, class.key(), info).await?;
        Ok(true)
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Re-read `kinds` from the source and reconcile each, in order.
    ///
    /// Metadata of newly added classes, controllers and groups is
    /// fetched along the way.
    pub async fn refresh(&self, kinds: &[EntityKind]) -> Result<IndexMap<EntityKind, ReconcileOutcome>, CoreError> {
        if *self.inner.availability.borrow() != Availability::Available {
            return Err(self.unavailable());
        }
        let epoch = self.epoch();
        let mut outcomes = IndexMap::new();
        for &kind in kinds {
            let lines = self.inner.source.read_list(kind).await?;
            let outcome = self.inner.engine.snapshot(epoch, kind, lines, false).await?;
            if let ReconcileOutcome::Applied(changes) = &outcome {
                if self.inner.config.fetch_metadata && !changes.added.is_empty() {
                    self.fetch_metadata(epoch, kind, Some(&changes.added)).await?;
                }
            }
            outcomes.insert(kind, outcome);
        }
        self.inner.last_refresh.send_replace(Some(Utc::now()));
        Ok(outcomes)
    }

    /// Re-read every collection in dependency order.
    pub async fn refresh_all(&self) -> Result<IndexMap<EntityKind, ReconcileOutcome>, CoreError> {
        self.refresh(&EntityKind::BOOTSTRAP_ORDER).await
    }

    /// Feed an event-driven snapshot of one collection through the engine.
    ///
    /// While unavailable this is a no-op reported as
    /// [`ReconcileOutcome::Discarded`].
    pub async fn push_snapshot(&self, kind: EntityKind, lines: Vec<String>) -> Result<ReconcileOutcome, CoreError> {
        self.inner.engine.snapshot(self.epoch(), kind, lines, false).await
    }

    /// Replace one collection programmatically. Observers of `kind` are
    /// notified even when the identity set is unchanged.
    pub async fn replace_collection(&self, kind: EntityKind, lines: Vec<String>) -> Result<ReconcileOutcome, CoreError> {
        self.inner.engine.snapshot(self.epoch(), kind, lines, true).await
    }

    // ── Command execution ────────────────────────────────────────────

    /// Execute a command against the pool.
    ///
    /// Sends the command through the internal channel to the command
    /// processor task and awaits the result. The affected collections
    /// are refreshed before this returns.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        cmd.validate()?;
        if *self.inner.availability.borrow() != Availability::Available {
            return Err(self.unavailable());
        }

        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::EngineStopped)?;

        rx.await.map_err(|_| CoreError::EngineStopped)?
    }

    // ── One-shot convenience ─────────────────────────────────────────

    /// One-shot: bootstrap, run closure, leave.
    ///
    /// Disables the periodic refresher since only one read cycle is needed.
    pub async fn oneshot<S, F, Fut, T>(config: PoolConfig, source: S, f: F) -> Result<T, CoreError>
    where
        S: PoolSource,
        F: FnOnce(PoolClient, BootstrapReport) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.refresh_interval = Duration::ZERO;

        let client = PoolClient::new(cfg, source);
        let report = match client.set_available().await {
            Ok(report) => report,
            Err(e) => {
                client.shutdown().await;
                return Err(e);
            }
        };
        let result = f(client.clone(), report).await;
        client.shutdown().await;
        result
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Register an observer for one collection.
    ///
    /// The registration ends with the next teardown; the subscription
    /// then yields `None`.
    pub async fn subscribe(&self, kind: EntityKind) -> Result<Subscription, CoreError> {
        self.inner.engine.subscribe(kind).await
    }

    /// Returns `true` if the observer was still registered.
    pub async fn unsubscribe(&self, id: ObserverId) -> Result<bool, CoreError> {
        self.inner.engine.unsubscribe(id).await
    }

    /// Change set retained from the last reconciliation of `kind`.
    pub async fn last_changes(&self, kind: EntityKind) -> Result<Option<ChangeSet>, CoreError> {
        self.inner.engine.last_changes(kind).await
    }

    pub async fn status(&self) -> Result<EngineStatus, CoreError> {
        self.inner.engine.status().await
    }

    /// Subscribe to availability changes.
    pub fn availability(&self) -> watch::Receiver<Availability> {
        self.inner.availability.subscribe()
    }

    pub fn is_available(&self) -> bool {
        *self.inner.availability.borrow() == Availability::Available
    }

    /// Generation number of the current (or last) available period.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    /// When the graph was last brought in step with the source.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_refresh.borrow()
    }

    pub async fn last_report(&self) -> Option<BootstrapReport> {
        self.inner.last_report.lock().await.clone()
    }

    fn unavailable(&self) -> CoreError {
        CoreError::Unavailable {
            pool: self.inner.config.name.clone(),
        }
    }
}

// ── Background tasks ────────────────────────────────────────────────

/// Periodically re-read every collection until the epoch ends.
async fn refresh_task(client: PoolClient, interval: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(interval);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = client.refresh_all().await {
                    warn!(pool = %client.inner.config.name, error = %e, "periodic refresh failed");
                }
            }
        }
    }
}

/// Follow the availability published by the source.
async fn availability_task(client: PoolClient, mut rx: watch::Receiver<bool>) {
    let cancel = client.inner.cancel.clone();
    let mut up = *rx.borrow_and_update();

    loop {
        if up {
            if let Err(e) = client.set_available().await {
                warn!(pool = %client.inner.config.name, error = %e, "bootstrap failed");
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        up = *rx.borrow_and_update();
        if !up {
            client.set_unavailable().await;
        }
    }
}

/// Process commands from the mpsc channel one at a time.
async fn command_processor_task(client: PoolClient, mut rx: mpsc::Receiver<CommandEnvelope>) {
    let cancel = client.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let result = route_command(&client, envelope.command).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
}

// ── Command routing ─────────────────────────────────────────────────

/// Invoke the remote command, then refresh what it touched.
async fn route_command(client: &PoolClient, cmd: Command) -> Result<CommandResult, CoreError> {
    let (command, args) = cmd.to_invocation()?;
    let timeout = client.inner.config.command_timeout;
    debug!(command, args = ?args, "invoking pool command");

    match tokio::time::timeout(timeout, client.inner.source.invoke(command, args)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(CoreError::Timeout {
                command: command.to_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
    }

    let refreshed = client.refresh(&cmd.affected_kinds()).await?;
    Ok(CommandResult { command, refreshed })
}
