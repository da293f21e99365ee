// ── Remote source boundary ──
//
// The engine never talks to the wire. A `PoolSource` fetches raw
// snapshots and runs commands; `MemorySource` is a concurrent
// in-process implementation used by tests and the capture-file CLI.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tokio::sync::watch;

use crate::model::{EntityKind, MeasurementSettings};

/// Transport-level failures reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("pool is unreachable: {0}")]
    Unreachable(String),

    #[error("attribute {attribute} could not be read: {reason}")]
    Attribute { attribute: String, reason: String },

    #[error("command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("{0} is not supported by this source")]
    Unsupported(String),
}

/// Arguments of a class metadata query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassQuery {
    /// Controller type token, e.g. `Motor`.
    pub controller_type: String,
    /// Library file name.
    pub file_name: String,
    pub class_name: String,
    /// Set to query instance properties of a controller.
    pub instance: Option<String>,
}

impl ClassQuery {
    /// Positional argument array of the query.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.controller_type.clone(),
            self.file_name.clone(),
            self.class_name.clone(),
        ];
        args.extend(self.instance.clone());
        args
    }
}

/// Read and write access to one remote pool.
pub trait PoolSource: Send + Sync + 'static {
    /// Fetch the snapshot lines of one collection.
    fn read_list(&self, kind: EntityKind) -> BoxFuture<'_, Result<Vec<String>, SourceError>>;

    /// `GetControllerInfoEx`: class metadata blob.
    fn class_info_ex(&self, query: &ClassQuery) -> BoxFuture<'_, Result<Bytes, SourceError>>;

    /// `GetControllerInfo`: string-array class or instance info.
    fn class_info(&self, query: &ClassQuery) -> BoxFuture<'_, Result<Vec<String>, SourceError>>;

    /// Run one command with positional string arguments.
    fn invoke(&self, command: &str, args: Vec<String>) -> BoxFuture<'_, Result<(), SourceError>>;

    /// Read the acquisition settings of a measurement group.
    fn measurement_settings(&self, address: &str) -> BoxFuture<'_, Result<MeasurementSettings, SourceError>>;

    /// Availability published by the source itself, if it tracks one.
    fn availability(&self) -> Option<watch::Receiver<bool>> {
        None
    }
}

// ── MemorySource ────────────────────────────────────────────────────

/// A command seen by a `MemorySource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub command: String,
    pub args: Vec<String>,
}

/// In-memory pool backed by `DashMap`s; cheap to clone and share.
#[derive(Clone)]
pub struct MemorySource {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    lists: DashMap<EntityKind, Vec<String>>,
    failing: DashMap<EntityKind, String>,
    class_blobs: DashMap<(String, String), Bytes>,
    class_infos: DashMap<(String, String), Vec<String>>,
    instance_infos: DashMap<String, Vec<String>>,
    settings: DashMap<String, MeasurementSettings>,
    commands: DashMap<u64, RecordedCommand>,
    next_seq: AtomicU64,
    rejected: DashMap<String, String>,
    available: watch::Sender<bool>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        let (available, _) = watch::channel(false);
        Self {
            inner: Arc::new(MemoryInner {
                lists: DashMap::new(),
                failing: DashMap::new(),
                class_blobs: DashMap::new(),
                class_infos: DashMap::new(),
                instance_infos: DashMap::new(),
                settings: DashMap::new(),
                commands: DashMap::new(),
                next_seq: AtomicU64::new(0),
                rejected: DashMap::new(),
                available,
            }),
        }
    }

    pub fn set_list<I, S>(&self, kind: EntityKind, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner
            .lists
            .insert(kind, lines.into_iter().map(Into::into).collect());
    }

    /// Make reads of `kind` fail until cleared.
    pub fn fail_list(&self, kind: EntityKind, reason: impl Into<String>) {
        self.inner.failing.insert(kind, reason.into());
    }

    pub fn clear_failure(&self, kind: EntityKind) {
        self.inner.failing.remove(&kind);
    }

    pub fn set_class_blob(&self, file_name: &str, class_name: &str, blob: impl Into<Bytes>) {
        self.inner
            .class_blobs
            .insert((file_name.to_owned(), class_name.to_owned()), blob.into());
    }

    pub fn set_class_info(&self, file_name: &str, class_name: &str, fields: Vec<String>) {
        self.inner
            .class_infos
            .insert((file_name.to_owned(), class_name.to_owned()), fields);
    }

    pub fn set_instance_info(&self, controller: &str, fields: Vec<String>) {
        self.inner.instance_infos.insert(controller.to_owned(), fields);
    }

    pub fn set_measurement_settings(&self, address: &str, settings: MeasurementSettings) {
        self.inner.settings.insert(address.to_owned(), settings);
    }

    /// Make `command` fail with `reason`.
    pub fn reject_command(&self, command: &str, reason: impl Into<String>) {
        self.inner.rejected.insert(command.to_owned(), reason.into());
    }

    /// Commands received so far, in arrival order.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        let mut entries: Vec<(u64, RecordedCommand)> = self
            .inner
            .commands
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, c)| c).collect()
    }

    /// Publish availability to any client following this source.
    pub fn set_available(&self, available: bool) {
        self.inner.available.send_replace(available);
    }
}

impl PoolSource for MemorySource {
    fn read_list(&self, kind: EntityKind) -> BoxFuture<'_, Result<Vec<String>, SourceError>> {
        let result = if let Some(reason) = self.inner.failing.get(&kind) {
            Err(SourceError::Attribute {
                attribute: kind.attribute().to_owned(),
                reason: reason.value().clone(),
            })
        } else {
            Ok(self
                .inner
                .lists
                .get(&kind)
                .map(|l| l.value().clone())
                .unwrap_or_default())
        };
        async move { result }.boxed()
    }

    fn class_info_ex(&self, query: &ClassQuery) -> BoxFuture<'_, Result<Bytes, SourceError>> {
        let key = (query.file_name.clone(), query.class_name.clone());
        let result = self
            .inner
            .class_blobs
            .get(&key)
            .map(|b| b.value().clone())
            .ok_or_else(|| SourceError::Unsupported("GetControllerInfoEx".into()));
        async move { result }.boxed()
    }

    fn class_info(&self, query: &ClassQuery) -> BoxFuture<'_, Result<Vec<String>, SourceError>> {
        let found = match &query.instance {
            Some(instance) => self.inner.instance_infos.get(instance).map(|f| f.value().clone()),
            None => self
                .inner
                .class_infos
                .get(&(query.file_name.clone(), query.class_name.clone()))
                .map(|f| f.value().clone()),
        };
        let result = found.ok_or_else(|| SourceError::Command {
            command: "GetControllerInfo".into(),
            reason: format!("no info for {}/{}", query.file_name, query.class_name),
        });
        async move { result }.boxed()
    }

    fn invoke(&self, command: &str, args: Vec<String>) -> BoxFuture<'_, Result<(), SourceError>> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.commands.insert(
            seq,
            RecordedCommand {
                command: command.to_owned(),
                args,
            },
        );
        let result = match self.inner.rejected.get(command) {
            Some(reason) => Err(SourceError::Command {
                command: command.to_owned(),
                reason: reason.value().clone(),
            }),
            None => Ok(()),
        };
        async move { result }.boxed()
    }

    fn measurement_settings(&self, address: &str) -> BoxFuture<'_, Result<MeasurementSettings, SourceError>> {
        let result = self
            .inner
            .settings
            .get(address)
            .map(|s| s.value().clone())
            .ok_or_else(|| SourceError::Attribute {
                attribute: format!("{address}/Integration_time"),
                reason: "not set".into(),
            });
        async move { result }.boxed()
    }

    fn availability(&self) -> Option<watch::Receiver<bool>> {
        Some(self.inner.available.subscribe())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_and_failures() {
        let source = MemorySource::new();
        source.set_list(EntityKind::Motors, ["mot1 (motor/ctrl1/1) (ctrl1/1)"]);
        assert_eq!(source.read_list(EntityKind::Motors).await.unwrap().len(), 1);
        assert!(source.read_list(EntityKind::Controllers).await.unwrap().is_empty());

        source.fail_list(EntityKind::Motors, "timeout");
        let err = source.read_list(EntityKind::Motors).await.unwrap_err();
        assert!(err.to_string().contains("MotorList"));
    }

    #[tokio::test]
    async fn commands_are_recorded_in_order() {
        let source = MemorySource::new();
        source.reject_command("DeleteMotor", "motor is moving");
        source.invoke("CreateMotor", vec!["1".into(), "mot1".into(), "ctrl1".into()]).await.unwrap();
        assert!(source.invoke("DeleteMotor", vec!["mot1".into()]).await.is_err());

        let seen = source.commands();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].command, "CreateMotor");
        assert_eq!(seen[1].args, vec!["mot1"]);
    }

    #[test]
    fn class_query_args() {
        let query = ClassQuery {
            controller_type: "Motor".into(),
            file_name: "icepap.py".into(),
            class_name: "IcepapCtrl".into(),
            instance: Some("ctrl1".into()),
        };
        assert_eq!(query.args(), vec!["Motor", "icepap.py", "IcepapCtrl", "ctrl1"]);
    }
}
