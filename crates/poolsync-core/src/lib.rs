//! Live synchronization engine between a hardware pool server and its
//! consumers (CLI, monitors, GUIs).
//!
//! The pool exposes one text snapshot per entity kind. This crate keeps a
//! local, cross-linked graph of those entities in step with the remote side:
//!
//! - **[`PoolClient`]**: lifecycle facade. [`set_available()`](PoolClient::set_available)
//!   bootstraps every collection in dependency order and starts the
//!   periodic refresher; [`set_unavailable()`](PoolClient::set_unavailable)
//!   tears the whole graph down. [`PoolClient::oneshot()`] covers single
//!   CLI invocations.
//!
//! - **Decoder** ([`codec`]): one small parser per entity kind, turning a
//!   snapshot line into a [`Descriptor`] or a [`DecodeError`]. A bad line
//!   is skipped, never fatal to its batch.
//!
//! - **Engine**: a single task owning the entity graph. It reconciles each
//!   snapshot against the current collection, keeps surviving entities by
//!   reference, resolves cross-references lazily, and discards data from a
//!   finished availability epoch.
//!
//! - **[`PoolStore`] / [`EntityStream`]**: lock-free `watch` snapshots of
//!   every collection, plus per-kind observer lists ([`Subscription`])
//!   receiving one [`ChangeNotice`] per effective reconcile.
//!
//! - **[`Command`]**: typed write operations routed through an `mpsc`
//!   channel, each followed by a refresh of the collections it touched.
//!
//! - **[`PoolSource`]**: the transport boundary. [`MemorySource`] is an
//!   in-process implementation for tests and capture files.

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
mod resolve;
pub mod source;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{Availability, BootstrapReport, PoolClient};
pub use codec::{Descriptor, decode_line, decode_snapshot, extract_names};
pub use command::requests::*;
pub use command::{Command, CommandResult};
pub use config::PoolConfig;
pub use engine::EngineStatus;
pub use error::{CoreError, DecodeError};
pub use source::{ClassQuery, MemorySource, PoolSource, RecordedCommand, SourceError};
pub use store::{ChangeSet, CollectionSnapshot, DiscardReason, PoolStore, ReconcileOutcome};
pub use stream::{ChangeNotice, EntityStream, Identified, ObserverId, SnapshotStream, Subscription};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ClassInfo, Controller, ControllerClass, ControllerState, ControllerType, Element, ElementKind,
    EntityKind, Language, MeasurementSettings, PropertyValue,
};
