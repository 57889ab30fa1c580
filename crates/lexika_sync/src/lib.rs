//! # Lexika Sync
//!
//! Sync orchestration for the Lexika offline-first core.
//!
//! This crate provides:
//! - The sync orchestrator (upload, download, bookkeeping phases)
//! - Last-write-wins conflict resolution over server timestamps
//! - The progressive first load (small first page, streamed remainder)
//! - A remote API abstraction with an HTTP implementation seam
//! - A lifecycle event bus for UI collaborators
//!
//! ## Architecture
//!
//! A sync run performs **upload-then-download**:
//! 1. Drain the persisted sync queue against the remote, FIFO
//! 2. Pull remote state and merge it through the conflict resolver
//! 3. Write sync bookkeeping and return to idle
//!
//! Upload precedes download so a just-created local record is not
//! clobbered by a stale remote read.
//!
//! ## Key Invariants
//!
//! - At most one run is active; extra requests are dropped, not queued
//! - Local writes always succeed, regardless of sync health
//! - A failed operation is retried on later runs up to a fixed ceiling,
//!   then discarded: delivery to the remote is at-most-N, not guaranteed
//! - Errors never escape the orchestrator; they surface as status events

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod error;
mod events;
mod http;
mod loader;
mod orchestrator;
mod remote;

pub use config::SyncConfig;
pub use conflict::{resolve, Resolution};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SyncEvent, SyncStatus};
pub use http::{HttpClient, HttpRemote, HttpResponse, Method};
pub use loader::{FirstPage, ProgressiveLoader};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncReport};
pub use remote::{CardPage, MockRemote, NewCard, RemoteApi};
