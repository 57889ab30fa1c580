//! # Lexika Store
//!
//! Embedded, indexed local store for the Lexika offline-first core.
//!
//! This crate provides:
//! - An async document store over a pluggable snapshot backend
//! - Primary-key storage for cards and languages
//! - Secondary indexes: cards by language, unique language codes
//! - The persisted sync queue of pending local mutations
//! - Free-form sync metadata and host preferences
//!
//! ## Key Invariants
//!
//! - Initialization is lazy and memoized: the first caller loads the
//!   snapshot; concurrent early callers share the outcome
//! - Each mutating call is atomic: it either persists fully or leaves the
//!   store unchanged
//! - The sync queue preserves enqueue (FIFO) order
//! - Storage failures propagate to the caller and are never retried here

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod store;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use error::{StoreError, StoreResult};
pub use store::LocalStore;
