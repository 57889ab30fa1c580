//! # Lexika Types
//!
//! Shared record and mutation types for the Lexika offline-first core.
//!
//! This crate defines:
//! - Record identifiers, including locally generated placeholders
//! - Card records (the domain data) and language records (reference data)
//! - Pending mutations awaiting upload to the remote
//! - Well-known sync metadata keys
//!
//! ## Identifier model
//!
//! Record ids are server-assigned strings. A record created while offline
//! carries a placeholder id until the first successful upload, at which
//! point the sync layer rebinds it to the server-assigned id.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod id;
pub mod meta;
mod operation;
mod record;

pub use id::RecordId;
pub use operation::{EntityKind, MutationKind, PendingOperation};
pub use record::{CardRecord, LanguageRecord, SEARCH_FIELDS};
