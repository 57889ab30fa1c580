//! Conflict resolution between local and remote record versions.

use lexika_types::CardRecord;

/// Outcome of comparing a remote version against the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The remote version overwrites the local record.
    AcceptRemote,
    /// The local record stays; it will be uploaded in a later pass.
    KeepLocal,
}

/// Decides between a remote version and the local version of the same id.
///
/// Last-write-wins at record granularity over the server-authoritative
/// `updated_at` timestamp:
///
/// - No local version: the remote is an addition, accept it.
/// - Remote strictly newer: accept it.
/// - Otherwise keep local. This includes exact timestamp ties and remote
///   records without a timestamp; the tie favors local and is not
///   robust against clock skew between client and server.
pub fn resolve(local: Option<&CardRecord>, remote: &CardRecord) -> Resolution {
    let Some(local) = local else {
        return Resolution::AcceptRemote;
    };
    match (remote.updated_at, local.updated_at) {
        (Some(remote_at), Some(local_at)) if remote_at > local_at => Resolution::AcceptRemote,
        (Some(_), None) => Resolution::AcceptRemote,
        _ => Resolution::KeepLocal,
    }
}
