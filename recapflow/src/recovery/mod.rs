//! Durable persistence of results that could not be fully delivered.
//!
//! Records are keyed by `(recording id, failing stage)`; saving the same key
//! again overwrites. Nothing here expires or deletes records on its own:
//! only an explicit purge (manual, or the [`RecoveryReplayer`]) removes one.

mod blob;
mod record;
mod replay;
mod store;

pub use blob::BlobRecoveryStore;
pub use record::{
    RecordingIdentity, RecoveryKey, RecoveryRecord, RecoveryReference, RemediationAction,
    RECOVERY_SCHEMA_VERSION,
};
pub use replay::{RecoveryReplayer, ReplayReport};
pub use store::{InMemoryRecoveryStore, RecoveryStore};
