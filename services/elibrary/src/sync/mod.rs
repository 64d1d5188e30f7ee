pub mod outbox;
pub mod policy;
pub mod reconcile;

pub use outbox::{Mutation, Outbox, PendingMutation};
pub use policy::{SyncState, Synced, SyncedLibrary};
pub use reconcile::{ReconcileReport, Reconciler};
