//! dbfleet-api: desired-state records and the control-plane store.
//!
//! Records are keyed by `(namespace, name)`, carry a resource version for
//! optimistic concurrency, and may hold finalizers that block physical
//! deletion until the owning controller clears them.

pub mod backup;
pub mod condition;
pub mod deployment;
pub mod meta;
pub mod search;
pub mod store;
pub mod user;

pub use backup::{BackupPolicy, BackupSchedule};
pub use condition::{Condition, ConditionType, Reason};
pub use deployment::{Deployment, DeploymentKind};
pub use meta::{ObjectKey, ObjectMeta, Resource};
pub use search::SearchIndexConfig;
pub use store::{Event, MemoryStore, Store, StoreError, StoreExt};
pub use user::{DatabaseUser, Secret};
