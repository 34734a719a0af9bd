//! cfbroker-lifecycle — service instance lifecycle.
//!
//! Ties the cluster client to the persisted broker state. The creator is
//! the only writer of the state; the binder only reads it.
//!
//! # Architecture
//!
//! ```text
//! DefaultCreator (one tokio mutex around every call)
//!   ├── StatePersister (load → modify → save)
//!   └── ClusterApi (create / update / delete database)
//!
//! DefaultBinder
//!   └── StatePersister (load, look up credentials)
//! ```
//!
//! The remote call and the state save are not atomic. If the save fails
//! after the cluster has already changed, the divergence is logged at
//! `error` and the save error is returned.

pub mod binder;
pub mod creator;
pub mod error;

pub use binder::{BindingCredentials, DefaultBinder, InstanceBinder};
pub use creator::{DefaultCreator, InstanceCreator};
pub use error::{LifecycleError, LifecycleResult};
