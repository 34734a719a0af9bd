//! cfbroker-state — durable broker state for cfbroker.
//!
//! The broker state is a single JSON document mapping broker instance IDs
//! to the credentials the cluster assigned them:
//!
//! ```json
//! {"AvailableInstances": [{"ID": "...", "Credentials": {"UID": 1, "Port": 11909, "IPList": ["10.0.0.1"], "Password": "..."}}]}
//! ```
//!
//! Persisters are always loaded and saved whole. Each persister serializes
//! its own `load`/`save` calls with an internal mutex; callers that need a
//! read-modify-write cycle must hold their own lock across it.

pub mod error;
pub mod persister;
pub mod types;

pub use error::{StateError, StateResult};
pub use persister::{LocalPersister, MemoryPersister, StatePersister};
pub use types::*;
