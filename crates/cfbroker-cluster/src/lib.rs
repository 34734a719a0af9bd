//! cfbroker-cluster — client for the cluster management REST API.
//!
//! Wraps the database (`bdb`) endpoints the broker needs, polls new
//! databases until the cluster reports them active, and validates the
//! loosely-typed parameters callers may send with an update.
//!
//! # Architecture
//!
//! ```text
//! ClusterApi (trait)
//!   └── ClusterClient (reqwest, basic auth)
//!       ├── create_database() → POST /v1/bdbs
//!       │   └── poll_until_active() → GET /v1/bdbs/{uid} every interval
//!       ├── update_database() → PUT /v1/bdbs/{uid}
//!       └── delete_database() → DELETE /v1/bdbs/{uid}
//! ```
//!
//! Polling runs against an injected [`Clock`], so tests can drive the
//! timeout without waiting on the wall clock.

pub mod client;
pub mod error;
pub mod params;
pub mod poll;

pub use client::{ClusterApi, ClusterClient, DatabaseStatus};
pub use error::{ClusterError, ClusterResult};
pub use params::{ParamError, validate_update_params};
pub use poll::{Clock, ManualClock, TokioClock, poll_until_active};
