//! lantern-data - Host-side access to the preview data API
//!
//! The guest runtime does its own fetching; this crate reproduces the same
//! request shapes and degradation rules for tooling:
//!   - `QuerySpec` / `QueryState` - table reads and stale-but-available state
//!   - `DataClient` - blocking HTTP client (ureq)
//!   - `Poller` - stoppable fixed-interval re-fetch

mod client;
mod config;
mod error;
mod poll;
mod query;

pub use client::DataClient;
pub use config::{resolve_env_vars, DataApiConfig};
pub use error::DataError;
pub use poll::Poller;
pub use query::{classify, error_message, filter_by_quantity, QuerySpec, QueryState};
