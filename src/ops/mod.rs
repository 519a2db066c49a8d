//! Operations and observability.
//!
//! - [`observability`] - Metrics registry, cooldown metrics and snapshots

pub mod observability;
