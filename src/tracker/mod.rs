//! The session tracker: a stopwatch for the platform in use plus the per-day usage ledger.
//!
//! [machine::SessionTracker] holds the state machine, [service::TrackerService] runs it as the
//! single owner of all state, and [service::TrackerHandle] is how the outside talks to it.

pub mod ledger;
pub mod machine;
pub mod message;
pub mod service;
pub mod session;
pub mod snapshot;
