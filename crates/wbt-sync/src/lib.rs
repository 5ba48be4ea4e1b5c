//! wbt-sync
//!
//! Scheduling and mutual-exclusion layer for the tariff sync pipeline.
//! The [`coordinator::SyncCoordinator`] runs one cycle end to end
//! (lock → fetch → validate → reconcile → conditional export); the
//! [`scheduler`] module wires it to cron triggers; [`config`] reads the
//! process environment once at startup.

pub mod config;
pub mod coordinator;
pub mod scheduler;
