//! Deterministic campaign simulation core.
//!
//! Pure subsystems (`*_subsystem`) take explicit `now` and seed arguments and
//! return new values. `engine::CampaignEngine` is the only place that reads
//! the clock, talks to the store and emits audit events.

pub mod balance_subsystem;
pub mod clock;
pub mod command;
pub mod config;
pub mod endorsement_subsystem;
pub mod engine;
pub mod error;
pub mod event;
pub mod fairness_subsystem;
pub mod influence_subsystem;
pub mod negative_ad_subsystem;
pub mod opposition_subsystem;
pub mod phase_subsystem;
pub mod polling_subsystem;
pub mod rng;
pub mod scandal_subsystem;
pub mod snapshot;
pub mod spend;
pub mod store;
pub mod types;
