//! Shared primitive types used across the entire simulation.

use chrono::{DateTime, Utc};

/// A real-world instant. Every core function takes "now" explicitly;
/// nothing in the core reads the wall clock.
pub type Instant = DateTime<Utc>;

/// A duration measured on the accelerated game clock.
pub type GameHours = f64;

/// A stable, unique identifier for a player (candidate).
pub type PlayerId = String;

/// A stable, unique identifier for any persisted record.
pub type RecordId = String;

/// The canonical run identifier.
pub type RunId = String;
