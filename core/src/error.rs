use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: cannot {action} while {from}")]
    InvalidStateTransition { from: String, action: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Version conflict on campaign state for {player_id}: expected version {expected}")]
    VersionConflict { player_id: String, expected: i64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn transition(from: impl ToString, action: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from:   from.to_string(),
            action: action.to_string(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }
}

pub type SimResult<T> = Result<T, SimError>;

/// Reject negative or non-finite amounts before any state is touched.
pub fn ensure_non_negative(field: &str, value: f64) -> SimResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SimError::Validation(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}
