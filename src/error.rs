//! Error types for the ladder service
//!
//! Component operations that callers need to branch on return `LadderError`
//! directly; service-level plumbing uses anyhow through the `Result` alias.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific ladder scenarios
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LadderError {
    #[error("Invalid roster size: expected {expected} players, got {actual}")]
    InvalidRosterSize { expected: usize, actual: usize },

    #[error("Duplicate player in roster: {player_id}")]
    DuplicatePlayer { player_id: String },

    #[error("Balance candidate {index} does not exist ({available} available)")]
    InvalidCandidate { index: usize, available: usize },

    #[error("Player not found: {player}")]
    PlayerNotFound { player: String },

    #[error("Player already registered: {reason}")]
    AlreadyRegistered { reason: String },

    #[error("Queue not found: {queue_id}")]
    QueueNotFound { queue_id: String },

    #[error("Queue channel not found: {channel_id}")]
    ChannelNotFound { channel_id: String },

    #[error("Queue is full: {queue_id}")]
    QueueFull { queue_id: String },

    #[error("Player {player} is already queued")]
    AlreadyQueued { player: String },

    #[error("Player {player} is not vouched")]
    NotVouched { player: String },

    #[error("Player {player} is banned")]
    Banned { player: String },

    #[error("Rating {rating} of {player} is outside the allowed range {min}..={max}")]
    RatingOutOfRange {
        player: String,
        rating: i32,
        min: i32,
        max: i32,
    },

    #[error("Channel {channel_id} has an active queue")]
    ChannelHasActiveQueue { channel_id: String },

    #[error("Match recording refused: {reason}")]
    MatchRecordingRefused { reason: String },

    #[error("Worker unavailable: {worker_id}")]
    WorkerUnavailable { worker_id: String },

    #[error("Lobby driver error: {message}")]
    Driver { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal service error: {message}")]
    Internal { message: String },
}

impl LadderError {
    /// Shorthand for the lock-poisoning case used by the in-memory stores
    pub fn lock(what: &str) -> Self {
        LadderError::Internal {
            message: format!("Failed to acquire {} lock", what),
        }
    }

    /// Recover the typed error behind an anyhow error, if there is one
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        err.downcast_ref::<LadderError>()
            .cloned()
            .unwrap_or_else(|| LadderError::Internal {
                message: err.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_error_survives_anyhow() {
        let err: anyhow::Error = LadderError::QueueFull {
            queue_id: "q1".to_string(),
        }
        .into();
        assert_eq!(
            LadderError::from_anyhow(&err),
            LadderError::QueueFull {
                queue_id: "q1".to_string()
            }
        );

        let other = anyhow::anyhow!("socket closed");
        assert!(matches!(
            LadderError::from_anyhow(&other),
            LadderError::Internal { message } if message == "socket closed"
        ));
    }
}
