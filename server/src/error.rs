use parlor_types::RuleViolation;

/// Failure modes surfaced to players. Everything except `Storage` maps to a
/// message safe to relay verbatim over the wire.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("You cannot invite yourself to a game")]
    SelfInvite,
    #[error("An invitation between these players is already pending")]
    DuplicatePending,
    #[error("Invitation not found or already handled")]
    InvitationNotFound,
    #[error("Game not found")]
    SessionNotFound,
    #[error("This game is already over")]
    GameOver,
    #[error("It is not your turn")]
    NotYourTurn,
    #[error("You are not a player in this game")]
    NotParticipant,
    #[error("Illegal move: {0}")]
    IllegalMove(#[from] RuleViolation),
    #[error("Submitted game state does not match the server's")]
    StateMismatch,
    #[error("Storage error")]
    Storage(#[from] sqlx::Error),
}

impl GameError {
    /// Message suitable for broadcasting back to the offending client.
    pub fn user_message(&self) -> String {
        match self {
            Self::Storage(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }
}
