use std::fmt;

use chrono::{DateTime, Utc};
use ijson::IValue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

pub mod chess;

use chess::{Board, CastlingRights, ChessMove, LastMove, Square};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle naming one game session. Doubles as the relay room key and
/// the externally shared link identifier, so it must be unguessable.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Serialize, Deserialize)]
pub struct GameToken(pub String);

impl GameToken {
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for GameToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum GameKind {
    Chess,
    Other(String),
}

impl GameKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Chess => "chess",
            Self::Other(s) => s,
        }
    }
    /// Kinds without a session are invitation-only: accepting resolves the
    /// invitation but creates no game row.
    pub fn has_session(&self) -> bool {
        matches!(self, Self::Chess)
    }
}

impl From<&str> for GameKind {
    fn from(s: &str) -> Self {
        match s {
            "chess" => Self::Chess,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for GameKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GameKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// One of the two fixed sides in a session, independent of which identity
/// occupies it. White is the first mover.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "w")]
    White,
    #[serde(rename = "b")]
    Black,
}

impl Role {
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
    pub fn as_str(self) -> &'static str {
        match self {
            Self::White => "w",
            Self::Black => "b",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "w" => Ok(Self::White),
            "b" => Ok(Self::Black),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

/// Board/state blob, tagged by game kind. Generic kinds keep an opaque JSON
/// escape hatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshot {
    Chess(Board),
    Generic(IValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoveData {
    Chess(ChessMove),
    Generic(IValue),
}

/// The mutable per-move state of a session, detached from the identities
/// occupying the two roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub board: Snapshot,
    pub turn: Role,
    pub white_captures: i64,
    pub black_captures: i64,
    pub castling: Option<CastlingRights>,
    pub en_passant: Option<Square>,
    pub last_move: Option<LastMove>,
    pub game_over: bool,
    pub winner: Option<Role>,
}

impl Position {
    /// Canonical starting state for a game kind.
    pub fn initial(kind: &GameKind) -> Self {
        match kind {
            GameKind::Chess => Self {
                board: Snapshot::Chess(Board::initial()),
                turn: Role::White,
                white_captures: 0,
                black_captures: 0,
                castling: Some(CastlingRights::default()),
                en_passant: None,
                last_move: None,
                game_over: false,
                winner: None,
            },
            GameKind::Other(_) => Self {
                board: Snapshot::Generic(IValue::NULL),
                turn: Role::White,
                white_captures: 0,
                black_captures: 0,
                castling: None,
                en_passant: None,
                last_move: None,
                game_over: false,
                winner: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub token: GameToken,
    pub kind: GameKind,
    pub white: UserId,
    pub black: UserId,
    pub position: Position,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl GameSession {
    pub fn player(&self, role: Role) -> UserId {
        match role {
            Role::White => self.white,
            Role::Black => self.black,
        }
    }
    pub fn role_of(&self, user: UserId) -> Option<Role> {
        if user == self.white {
            Some(Role::White)
        } else if user == self.black {
            Some(Role::Black)
        } else {
            None
        }
    }
    pub fn winner_id(&self) -> Option<UserId> {
        self.position.winner.map(|role| self.player(role))
    }
}

/// Events pushed over a session's relay channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    GameStateUpdate(GameSession),
    GameError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("move does not match the game kind")]
    WrongKind,
    #[error("no piece on the source square")]
    EmptySquare,
    #[error("piece belongs to the opponent")]
    NotYourPiece,
    #[error("piece cannot reach that square")]
    IllegalDestination,
    #[error("path is blocked")]
    Blocked,
    #[error("castling is not available")]
    CastlingUnavailable,
    #[error("promotion is missing or invalid")]
    BadPromotion,
    #[error("move leaves own king in check")]
    IntoCheck,
}

/// Server-side move validation for one game kind. Given the state before
/// the move, derives the authoritative state after it.
pub trait Rules: Send + Sync {
    fn kind(&self) -> GameKind;
    fn apply(
        &self,
        prior: &Position,
        mover: Role,
        mv: &MoveData,
    ) -> Result<Position, RuleViolation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serde_uses_single_letter_codes() {
        assert_eq!(serde_json::to_string(&Role::White).unwrap(), "\"w\"");
        assert_eq!(serde_json::to_string(&Role::Black).unwrap(), "\"b\"");
        assert_eq!(serde_json::from_str::<Role>("\"b\"").unwrap(), Role::Black);
    }

    #[test]
    fn game_kind_round_trips_as_plain_string() {
        let chess: GameKind = serde_json::from_str("\"chess\"").unwrap();
        assert_eq!(chess, GameKind::Chess);
        assert!(chess.has_session());
        let racing: GameKind = serde_json::from_str("\"racing\"").unwrap();
        assert_eq!(racing, GameKind::Other("racing".into()));
        assert!(!racing.has_session());
        assert_eq!(serde_json::to_string(&racing).unwrap(), "\"racing\"");
    }

    #[test]
    fn minted_tokens_are_distinct() {
        assert_ne!(GameToken::mint(), GameToken::mint());
    }

    #[test]
    fn initial_chess_position_is_standard() {
        let position = Position::initial(&GameKind::Chess);
        assert_eq!(position.turn, Role::White);
        assert!(!position.game_over);
        assert_eq!(position.castling, Some(CastlingRights::default()));
        assert_eq!(position.en_passant, None);
        assert_eq!(position.last_move, None);
        match &position.board {
            Snapshot::Chess(board) => assert_eq!(*board, Board::initial()),
            Snapshot::Generic(_) => panic!("expected a chess board"),
        }
    }

    #[test]
    fn position_json_round_trips_exactly() {
        let position = Position::initial(&GameKind::Chess);
        let text = serde_json::to_string(&position).unwrap();
        let back: Position = serde_json::from_str(&text).unwrap();
        assert_eq!(back, position);
    }
}
