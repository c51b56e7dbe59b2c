use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parlor_types::{GameKind, GameSession, GameToken, MoveData, Position, Rules, UserId};

use crate::database::moves::MoveRecord;
use crate::database::{game, moves, Database};
use crate::error::GameError;

/// Registry of per-kind move validators.
#[derive(Default)]
pub struct Rulebook {
    validators: HashMap<GameKind, Arc<dyn Rules>>,
}

impl Rulebook {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All game kinds this server knows how to referee.
    pub fn standard() -> Self {
        let mut book = Self::empty();
        book.register(Arc::new(parlor_chess::Chess));
        book
    }

    pub fn register(&mut self, rules: Arc<dyn Rules>) {
        self.validators.insert(rules.kind(), rules);
    }

    pub fn get(&self, kind: &GameKind) -> Option<&Arc<dyn Rules>> {
        self.validators.get(kind)
    }
}

/// The authoritative turn engine. Every move goes through it; clients only
/// propose.
pub struct TurnEngine {
    db: Database,
    rulebook: Rulebook,
    strict: bool,
}

impl TurnEngine {
    pub fn new(db: Database, rulebook: Rulebook) -> Self {
        Self {
            db,
            rulebook,
            strict: true,
        }
    }

    /// Legacy compatibility mode: after the turn check, the client's proposed
    /// state is stored as-is instead of being re-derived server-side.
    pub fn trusting(db: Database, rulebook: Rulebook) -> Self {
        Self {
            db,
            rulebook,
            strict: false,
        }
    }

    pub async fn state(&self, token: &GameToken) -> Result<GameSession, GameError> {
        let mut tx = self.db.begin().await?;
        game::fetch(&mut tx, token)
            .await?
            .ok_or(GameError::SessionNotFound)
    }

    /// Validates and applies one move, returning the canonical session state
    /// after it. The position update and the history append commit together
    /// or not at all.
    pub async fn apply_move(
        &self,
        token: &GameToken,
        acting: UserId,
        move_data: MoveData,
        proposed: Position,
    ) -> Result<GameSession, GameError> {
        let mut tx = self.db.begin().await?;
        let session = game::fetch(&mut tx, token)
            .await?
            .ok_or(GameError::SessionNotFound)?;
        if session.position.game_over {
            return Err(GameError::GameOver);
        }
        // Non-participants fail the same way an out-of-turn player does.
        let role = session
            .role_of(acting)
            .filter(|&r| r == session.position.turn)
            .ok_or(GameError::NotYourTurn)?;

        let next = match self.rulebook.get(&session.kind).filter(|_| self.strict) {
            Some(rules) => {
                let derived = rules.apply(&session.position, role, &move_data)?;
                if derived != proposed {
                    return Err(GameError::StateMismatch);
                }
                derived
            }
            None => proposed,
        };

        let winner_id = next.winner.map(|r| session.player(r));
        let now = Utc::now();
        let updated =
            game::update_position(&mut tx, token, &next, session.position.turn, winner_id, now)
                .await?;
        if updated == 0 {
            // Lost a write race; the snapshot we validated against is stale.
            return Err(GameError::NotYourTurn);
        }

        let prior_count = moves::count(&mut tx, token).await?;
        let move_number = prior_count / 2 + 1;
        moves::append(&mut tx, token, move_number, acting, &move_data, now).await?;
        tx.commit().await?;

        tracing::info!(token = %token, player = %acting, move_number, "move applied");
        Ok(GameSession {
            position: next,
            last_updated: now,
            ..session
        })
    }

    pub async fn history(&self, token: &GameToken) -> Result<Vec<MoveRecord>, GameError> {
        let mut tx = self.db.begin().await?;
        if game::fetch(&mut tx, token).await?.is_none() {
            return Err(GameError::SessionNotFound);
        }
        Ok(moves::history(&mut tx, token).await?)
    }
}
