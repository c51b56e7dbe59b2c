use chrono::Utc;
use parlor_types::{GameKind, GameSession, GameToken, Position, UserId};
use rand::Rng;

use crate::database::{game, SqliteTransaction};

/// Coin flip deciding which player takes the first-moving side. Neither the
/// sender nor the recipient gets an edge.
pub fn assign_sides<R: Rng + ?Sized>(
    rng: &mut R,
    sender: UserId,
    recipient: UserId,
) -> (UserId, UserId) {
    if rng.gen_bool(0.5) {
        (sender, recipient)
    } else {
        (recipient, sender)
    }
}

/// Creates the game row in its canonical starting state, inside the same
/// transaction that resolves the invitation.
pub async fn initialize_session<R: Rng + ?Sized>(
    tx: &mut SqliteTransaction,
    token: &GameToken,
    kind: &GameKind,
    sender: UserId,
    recipient: UserId,
    rng: &mut R,
) -> sqlx::Result<GameSession> {
    let (white, black) = assign_sides(rng, sender, recipient);
    let now = Utc::now();
    let session = GameSession {
        token: token.clone(),
        kind: kind.clone(),
        white,
        black,
        position: Position::initial(kind),
        created_at: now,
        last_updated: now,
    };
    game::insert(tx, &session).await?;
    Ok(session)
}
