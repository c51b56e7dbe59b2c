use chrono::{DateTime, Utc};
use parlor_types::chess::{CastlingRights, LastMove, Square};
use parlor_types::{GameKind, GameSession, GameToken, Position, Role, Snapshot, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{decode_err, json_err, SqliteTransaction};

pub async fn insert(tx: &mut SqliteTransaction, session: &GameSession) -> sqlx::Result<()> {
    let p = &session.position;
    sqlx::query(
        "INSERT INTO multiplayer_games \
         (game_token, game_kind, white_id, black_id, board_state, current_turn, \
          white_captures, black_captures, castling_rights, en_passant_target, \
          last_move, game_over, winner_id, created_at, last_updated) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&session.token.0)
    .bind(session.kind.as_str())
    .bind(session.white.0)
    .bind(session.black.0)
    .bind(to_json("board_state", &p.board)?)
    .bind(p.turn.as_str())
    .bind(p.white_captures)
    .bind(p.black_captures)
    .bind(p.castling.as_ref().map(|c| to_json("castling_rights", c)).transpose()?)
    .bind(p.en_passant.as_ref().map(|s| to_json("en_passant_target", s)).transpose()?)
    .bind(p.last_move.as_ref().map(|m| to_json("last_move", m)).transpose()?)
    .bind(p.game_over)
    .bind(session.winner_id().map(|u| u.0))
    .bind(session.created_at)
    .bind(session.last_updated)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn fetch(
    tx: &mut SqliteTransaction,
    token: &GameToken,
) -> sqlx::Result<Option<GameSession>> {
    let row = sqlx::query(
        "SELECT game_token, game_kind, white_id, black_id, board_state, current_turn, \
                white_captures, black_captures, castling_rights, en_passant_target, \
                last_move, game_over, winner_id, created_at, last_updated \
         FROM multiplayer_games WHERE game_token = ?",
    )
    .bind(&token.0)
    .fetch_optional(&mut **tx)
    .await?;
    row.as_ref().map(from_row).transpose()
}

/// Compare-and-set over the turn column. Returns the number of rows updated;
/// zero means another move landed first (or the game finished) and the caller
/// must not record this one.
pub async fn update_position(
    tx: &mut SqliteTransaction,
    token: &GameToken,
    next: &Position,
    prior_turn: Role,
    winner_id: Option<UserId>,
    last_updated: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE multiplayer_games SET \
            board_state = ?, current_turn = ?, white_captures = ?, black_captures = ?, \
            castling_rights = ?, en_passant_target = ?, last_move = ?, \
            game_over = ?, winner_id = ?, last_updated = ? \
         WHERE game_token = ? AND current_turn = ? AND game_over = 0",
    )
    .bind(to_json("board_state", &next.board)?)
    .bind(next.turn.as_str())
    .bind(next.white_captures)
    .bind(next.black_captures)
    .bind(next.castling.as_ref().map(|c| to_json("castling_rights", c)).transpose()?)
    .bind(next.en_passant.as_ref().map(|s| to_json("en_passant_target", s)).transpose()?)
    .bind(next.last_move.as_ref().map(|m| to_json("last_move", m)).transpose()?)
    .bind(next.game_over)
    .bind(winner_id.map(|u| u.0))
    .bind(last_updated)
    .bind(&token.0)
    .bind(prior_turn.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

fn from_row(row: &SqliteRow) -> sqlx::Result<GameSession> {
    let kind: String = row.try_get("game_kind")?;
    let white = UserId(row.try_get("white_id")?);
    let black = UserId(row.try_get("black_id")?);

    let board: Snapshot = from_json(row, "board_state")?;
    let turn: String = row.try_get("current_turn")?;
    let turn: Role = turn
        .parse()
        .map_err(|e: String| decode_err("current_turn", e))?;
    let castling: Option<CastlingRights> = from_json_opt(row, "castling_rights")?;
    let en_passant: Option<Square> = from_json_opt(row, "en_passant_target")?;
    let last_move: Option<LastMove> = from_json_opt(row, "last_move")?;

    let winner_id: Option<i64> = row.try_get("winner_id")?;
    let winner = match winner_id.map(UserId) {
        None => None,
        Some(u) if u == white => Some(Role::White),
        Some(u) if u == black => Some(Role::Black),
        Some(u) => {
            return Err(decode_err(
                "winner_id",
                format!("winner {u} is not a participant"),
            ))
        }
    };

    Ok(GameSession {
        token: GameToken(row.try_get("game_token")?),
        kind: GameKind::from(kind.as_str()),
        white,
        black,
        position: Position {
            board,
            turn,
            white_captures: row.try_get("white_captures")?,
            black_captures: row.try_get("black_captures")?,
            castling,
            en_passant,
            last_move,
            game_over: row.try_get("game_over")?,
            winner,
        },
        created_at: row.try_get("created_at")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn to_json<T: serde::Serialize>(column: &str, value: &T) -> sqlx::Result<String> {
    serde_json::to_string(value).map_err(|e| json_err(column, e))
}

fn from_json<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> sqlx::Result<T> {
    let text: String = row.try_get(column)?;
    serde_json::from_str(&text).map_err(|e| json_err(column, e))
}

fn from_json_opt<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    column: &str,
) -> sqlx::Result<Option<T>> {
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| serde_json::from_str(&t).map_err(|e| json_err(column, e)))
        .transpose()
}
