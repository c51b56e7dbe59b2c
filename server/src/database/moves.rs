use chrono::{DateTime, Utc};
use parlor_types::{GameToken, MoveData, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{json_err, SqliteTransaction};

/// One entry of a session's append-only move history.
#[derive(Debug, Clone)]
pub struct MoveRecord {
    pub id: i64,
    pub token: GameToken,
    pub move_number: i64,
    pub player: UserId,
    pub data: MoveData,
    pub created_at: DateTime<Utc>,
}

pub async fn count(tx: &mut SqliteTransaction, token: &GameToken) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM game_moves WHERE game_token = ?")
        .bind(&token.0)
        .fetch_one(&mut **tx)
        .await
}

pub async fn append(
    tx: &mut SqliteTransaction,
    token: &GameToken,
    move_number: i64,
    player: UserId,
    data: &MoveData,
    created_at: DateTime<Utc>,
) -> sqlx::Result<i64> {
    let encoded = serde_json::to_string(data).map_err(|e| json_err("move_data", e))?;
    let result = sqlx::query(
        "INSERT INTO game_moves (game_token, move_number, player_id, move_data, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&token.0)
    .bind(move_number)
    .bind(player.0)
    .bind(encoded)
    .bind(created_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Full history in insertion order.
pub async fn history(
    tx: &mut SqliteTransaction,
    token: &GameToken,
) -> sqlx::Result<Vec<MoveRecord>> {
    let rows = sqlx::query(
        "SELECT id, game_token, move_number, player_id, move_data, created_at \
         FROM game_moves WHERE game_token = ? ORDER BY id",
    )
    .bind(&token.0)
    .fetch_all(&mut **tx)
    .await?;
    rows.iter().map(from_row).collect()
}

fn from_row(row: &SqliteRow) -> sqlx::Result<MoveRecord> {
    let encoded: String = row.try_get("move_data")?;
    Ok(MoveRecord {
        id: row.try_get("id")?,
        token: GameToken(row.try_get("game_token")?),
        move_number: row.try_get("move_number")?,
        player: UserId(row.try_get("player_id")?),
        data: serde_json::from_str(&encoded).map_err(|e| json_err("move_data", e))?,
        created_at: row.try_get("created_at")?,
    })
}
