use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub mod game;
pub mod invitation;
pub mod moves;

pub type SqliteTransaction = sqlx::Transaction<'static, sqlx::Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn begin(&self) -> Result<SqliteTransaction, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&self.pool).await?;
            }
        }
        Ok(())
    }
}

// The unique index over the normalized player pair closes the read-then-write
// race on concurrent invitation creation at the storage layer.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS game_invitations (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id     INTEGER NOT NULL,
    recipient_id  INTEGER NOT NULL,
    game_kind     TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    created_at    TIMESTAMP NOT NULL,
    game_token    TEXT UNIQUE
);

CREATE UNIQUE INDEX IF NOT EXISTS pending_invitation_pair
ON game_invitations (
    MIN(sender_id, recipient_id),
    MAX(sender_id, recipient_id),
    game_kind
)
WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS multiplayer_games (
    game_token          TEXT PRIMARY KEY,
    game_kind           TEXT NOT NULL,
    white_id            INTEGER NOT NULL,
    black_id            INTEGER NOT NULL,
    board_state         TEXT NOT NULL,
    current_turn        TEXT NOT NULL,
    white_captures      INTEGER NOT NULL DEFAULT 0,
    black_captures      INTEGER NOT NULL DEFAULT 0,
    castling_rights     TEXT,
    en_passant_target   TEXT,
    last_move           TEXT,
    game_over           INTEGER NOT NULL DEFAULT 0,
    winner_id           INTEGER,
    created_at          TIMESTAMP NOT NULL,
    last_updated        TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS game_moves (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    game_token   TEXT NOT NULL REFERENCES multiplayer_games(game_token) ON DELETE CASCADE,
    move_number  INTEGER NOT NULL,
    player_id    INTEGER NOT NULL,
    move_data    TEXT NOT NULL,
    created_at   TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS game_moves_by_token
ON game_moves (game_token, id)
"#;

pub(crate) fn decode_err(column: &str, message: impl Into<String>) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.into(),
        source: message.into().into(),
    }
}

pub(crate) fn json_err(column: &str, e: serde_json::Error) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.into(),
        source: Box::new(e),
    }
}
