use chrono::{DateTime, Utc};
use parlor_types::{GameKind, GameToken, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{decode_err, SqliteTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

impl InviteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Invitation {
    pub id: i64,
    pub sender: UserId,
    pub recipient: UserId,
    pub kind: GameKind,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    pub token: GameToken,
}

fn from_row(row: &SqliteRow) -> sqlx::Result<Invitation> {
    let status: String = row.try_get("status")?;
    let kind: String = row.try_get("game_kind")?;
    Ok(Invitation {
        id: row.try_get("id")?,
        sender: UserId(row.try_get("sender_id")?),
        recipient: UserId(row.try_get("recipient_id")?),
        kind: GameKind::from(kind.as_str()),
        status: InviteStatus::parse(&status)
            .ok_or_else(|| decode_err("status", format!("unknown status {status:?}")))?,
        created_at: row.try_get("created_at")?,
        token: GameToken(row.try_get("game_token")?),
    })
}

const COLUMNS: &str = "id, sender_id, recipient_id, game_kind, status, created_at, game_token";

pub async fn create(
    tx: &mut SqliteTransaction,
    sender: UserId,
    recipient: UserId,
    kind: &GameKind,
    token: &GameToken,
) -> sqlx::Result<Invitation> {
    let created_at = Utc::now();
    let result = sqlx::query(
        "INSERT INTO game_invitations \
         (sender_id, recipient_id, game_kind, status, created_at, game_token) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(sender.0)
    .bind(recipient.0)
    .bind(kind.as_str())
    .bind(InviteStatus::Pending.as_str())
    .bind(created_at)
    .bind(&token.0)
    .execute(&mut **tx)
    .await?;
    Ok(Invitation {
        id: result.last_insert_rowid(),
        sender,
        recipient,
        kind: kind.clone(),
        status: InviteStatus::Pending,
        created_at,
        token: token.clone(),
    })
}

/// Point-in-time duplicate check over the unordered player pair.
pub async fn pending_between(
    tx: &mut SqliteTransaction,
    a: UserId,
    b: UserId,
    kind: &GameKind,
) -> sqlx::Result<Option<Invitation>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM game_invitations \
         WHERE ((sender_id = ?1 AND recipient_id = ?2) \
             OR (sender_id = ?2 AND recipient_id = ?1)) \
           AND game_kind = ?3 AND status = 'pending'",
    ))
    .bind(a.0)
    .bind(b.0)
    .bind(kind.as_str())
    .fetch_optional(&mut **tx)
    .await?;
    row.as_ref().map(from_row).transpose()
}

/// Looks up a pending invitation addressed to `recipient`. Also covers the
/// already-resolved case: whoever resolves first wins, later callers see
/// nothing.
pub async fn pending_by_token(
    tx: &mut SqliteTransaction,
    token: &GameToken,
    recipient: UserId,
) -> sqlx::Result<Option<Invitation>> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM game_invitations \
         WHERE game_token = ? AND recipient_id = ? AND status = 'pending'",
    ))
    .bind(&token.0)
    .bind(recipient.0)
    .fetch_optional(&mut **tx)
    .await?;
    row.as_ref().map(from_row).transpose()
}

pub async fn resolve(
    tx: &mut SqliteTransaction,
    id: i64,
    status: InviteStatus,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE game_invitations SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn inbox(
    tx: &mut SqliteTransaction,
    recipient: UserId,
) -> sqlx::Result<Vec<Invitation>> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM game_invitations \
         WHERE recipient_id = ? AND status = 'pending' \
         ORDER BY created_at DESC",
    ))
    .bind(recipient.0)
    .fetch_all(&mut **tx)
    .await?;
    rows.iter().map(from_row).collect()
}

pub async fn unread_count(tx: &mut SqliteTransaction, recipient: UserId) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM game_invitations \
         WHERE recipient_id = ? AND status = 'pending'",
    )
    .bind(recipient.0)
    .fetch_one(&mut **tx)
    .await
}
