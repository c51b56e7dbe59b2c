use parlor_types::{GameKind, GameSession, GameToken, UserId};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::database::invitation::{self, Invitation, InviteStatus};
use crate::database::Database;
use crate::error::GameError;
use crate::setup;

/// Invitation lifecycle: create, accept (spawning the game session for kinds
/// that have one), decline, and inbox queries. Every operation runs in its
/// own transaction.
#[derive(Clone)]
pub struct InvitationManager {
    db: Database,
}

impl InvitationManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        sender: UserId,
        recipient: UserId,
        kind: GameKind,
    ) -> Result<Invitation, GameError> {
        if sender == recipient {
            return Err(GameError::SelfInvite);
        }
        let mut tx = self.db.begin().await?;
        if invitation::pending_between(&mut tx, sender, recipient, &kind)
            .await?
            .is_some()
        {
            return Err(GameError::DuplicatePending);
        }
        let token = GameToken::mint();
        // The partial unique index catches the race two concurrent creates
        // can win past the check above.
        let invite = invitation::create(&mut tx, sender, recipient, &kind, &token)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    GameError::DuplicatePending
                } else {
                    GameError::Storage(e)
                }
            })?;
        tx.commit().await.map_err(|e| {
            if is_unique_violation(&e) {
                GameError::DuplicatePending
            } else {
                GameError::Storage(e)
            }
        })?;
        tracing::info!(%sender, %recipient, kind = %invite.kind, token = %invite.token, "invitation created");
        Ok(invite)
    }

    /// Accepting flips the invitation to accepted and, for session-bearing
    /// kinds, creates the game under the invitation's token with sides
    /// assigned at random. Only the addressed recipient may accept, and only
    /// while the invitation is still pending.
    pub async fn accept(
        &self,
        token: &GameToken,
        recipient: UserId,
    ) -> Result<(Invitation, Option<GameSession>), GameError> {
        let mut rng = StdRng::from_entropy();
        let mut tx = self.db.begin().await?;
        let invite = invitation::pending_by_token(&mut tx, token, recipient)
            .await?
            .ok_or(GameError::InvitationNotFound)?;
        invitation::resolve(&mut tx, invite.id, InviteStatus::Accepted).await?;
        let session = if invite.kind.has_session() {
            Some(
                setup::initialize_session(
                    &mut tx,
                    token,
                    &invite.kind,
                    invite.sender,
                    invite.recipient,
                    &mut rng,
                )
                .await?,
            )
        } else {
            None
        };
        tx.commit().await?;
        tracing::info!(%recipient, token = %token, session = session.is_some(), "invitation accepted");
        Ok((invite, session))
    }

    pub async fn decline(&self, token: &GameToken, recipient: UserId) -> Result<(), GameError> {
        let mut tx = self.db.begin().await?;
        let invite = invitation::pending_by_token(&mut tx, token, recipient)
            .await?
            .ok_or(GameError::InvitationNotFound)?;
        invitation::resolve(&mut tx, invite.id, InviteStatus::Declined).await?;
        tx.commit().await?;
        tracing::info!(%recipient, token = %token, "invitation declined");
        Ok(())
    }

    /// Pending invitations addressed to `recipient`, newest first.
    pub async fn inbox(&self, recipient: UserId) -> Result<Vec<Invitation>, GameError> {
        let mut tx = self.db.begin().await?;
        Ok(invitation::inbox(&mut tx, recipient).await?)
    }

    pub async fn unread_count(&self, recipient: UserId) -> Result<i64, GameError> {
        let mut tx = self.db.begin().await?;
        Ok(invitation::unread_count(&mut tx, recipient).await?)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map_or(false, |d| d.is_unique_violation())
}
