use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parlor_types::{GameEvent, GameToken, MoveData, Position, UserId};
use tokio::sync::mpsc;

use crate::engine::TurnEngine;
use crate::error::GameError;

const USER_TIMEOUT: Duration = Duration::from_millis(200);
const CHANNEL_DEPTH: usize = 16;

/// Per-session fan-out. Each active session gets one room actor; subscribers
/// push moves in and receive the resulting events back out.
#[derive(Clone)]
pub struct Relay {
    engine: Arc<TurnEngine>,
    rooms: Arc<DashMap<GameToken, mpsc::Sender<RoomMsg>>>,
}

#[derive(Debug)]
struct RoomMsg {
    user: UserId,
    cmd: RoomCmd,
}

#[derive(Debug)]
enum RoomCmd {
    Join(mpsc::Sender<GameEvent>),
    Leave,
    Move { data: MoveData, proposed: Position },
    StateRequest,
}

impl Relay {
    pub fn new(engine: Arc<TurnEngine>) -> Self {
        Self {
            engine,
            rooms: Default::default(),
        }
    }

    /// Joins the session's room, spawning it on first join. Only the two
    /// participants of the session may join.
    pub async fn join(&self, token: &GameToken, user: UserId) -> Result<Subscription, GameError> {
        let session = self.engine.state(token).await?;
        if session.role_of(user).is_none() {
            return Err(GameError::NotParticipant);
        }
        loop {
            let room = match self.rooms.entry(token.clone()) {
                Entry::Occupied(occ) => occ.get().clone(),
                Entry::Vacant(vac) => {
                    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
                    vac.insert(tx.clone());
                    tokio::spawn(
                        Room {
                            token: token.clone(),
                            tx: tx.clone(),
                            rx,
                            engine: self.engine.clone(),
                            rooms: self.rooms.clone(),
                            members: Vec::new(),
                        }
                        .run(),
                    );
                    tx
                }
            };
            let (events_tx, events_rx) = mpsc::channel(CHANNEL_DEPTH);
            let join = RoomMsg {
                user,
                cmd: RoomCmd::Join(events_tx),
            };
            if room.send(join).await.is_ok() {
                return Ok(Subscription {
                    user,
                    room,
                    events: events_rx,
                });
            }
            // Raced with the room shutting down; clear the stale handle.
            self.rooms.remove_if(token, |_, s| s.same_channel(&room));
        }
    }
}

/// One client's membership in a room. Dropping it leaves the room.
pub struct Subscription {
    user: UserId,
    room: mpsc::Sender<RoomMsg>,
    events: mpsc::Receiver<GameEvent>,
}

impl Subscription {
    pub async fn propose_move(&self, data: MoveData, proposed: Position) {
        let _ = self
            .room
            .send(RoomMsg {
                user: self.user,
                cmd: RoomCmd::Move { data, proposed },
            })
            .await;
    }

    pub async fn request_state(&self) {
        let _ = self
            .room
            .send(RoomMsg {
                user: self.user,
                cmd: RoomCmd::StateRequest,
            })
            .await;
    }

    pub async fn recv(&mut self) -> Option<GameEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.room.try_send(RoomMsg {
            user: self.user,
            cmd: RoomCmd::Leave,
        });
    }
}

struct Member {
    user: UserId,
    tx: mpsc::Sender<GameEvent>,
}

struct Room {
    token: GameToken,
    tx: mpsc::Sender<RoomMsg>,
    rx: mpsc::Receiver<RoomMsg>,
    engine: Arc<TurnEngine>,
    rooms: Arc<DashMap<GameToken, mpsc::Sender<RoomMsg>>>,
    members: Vec<Member>,
}

impl Room {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg.cmd {
                RoomCmd::Join(tx) => self.members.push(Member { user: msg.user, tx }),
                RoomCmd::Leave => {
                    // One subscription per message; the same user may hold
                    // several.
                    if let Some(i) = self.members.iter().position(|m| m.user == msg.user) {
                        self.members.swap_remove(i);
                    }
                }
                RoomCmd::Move { data, proposed } => {
                    self.handle_move(msg.user, data, proposed).await;
                }
                RoomCmd::StateRequest => self.handle_state_request(msg.user).await,
            }
            if self.members.is_empty() {
                break;
            }
        }
        tracing::debug!(token = %self.token, "room closed");
    }

    async fn handle_move(&mut self, user: UserId, data: MoveData, proposed: Position) {
        match self.engine.apply_move(&self.token, user, data, proposed).await {
            Ok(session) => {
                self.broadcast(GameEvent::GameStateUpdate(session)).await;
            }
            Err(e) => {
                if let GameError::Storage(ref inner) = e {
                    tracing::error!(token = %self.token, "move failed: {inner}");
                }
                // Rejections go back to the offender only.
                self.unicast(
                    user,
                    GameEvent::GameError {
                        message: e.user_message(),
                    },
                )
                .await;
            }
        }
    }

    async fn handle_state_request(&mut self, user: UserId) {
        let event = match self.engine.state(&self.token).await {
            Ok(session) => GameEvent::GameStateUpdate(session),
            Err(e) => GameEvent::GameError {
                message: e.user_message(),
            },
        };
        self.unicast(user, event).await;
    }

    async fn broadcast(&mut self, event: GameEvent) {
        let mut dead = Vec::new();
        for (i, member) in self.members.iter().enumerate() {
            if member.tx.send_timeout(event.clone(), USER_TIMEOUT).await.is_err() {
                dead.push(i);
            }
        }
        for i in dead.into_iter().rev() {
            self.members.swap_remove(i);
        }
    }

    async fn unicast(&mut self, user: UserId, event: GameEvent) {
        let mut dead = Vec::new();
        for (i, member) in self.members.iter().enumerate() {
            if member.user != user {
                continue;
            }
            if member.tx.send_timeout(event.clone(), USER_TIMEOUT).await.is_err() {
                dead.push(i);
            }
        }
        for i in dead.into_iter().rev() {
            self.members.swap_remove(i);
        }
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        self.rooms
            .remove_if(&self.token, |_, s| s.same_channel(&self.tx));
    }
}
