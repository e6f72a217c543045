use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::{distributions::Alphanumeric, Rng};
use tokio::sync::{mpsc, Mutex, MutexGuard, RwLock};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::codec::{self, Packet};
use crate::config::Config;
use crate::error::{ProtocolError, RoomError};
use crate::messages::{ClientEvent, RoomCreated, ServerEvent};
use crate::room::{normalize_language, normalize_name, validate_room_id, JoinOutcome, Member, Room};

// Lock order: rooms by ascending id, then the rooms table, then sessions.
// Nothing waits on a room while holding the rooms table.
type Rooms = Arc<RwLock<HashMap<String, Arc<Mutex<Room>>>>>;
type Sessions = Arc<RwLock<HashMap<String, Session>>>;

struct Session {
    outbox: mpsc::UnboundedSender<String>,
    room_id: Option<String>,
}

/// Room coordinator shared by every connection.
#[derive(Clone)]
pub struct Server {
    rooms: Rooms,
    sessions: Sessions,
    config: Arc<Config>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Server {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocates a socket id and the queue of text frames destined for it.
    pub async fn register(&self) -> (String, mpsc::UnboundedReceiver<String>) {
        let socket_id = Uuid::new_v4().simple().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.write().await.insert(
            socket_id.clone(),
            Session {
                outbox: tx,
                room_id: None,
            },
        );
        (socket_id, rx)
    }

    pub async fn handle_connection(&self, ws: WebSocket) {
        let (socket_id, mut outbox) = self.register().await;
        let (mut ws_tx, mut ws_rx) = ws.split();
        info!("Socket {} connected", socket_id);

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbox.recv().await {
                if let Err(e) = ws_tx.send(Message::text(frame)).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        let open = codec::open_packet(
            &engine_sid(),
            self.config.ping_interval,
            self.config.ping_timeout,
            self.config.limits.max_code_len,
        );
        self.send_raw(&socket_id, open).await;

        let ping_interval = self.config.ping_interval;
        let deadline = ping_interval + self.config.ping_timeout;
        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);
        let mut last_pong = Instant::now();
        let mut connected = false;

        loop {
            tokio::select! {
                incoming = ws_rx.next() => {
                    let msg = match incoming {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            warn!("WebSocket error on {}: {}", socket_id, e);
                            break;
                        }
                        None => break,
                    };
                    if msg.is_close() {
                        break;
                    }
                    let Ok(text) = msg.to_str() else {
                        continue;
                    };

                    match codec::decode(text) {
                        Ok(Packet::Pong) => last_pong = Instant::now(),
                        Ok(Packet::Ping) => self.send_raw(&socket_id, codec::PONG.to_string()).await,
                        Ok(Packet::Close | Packet::Disconnect) => break,
                        Ok(Packet::Connect) => {
                            connected = true;
                            self.send_raw(&socket_id, codec::connect_ack(&socket_id)).await;
                        }
                        Ok(Packet::Event { ack, args }) => {
                            if !connected {
                                warn!("Event from {} before namespace connect", socket_id);
                                continue;
                            }
                            match ClientEvent::from_args(args) {
                                Ok(event) => self.handle_event(&socket_id, event).await,
                                Err(e) => warn!("Dropping event from {}: {}", socket_id, e),
                            }
                            if let Some(id) = ack {
                                self.send_raw(&socket_id, codec::encode_ack(id)).await;
                            }
                        }
                        Ok(Packet::Noop | Packet::Ack { .. }) => {}
                        Err(ProtocolError::UnsupportedNamespace(nsp)) => {
                            let reply = codec::connect_error(&nsp, &format!("Invalid namespace {nsp}"));
                            self.send_raw(&socket_id, reply).await;
                        }
                        Err(e) => warn!("Dropping frame from {}: {}", socket_id, e),
                    }
                }
                _ = heartbeat.tick() => {
                    if last_pong.elapsed() > deadline {
                        info!("Socket {} missed its heartbeat", socket_id);
                        break;
                    }
                    self.send_raw(&socket_id, codec::PING.to_string()).await;
                }
            }
        }

        self.handle_disconnect(&socket_id).await;
        let _ = writer.await;
    }

    /// Applies one client intent. Rejections are reported back to the caller only.
    pub async fn handle_event(&self, socket_id: &str, event: ClientEvent) {
        let name = event.name();
        debug!("{} from {}", name, socket_id);

        let failure: fn(String) -> ServerEvent = match &event {
            ClientEvent::CreateRoom { .. } => ServerEvent::CreateError,
            ClientEvent::JoinRoom { .. } => ServerEvent::JoinError,
            _ => ServerEvent::ActionError,
        };

        let result = match event {
            ClientEvent::CreateRoom {
                room_id,
                host_username,
                language,
            } => self.create_room(socket_id, room_id, &host_username, &language).await,
            ClientEvent::JoinRoom { room_id, name } => self.join_room(socket_id, room_id, &name).await,
            ClientEvent::LeaveRoom { room_id } => self.leave_room(socket_id, room_id).await,
            ClientEvent::SendMessage {
                room_id,
                username,
                message,
            } => self.send_message(socket_id, room_id, &username, message).await,
            ClientEvent::RunCode { code, room_id } => self.run_code(socket_id, room_id, code).await,
            ClientEvent::EditUser {
                acting,
                target,
                room_id,
            } => self.set_permission(socket_id, room_id, &acting, &target, true).await,
            ClientEvent::RemoveUser {
                acting,
                target,
                room_id,
            } => self.set_permission(socket_id, room_id, &acting, &target, false).await,
        };

        if let Err(err) = result {
            warn!("Rejected {} from {}: {}", name, socket_id, err);
            self.send_to(socket_id, &failure(err.to_string())).await;
        }
    }

    pub async fn handle_disconnect(&self, socket_id: &str) {
        self.detach(socket_id).await;
        self.sessions.write().await.remove(socket_id);
        info!("Socket {} disconnected", socket_id);
    }

    async fn create_room(
        &self,
        socket_id: &str,
        room_id: String,
        host: &str,
        language: &str,
    ) -> Result<(), RoomError> {
        let limits = &self.config.limits;
        validate_room_id(&room_id, limits)?;
        let host = normalize_name(host, limits)?;
        let language = normalize_language(language, limits)?;

        if self.rooms.read().await.contains_key(&room_id) {
            return Err(RoomError::AlreadyExists(room_id));
        }
        let previous = self.previous_room(socket_id, &room_id).await;
        let previous_guard = match &previous {
            Some((_, old_room)) => Some(old_room.lock().await),
            None => None,
        };

        let creator = Member {
            socket_id: socket_id.to_string(),
            username: host.clone(),
        };
        let room = Arc::new(Mutex::new(Room::new(
            room_id.clone(),
            creator,
            language.clone(),
            limits.clone(),
        )));
        // Not yet published, so locking it cannot block or deadlock.
        // Held until the creator has its events, so no joiner can overtake them.
        let guard = room.lock().await;
        {
            let mut rooms = self.rooms.write().await;
            if rooms.contains_key(&room_id) {
                return Err(RoomError::AlreadyExists(room_id));
            }
            rooms.insert(room_id.clone(), Arc::clone(&room));
        }
        if let (Some((old_id, old_room)), Some(old_guard)) = (&previous, previous_guard) {
            self.vacate(old_id, old_room, old_guard, socket_id).await;
        }
        self.set_session_room(socket_id, Some(room_id.clone())).await;
        info!("Room {} created by {} ({})", room_id, host, language);

        self.send_to(socket_id, &ServerEvent::RoomCreated(RoomCreated { room_id, language }))
            .await;
        self.send_to(socket_id, &ServerEvent::RoomInfo(guard.info())).await;
        self.broadcast(&guard, &ServerEvent::RoomUsers(guard.users()), None)
            .await;
        Ok(())
    }

    async fn join_room(&self, socket_id: &str, room_id: String, name: &str) -> Result<(), RoomError> {
        let name = normalize_name(name, &self.config.limits)?;
        let room = self
            .find_room(&room_id)
            .await
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;

        let member = Member {
            socket_id: socket_id.to_string(),
            username: name.clone(),
        };

        // Both rooms stay locked until the move is decided, so a refused
        // join leaves the caller where it was.
        let previous = self.previous_room(socket_id, &room_id).await;
        let (mut guard, previous_guard) = match &previous {
            None => (room.lock().await, None),
            Some((old_id, old_room)) if old_id.as_str() < room_id.as_str() => {
                let old_guard = old_room.lock().await;
                (room.lock().await, Some(old_guard))
            }
            Some((_, old_room)) => {
                let guard = room.lock().await;
                (guard, Some(old_room.lock().await))
            }
        };
        guard.check_join(&member)?;

        if let (Some((old_id, old_room)), Some(old_guard)) = (&previous, previous_guard) {
            self.vacate(old_id, old_room, old_guard, socket_id).await;
        }
        let outcome = guard.join(member)?;
        self.set_session_room(socket_id, Some(room_id.clone())).await;
        match outcome {
            JoinOutcome::Joined => info!("{} joined room {}", name, room_id),
            JoinOutcome::AlreadyMember => debug!("{} rejoined room {}", name, room_id),
        }

        self.send_to(socket_id, &ServerEvent::RoomInfo(guard.info())).await;
        self.send_to(socket_id, &ServerEvent::PreviousMessages(guard.history()))
            .await;
        self.send_to(socket_id, &ServerEvent::PreviousCode(guard.code().to_string()))
            .await;
        self.broadcast(&guard, &ServerEvent::RoomUsers(guard.users()), None)
            .await;
        self.broadcast(&guard, &ServerEvent::RoomInfo(guard.info()), Some(socket_id))
            .await;
        Ok(())
    }

    async fn leave_room(&self, socket_id: &str, room_id: String) -> Result<(), RoomError> {
        if self.current_room(socket_id).await.as_deref() != Some(room_id.as_str()) {
            return Err(RoomError::NotMember(room_id));
        }
        self.detach(socket_id).await;
        Ok(())
    }

    async fn send_message(
        &self,
        socket_id: &str,
        room_id: String,
        claimed_name: &str,
        text: String,
    ) -> Result<(), RoomError> {
        let room = self.member_room(socket_id, room_id).await?;
        let mut guard = room.lock().await;
        let message = guard.post_message(socket_id, text)?;
        if message.username != claimed_name {
            debug!(
                "{} posted as {:?}, using registered name",
                message.username, claimed_name
            );
        }
        self.broadcast(&guard, &ServerEvent::ReceiveMessage(message), None)
            .await;
        Ok(())
    }

    async fn run_code(&self, socket_id: &str, room_id: String, code: String) -> Result<(), RoomError> {
        let room = self.member_room(socket_id, room_id).await?;
        let mut guard = room.lock().await;
        guard.update_code(socket_id, code)?;
        self.broadcast(
            &guard,
            &ServerEvent::DisplayCode(guard.code().to_string()),
            Some(socket_id),
        )
        .await;
        Ok(())
    }

    async fn set_permission(
        &self,
        socket_id: &str,
        room_id: String,
        acting: &str,
        target: &str,
        grant: bool,
    ) -> Result<(), RoomError> {
        let room = self.member_room(socket_id, room_id).await?;
        let mut guard = room.lock().await;
        let changed = if grant {
            guard.grant_edit(socket_id, acting, target)?
        } else {
            guard.revoke_edit(socket_id, acting, target)?
        };
        if changed {
            let verb = if grant { "granted" } else { "revoked" };
            info!("Edit permission {} for {} in room {}", verb, target, guard.id());
        }
        self.broadcast(&guard, &ServerEvent::RoomInfo(guard.info()), None)
            .await;
        Ok(())
    }

    /// Removes the socket from whatever room it sits in, reclaiming the room
    /// when it was the last member.
    async fn detach(&self, socket_id: &str) {
        let room_id = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(socket_id).and_then(|s| s.room_id.take()) {
                Some(room_id) => room_id,
                None => return,
            }
        };
        let Some(room) = self.find_room(&room_id).await else {
            return;
        };

        let guard = room.lock().await;
        self.vacate(&room_id, &room, guard, socket_id).await;
    }

    /// Takes the socket's seat out of a locked room and tells the rest.
    async fn vacate(
        &self,
        room_id: &str,
        room: &Arc<Mutex<Room>>,
        mut guard: MutexGuard<'_, Room>,
        socket_id: &str,
    ) {
        let Some(member) = guard.leave(socket_id) else {
            return;
        };
        info!("{} left room {}", member.username, room_id);

        if guard.is_reclaimed() {
            drop(guard);
            self.reclaim(room_id, room).await;
        } else {
            self.broadcast(&guard, &ServerEvent::RoomUsers(guard.users()), None)
                .await;
            self.broadcast(&guard, &ServerEvent::RoomInfo(guard.info()), None)
                .await;
        }
    }

    async fn reclaim(&self, room_id: &str, room: &Arc<Mutex<Room>>) {
        let mut rooms = self.rooms.write().await;
        if rooms
            .get(room_id)
            .is_some_and(|current| Arc::ptr_eq(current, room))
        {
            rooms.remove(room_id);
            info!("Room {} reclaimed", room_id);
        }
    }

    async fn find_room(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// The room the socket currently sits in, when it differs from `target`.
    async fn previous_room(&self, socket_id: &str, target: &str) -> Option<(String, Arc<Mutex<Room>>)> {
        let current = self.current_room(socket_id).await.filter(|id| id != target)?;
        let room = self.find_room(&current).await?;
        Some((current, room))
    }

    async fn current_room(&self, socket_id: &str) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(socket_id)
            .and_then(|s| s.room_id.clone())
    }

    async fn member_room(&self, socket_id: &str, room_id: String) -> Result<Arc<Mutex<Room>>, RoomError> {
        if self.current_room(socket_id).await.as_deref() != Some(room_id.as_str()) {
            return Err(RoomError::NotMember(room_id));
        }
        self.find_room(&room_id)
            .await
            .ok_or(RoomError::NotFound(room_id))
    }

    async fn set_session_room(&self, socket_id: &str, room_id: Option<String>) {
        if let Some(session) = self.sessions.write().await.get_mut(socket_id) {
            session.room_id = room_id;
        }
    }

    async fn broadcast(&self, room: &Room, event: &ServerEvent, except: Option<&str>) {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {}: {}", event.name(), e);
                return;
            }
        };
        let sessions = self.sessions.read().await;
        for member in room.members() {
            if Some(member.socket_id.as_str()) == except {
                continue;
            }
            if let Some(session) = sessions.get(&member.socket_id) {
                let _ = session.outbox.send(frame.clone());
            }
        }
    }

    async fn send_to(&self, socket_id: &str, event: &ServerEvent) {
        match event.to_frame() {
            Ok(frame) => self.send_raw(socket_id, frame).await,
            Err(e) => error!("Failed to encode {}: {}", event.name(), e),
        }
    }

    async fn send_raw(&self, socket_id: &str, frame: String) {
        if let Some(session) = self.sessions.read().await.get(socket_id) {
            let _ = session.outbox.send(frame);
        }
    }
}

fn engine_sid() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}
