//! Server network layer handling UDP communications and matchmaking

use crate::client_manager::{ClientManager, DEFAULT_CLIENT_TIMEOUT};
use crate::game::MatchResult;
use crate::leaderboard::Leaderboard;
use crate::room::{spawn_room, RoomCommand, RoomConfig, RoomHandle};
use log::{debug, error, info, warn};
use shared::{
    decode_packet, encode_packet, now_millis, sanitize_player_name, Direction, Packet,
    ProtocolError, Ranking, MAX_PACKET_SIZE, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

pub const VERSION_MISMATCH_REASON: &str = "Protocol version mismatch";
pub const SERVER_FULL_REASON: &str = "Server full";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            max_clients: 32,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
            room: RoomConfig::default(),
        }
    }
}

/// Messages sent to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
        room_id: Option<u32>,
    },
    RoomClosed {
        room_id: u32,
        members: Vec<u32>,
        result: Option<MatchResult>,
    },
    Shutdown,
}

/// Messages for the outbound sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    SendToClients {
        client_ids: Vec<u32>,
        packet: Packet,
    },
}

/// A packet a client is allowed to send, after boundary validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    Join {
        client_version: u32,
        player_name: String,
    },
    Input(Direction),
    Ping(u64),
    Leaderboard { ranking: Ranking, limit: u8 },
    Leave,
}

impl TryFrom<Packet> for ClientRequest {
    type Error = ProtocolError;

    fn try_from(packet: Packet) -> Result<Self, Self::Error> {
        match packet {
            Packet::Connect {
                client_version,
                player_name,
            } => Ok(ClientRequest::Join {
                client_version,
                player_name,
            }),
            Packet::Input { direction } => Ok(ClientRequest::Input(direction)),
            Packet::Ping { client_time } => Ok(ClientRequest::Ping(client_time)),
            Packet::LeaderboardRequest { ranking, limit } => {
                Ok(ClientRequest::Leaderboard { ranking, limit })
            }
            Packet::Disconnect => Ok(ClientRequest::Leave),
            other => Err(ProtocolError::Unexpected(other.kind())),
        }
    }
}

/// Main server: client registry, matchmaking and the room map
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    rooms: HashMap<u32, RoomHandle>,
    next_room_id: u32,
    room_config: RoomConfig,
    leaderboard: Leaderboard,
    tasks: Vec<JoinHandle<()>>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(&config.addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::with_timeout(
                config.max_clients,
                config.client_timeout,
            ))),
            rooms: HashMap::new(),
            next_room_id: 1,
            room_config: config.room,
            leaderboard: Leaderboard::new(),
            tasks: Vec::new(),
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender that can stop a running server with `ServerMessage::Shutdown`.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&mut self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode_packet(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }));
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        self.tasks.push(tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToClients { client_ids, packet } => {
                        let data = match encode_packet(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode {} packet: {}", packet.kind(), e);
                                continue;
                            }
                        };
                        let addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.addrs_for(&client_ids)
                        };

                        for (client_id, addr) in addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        }));
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&mut self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client in timed_out {
                    let message = ServerMessage::ClientTimeout {
                        client_id: client.id,
                        room_id: client.room_id,
                    };
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        }));
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = encode_packet(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Validates an incoming packet and dispatches it
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let request = match ClientRequest::try_from(packet) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping packet from {}: {}", addr, e);
                return;
            }
        };

        if let ClientRequest::Join {
            client_version,
            player_name,
        } = request
        {
            self.handle_join(client_version, &player_name, addr).await;
            return;
        }

        let client = {
            let mut clients = self.clients.write().await;
            clients.find_client_by_addr(addr).and_then(|id| {
                clients.touch(id);
                clients.get(id).map(|c| (c.id, c.room_id))
            })
        };
        let Some((client_id, room_id)) = client else {
            debug!("Dropping {:?} from unknown address {}", request, addr);
            return;
        };

        match request {
            ClientRequest::Input(direction) => match room_id.and_then(|id| self.rooms.get(&id)) {
                Some(room) => {
                    room.send(RoomCommand::Input {
                        client_id,
                        direction,
                    });
                }
                None => debug!("Client {} sent input outside a room", client_id),
            },

            ClientRequest::Ping(client_time) => {
                let pong = Packet::Pong {
                    client_time,
                    server_time: now_millis(),
                };
                self.send_packet(pong, addr);
            }

            ClientRequest::Leaderboard { ranking, limit } => {
                let entries = self.leaderboard.top(ranking, limit as usize);
                self.send_packet(Packet::Leaderboard { ranking, entries }, addr);
            }

            ClientRequest::Leave => {
                let removed = {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id)
                };
                if let Some(room_id) = removed.and_then(|c| c.room_id) {
                    self.leave_room(client_id, room_id);
                }
            }

            ClientRequest::Join { .. } => {}
        }
    }

    async fn handle_join(&mut self, client_version: u32, raw_name: &str, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            warn!(
                "Rejecting {}: protocol version {} != {}",
                addr, client_version, PROTOCOL_VERSION
            );
            let reason = VERSION_MISMATCH_REASON.to_string();
            self.send_packet(Packet::Disconnected { reason }, addr);
            return;
        }

        let existing = {
            let mut clients = self.clients.write().await;
            clients.find_client_by_addr(addr).and_then(|id| {
                clients.touch(id);
                clients.get(id).map(|c| (c.id, c.room_id))
            })
        };

        let client_id = match existing {
            // A known client asking again wants a new match.
            Some((client_id, room_id)) => {
                if let Some(room_id) = room_id {
                    info!("Client {} re-queued from room {}", client_id, room_id);
                    self.leave_room(client_id, room_id);
                    self.clients.write().await.set_room(client_id, None);
                }
                client_id
            }
            None => {
                let name = sanitize_player_name(raw_name, "");
                let added = self.clients.write().await.add_client(addr, name);
                match added {
                    Some(client_id) => client_id,
                    None => {
                        let reason = SERVER_FULL_REASON.to_string();
                        self.send_packet(Packet::Disconnected { reason }, addr);
                        return;
                    }
                }
            }
        };

        self.send_packet(Packet::Connected { client_id }, addr);

        let name = {
            let clients = self.clients.read().await;
            clients.get(client_id).map(|c| c.name.clone())
        };
        if let Some(name) = name {
            self.place_in_room(client_id, name).await;
        }
    }

    /// Puts a client into the first room waiting for an opponent, or a new one.
    async fn place_in_room(&mut self, client_id: u32, name: String) {
        let waiting = self.rooms.values().find(|r| r.is_waiting()).map(|r| r.id);
        let room_id = match waiting {
            Some(room_id) => room_id,
            None => {
                let room_id = self.next_room_id;
                self.next_room_id += 1;
                let handle = spawn_room(
                    room_id,
                    &self.room_config,
                    self.game_tx.clone(),
                    self.server_tx.clone(),
                );
                info!("Created room {}", room_id);
                self.rooms.insert(room_id, handle);
                room_id
            }
        };

        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        if !room.send(RoomCommand::Join { client_id, name }) {
            warn!("Room {} is gone, dropping it", room_id);
            self.rooms.remove(&room_id);
            return;
        }

        room.members.push(client_id);
        if room.members.len() >= 2 {
            room.started = true;
        }
        self.clients.write().await.set_room(client_id, Some(room_id));
    }

    fn leave_room(&mut self, client_id: u32, room_id: u32) {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        room.send(RoomCommand::Leave { client_id });
        room.members.retain(|id| *id != client_id);

        // An empty room must not be offered to the next player.
        if room.members.is_empty() {
            self.rooms.remove(&room_id);
        }
    }

    async fn handle_room_closed(
        &mut self,
        room_id: u32,
        members: Vec<u32>,
        result: Option<MatchResult>,
    ) {
        self.rooms.remove(&room_id);
        if let Some(result) = result {
            self.leaderboard.record(&result);
        }

        let mut clients = self.clients.write().await;
        for client_id in members {
            if clients.get(client_id).and_then(|c| c.room_id) == Some(room_id) {
                clients.set_room(client_id, None);
            }
        }
        debug!("Room {} removed, {} rooms left", room_id, self.rooms.len());
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                ServerMessage::ClientTimeout { client_id, room_id } => {
                    info!("Client {} timed out", client_id);
                    if let Some(room_id) = room_id {
                        self.leave_room(client_id, room_id);
                    }
                }
                ServerMessage::RoomClosed {
                    room_id,
                    members,
                    result,
                } => {
                    self.handle_room_closed(room_id, members, result).await;
                }
                ServerMessage::Shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.rooms.clear();
        Ok(())
    }
}
