use log::{debug, error, info, warn};
use shared::{
    decode_packet, encode_packet, now_millis, Direction, LeaderboardEntry, MatchSnapshot, Packet,
    ProtocolError, Ranking, StateDelta, CONNECT_TIMEOUT_MS, MAX_PACKET_SIZE, PING_INTERVAL_MS,
    PROTOCOL_VERSION,
};
use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid server address: {0}")]
    AddrParse(#[from] AddrParseError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("no answer from server after {0:?}")]
    ConnectTimeout(Duration),
    #[error("server refused connection: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub player_name: String,
    /// Extra delay added to every send and every receive, in milliseconds.
    pub fake_ping_ms: u64,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            player_name: String::new(),
            fake_ping_ms: 0,
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
        }
    }
}

/// Things the frame loop needs to hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Connected { client_id: u32 },
    Status(String),
    GameStart,
    GameEnd { reason: String },
    Frame { tick: u32, snapshot: MatchSnapshot },
    /// One-way latency estimate, half the ping round trip.
    Latency(u64),
    Leaderboard {
        ranking: Ranking,
        entries: Vec<LeaderboardEntry>,
    },
    Disconnected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientCommand {
    Input(Direction),
    RequestLeaderboard { ranking: Ranking, limit: u8 },
}

/// Rebuilds the server's match snapshot from keyframes and deltas.
///
/// Deltas are ignored until a keyframe has arrived, and anything older than
/// the last applied tick is dropped.
#[derive(Debug, Default)]
pub struct SyncState {
    snapshot: Option<MatchSnapshot>,
    last_tick: Option<u32>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything, ready for a new room whose ticks restart at zero.
    pub fn reset(&mut self) {
        self.snapshot = None;
        self.last_tick = None;
    }

    pub fn snapshot(&self) -> Option<&MatchSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }

    fn is_stale(&self, tick: u32) -> bool {
        self.last_tick.map_or(false, |last| tick < last)
    }

    pub fn apply_keyframe(&mut self, tick: u32, snapshot: MatchSnapshot) -> Option<&MatchSnapshot> {
        if self.is_stale(tick) {
            debug!("Dropping stale keyframe {}", tick);
            return None;
        }
        self.last_tick = Some(tick);
        self.snapshot = Some(snapshot);
        self.snapshot.as_ref()
    }

    pub fn apply_delta(&mut self, tick: u32, delta: &StateDelta) -> Option<&MatchSnapshot> {
        if self.is_stale(tick) {
            debug!("Dropping stale delta {}", tick);
            return None;
        }
        let snapshot = self.snapshot.as_mut()?;
        snapshot.apply(delta);
        self.last_tick = Some(tick);
        Some(snapshot)
    }
}

/// UDP connection to the game server.
pub struct NetworkClient {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: u32,
    fake_ping_ms: u64,
    sync: SyncState,
    events: mpsc::UnboundedSender<NetworkEvent>,
}

impl NetworkClient {
    /// Sends `Connect` and waits for the server to accept it.
    pub async fn connect(
        config: &ClientConfig,
        events: mpsc::UnboundedSender<NetworkEvent>,
    ) -> Result<Self, ClientError> {
        let server_addr: SocketAddr = config.server_addr.parse()?;
        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        let mut client = NetworkClient {
            socket,
            server_addr,
            client_id: 0,
            fake_ping_ms: config.fake_ping_ms,
            sync: SyncState::new(),
            events,
        };

        info!("Connecting to {}...", server_addr);
        client
            .send_packet(&Packet::Connect {
                client_version: PROTOCOL_VERSION,
                player_name: config.player_name.clone(),
            })
            .await?;

        let client_id = timeout(config.connect_timeout, client.await_connected())
            .await
            .map_err(|_| ClientError::ConnectTimeout(config.connect_timeout))??;
        client.client_id = client_id;
        info!("Connected! Client ID: {}", client_id);
        client.emit(NetworkEvent::Connected { client_id });
        Ok(client)
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    async fn await_connected(&self) -> Result<u32, ClientError> {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        loop {
            let packet = self.recv_packet(&mut buffer).await?;
            self.fake_delay().await;
            match packet {
                Some(Packet::Connected { client_id }) => return Ok(client_id),
                Some(Packet::Disconnected { reason }) => return Err(ClientError::Rejected(reason)),
                Some(other) => debug!("Ignoring {} before handshake", other.kind()),
                None => {}
            }
        }
    }

    /// Half of the simulated round trip, applied on each direction.
    async fn fake_delay(&self) {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        self.fake_delay().await;
        let data = encode_packet(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Receives one datagram from the server. Undecodable datagrams and
    /// datagrams from other peers yield `None`.
    async fn recv_packet(&self, buffer: &mut [u8]) -> Result<Option<Packet>, ClientError> {
        let (len, from) = self.socket.recv_from(buffer).await?;
        if from != self.server_addr {
            debug!("Ignoring datagram from {}", from);
            return Ok(None);
        }
        match decode_packet(&buffer[..len]) {
            Ok(packet) => Ok(Some(packet)),
            Err(e) => {
                warn!("Dropping packet from server: {}", e);
                Ok(None)
            }
        }
    }

    fn emit(&self, event: NetworkEvent) {
        // The frame loop is gone when this fails; run() notices via commands.
        let _ = self.events.send(event);
    }

    /// Handles one server packet. Returns false once the server has dropped us.
    fn handle_packet(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::Connected { client_id } => {
                self.client_id = client_id;
                self.sync.reset();
                self.emit(NetworkEvent::Connected { client_id });
            }
            Packet::Status { message } => {
                info!("Server: {}", message);
                self.emit(NetworkEvent::Status(message));
            }
            Packet::GameStart => {
                info!("Match started");
                self.sync.reset();
                self.emit(NetworkEvent::GameStart);
            }
            Packet::GameEnd { reason } => {
                info!("Match ended: {}", reason);
                self.emit(NetworkEvent::GameEnd { reason });
            }
            Packet::Pong { client_time, .. } => {
                let rtt = now_millis().saturating_sub(client_time);
                self.emit(NetworkEvent::Latency(rtt / 2));
            }
            Packet::State { tick, snapshot } => {
                if let Some(snapshot) = self.sync.apply_keyframe(tick, snapshot) {
                    let snapshot = snapshot.clone();
                    self.emit(NetworkEvent::Frame { tick, snapshot });
                }
            }
            Packet::StateDelta { tick, delta } => {
                if let Some(snapshot) = self.sync.apply_delta(tick, &delta) {
                    let snapshot = snapshot.clone();
                    self.emit(NetworkEvent::Frame { tick, snapshot });
                }
            }
            Packet::Leaderboard { ranking, entries } => {
                self.emit(NetworkEvent::Leaderboard { ranking, entries });
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.emit(NetworkEvent::Disconnected { reason });
                return false;
            }
            other => warn!("Unexpected {} packet from server", other.kind()),
        }
        true
    }

    async fn handle_command(&self, command: ClientCommand) -> Result<(), ClientError> {
        let packet = match command {
            ClientCommand::Input(direction) => Packet::Input { direction },
            ClientCommand::RequestLeaderboard { ranking, limit } => {
                Packet::LeaderboardRequest { ranking, limit }
            }
        };
        self.send_packet(&packet).await
    }

    /// Pumps packets, commands and pings until the command channel closes
    /// or the server disconnects us. Closing the channel sends `Disconnect`.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Result<(), ClientError> {
        let mut ping_interval = interval(Duration::from_millis(PING_INTERVAL_MS));
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.recv_packet(&mut buffer) => {
                    match result {
                        Ok(Some(packet)) => {
                            self.fake_delay().await;
                            if !self.handle_packet(packet) {
                                return Ok(());
                            }
                        }
                        Ok(None) => {}
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if let Err(e) = self.handle_command(command).await {
                                error!("Error sending command: {}", e);
                            }
                        }
                        None => {
                            info!("Closing connection");
                            self.send_packet(&Packet::Disconnect).await?;
                            return Ok(());
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    let ping = Packet::Ping { client_time: now_millis() };
                    if let Err(e) = self.send_packet(&ping).await {
                        error!("Error sending ping: {}", e);
                    }
                }
            }
        }
    }
}

/// Handle the frame loop keeps for a connection running on its own thread.
///
/// Dropping it closes the command channel, which makes the network task
/// send `Disconnect` and exit.
pub struct Connection {
    commands: mpsc::UnboundedSender<ClientCommand>,
    events: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Connection {
    pub fn spawn(config: ClientConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start network runtime: {}", e);
                    let _ = event_tx.send(NetworkEvent::Disconnected {
                        reason: e.to_string(),
                    });
                    return;
                }
            };

            runtime.block_on(async move {
                let result = match NetworkClient::connect(&config, event_tx.clone()).await {
                    Ok(client) => client.run(command_rx).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    error!("Connection failed: {}", e);
                    let _ = event_tx.send(NetworkEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
            });
        });

        Self {
            commands: command_tx,
            events: event_rx,
        }
    }

    /// Queues a command; false when the network task has already exited.
    pub fn send(&self, command: ClientCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Events received since the last call, without blocking.
    pub fn drain_events(&mut self) -> Vec<NetworkEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{BallSnapshot, Phase};

    fn snapshot(score_left: u32) -> MatchSnapshot {
        MatchSnapshot {
            phase: Phase::Playing,
            score_left,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr, "127.0.0.1:8080");
        assert_eq!(config.connect_timeout, Duration::from_millis(3000));
        assert_eq!(config.fake_ping_ms, 0);
    }

    #[test]
    fn test_delta_ignored_before_keyframe() {
        let mut sync = SyncState::new();
        let delta = StateDelta {
            scores: Some((1, 0)),
            ..Default::default()
        };
        assert!(sync.apply_delta(3, &delta).is_none());
        assert!(sync.snapshot().is_none());
        assert!(sync.last_tick().is_none());
    }

    #[test]
    fn test_delta_applies_onto_keyframe() {
        let mut sync = SyncState::new();
        sync.apply_keyframe(10, snapshot(0));

        let ball = BallSnapshot {
            x: 100.0,
            y: 200.0,
            vx: 300.0,
            vy: 0.0,
        };
        let delta = StateDelta {
            ball: Some(ball),
            scores: Some((2, 1)),
            ..Default::default()
        };
        let applied = sync.apply_delta(11, &delta).unwrap();
        assert_eq!(applied.ball, ball);
        assert_eq!(applied.score_left, 2);
        assert_eq!(applied.score_right, 1);
        assert_eq!(sync.last_tick(), Some(11));
    }

    #[test]
    fn test_stale_packets_dropped() {
        let mut sync = SyncState::new();
        sync.apply_keyframe(20, snapshot(3));

        let delta = StateDelta {
            scores: Some((0, 0)),
            ..Default::default()
        };
        assert!(sync.apply_delta(19, &delta).is_none());
        assert!(sync.apply_keyframe(5, snapshot(0)).is_none());
        assert_eq!(sync.snapshot().unwrap().score_left, 3);

        // Same tick is still accepted.
        assert!(sync.apply_keyframe(20, snapshot(4)).is_some());
        assert_eq!(sync.snapshot().unwrap().score_left, 4);
    }

    #[test]
    fn test_reset_accepts_restarted_ticks() {
        let mut sync = SyncState::new();
        sync.apply_keyframe(500, snapshot(1));
        sync.reset();
        assert!(sync.apply_keyframe(0, snapshot(0)).is_some());
        assert_eq!(sync.last_tick(), Some(0));
    }

    #[tokio::test]
    async fn test_connect_times_out_without_server() {
        // Bound but never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            server_addr: silent.local_addr().unwrap().to_string(),
            connect_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = NetworkClient::connect(&config, tx).await;
        assert!(matches!(result, Err(ClientError::ConnectTimeout(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_address() {
        let config = ClientConfig {
            server_addr: "not an address".to_string(),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = NetworkClient::connect(&config, tx).await;
        assert!(matches!(result, Err(ClientError::AddrParse(_))));
    }

    #[tokio::test]
    async fn test_handshake_and_disconnect_on_close() {
        let fake_server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            server_addr: fake_server.local_addr().unwrap().to_string(),
            player_name: "tester".to_string(),
            ..Default::default()
        };
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let server_side = async {
            let mut buffer = [0u8; MAX_PACKET_SIZE];
            let (len, addr) = fake_server.recv_from(&mut buffer).await.unwrap();
            let packet = decode_packet(&buffer[..len]).unwrap();
            assert_eq!(
                packet,
                Packet::Connect {
                    client_version: PROTOCOL_VERSION,
                    player_name: "tester".to_string(),
                }
            );
            let reply = encode_packet(&Packet::Connected { client_id: 42 }).unwrap();
            fake_server.send_to(&reply, addr).await.unwrap();
        };

        let (client, _) = tokio::join!(NetworkClient::connect(&config, event_tx), server_side);
        let client = tokio_test::assert_ok!(client);
        assert_eq!(client.client_id(), 42);
        assert_eq!(
            event_rx.recv().await,
            Some(NetworkEvent::Connected { client_id: 42 })
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(client.run(command_rx));
        command_tx
            .send(ClientCommand::Input(Direction::Up))
            .unwrap();
        drop(command_tx);

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let mut saw_disconnect = false;
        for _ in 0..5 {
            let received = timeout(
                Duration::from_secs(1),
                fake_server.recv_from(&mut buffer),
            )
            .await;
            let Ok(Ok((len, _))) = received else {
                break;
            };
            if decode_packet(&buffer[..len]).unwrap() == Packet::Disconnect {
                saw_disconnect = true;
                break;
            }
        }
        assert!(saw_disconnect);
        assert!(task.await.unwrap().is_ok());
    }
}
