//! Protocol model shared by the pong server and client.
//!
//! Holds the physical and timing constants both sides simulate with, the
//! closed set of wire packets, the bincode codec used on the UDP channel and
//! the state snapshots that the server synchronizes to clients.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub mod physics;
pub mod state;

pub use state::{
    BallSnapshot, EffectSnapshot, MatchSnapshot, PaddleSnapshot, PowerUpSnapshot, StateDelta,
};

pub const GAME_WIDTH: f32 = 1280.0;
pub const GAME_HEIGHT: f32 = 720.0;

pub const PADDLE_WIDTH: f32 = 20.0;
pub const PADDLE_HEIGHT: f32 = 100.0;
/// Distance from the field edge to the paddle center line.
pub const PADDLE_OFFSET: f32 = 50.0;
pub const PADDLE_SPEED: f32 = 500.0;

pub const BALL_SIZE: f32 = 20.0;
pub const BALL_RADIUS: f32 = BALL_SIZE / 2.0;
pub const BALL_SPEED: f32 = 400.0;
pub const MAX_BOUNCE_ANGLE: f32 = std::f32::consts::FRAC_PI_3;
pub const MAX_LAUNCH_ANGLE: f32 = std::f32::consts::FRAC_PI_4;
/// Speed gained on every paddle hit.
pub const RALLY_SPEEDUP: f32 = 1.05;
/// Rally speed cap, as a multiple of `BALL_SPEED`.
pub const MAX_SPEED_FACTOR: f32 = 2.0;

pub const WINNING_SCORE: u32 = 5;
pub const SERVE_DELAY_MS: u64 = 1000;

pub const SERVER_TICK_RATE: u32 = 60;
pub const KEYFRAME_INTERVAL_TICKS: u32 = 60;
pub const RECONCILE_THRESHOLD: f32 = 5.0;
pub const INTERPOLATION_FACTOR: f32 = 0.3;
pub const PING_INTERVAL_MS: u64 = 2000;
pub const CONNECT_TIMEOUT_MS: u64 = 3000;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PACKET_SIZE: usize = 2048;
pub const MAX_NAME_LEN: usize = 16;

pub const POWERUP_SIZE: f32 = 30.0;
pub const POWERUP_SPAWN_INTERVAL_MS: u64 = 10_000;
pub const POWERUP_SPAWN_CHANCE: f64 = 0.5;
pub const POWERUP_DURATION_MS: u64 = 5_000;
pub const POWERUP_LIFETIME_MS: u64 = 8_000;
pub const MAX_FIELD_POWERUPS: usize = 2;
pub const PADDLE_SIZE_MULTIPLIER: f32 = 1.5;
pub const PADDLE_SHRINK_MULTIPLIER: f32 = 0.6;
pub const BALL_SPEED_MULTIPLIER: f32 = 1.5;
pub const SLOW_BALL_MULTIPLIER: f32 = 0.6;

/// Movement intent of a paddle. Clients only ever send this, never positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    #[default]
    Stop,
}

impl Direction {
    /// Screen-space sign of the movement (+Y points down).
    pub fn sign(self) -> f32 {
        match self {
            Direction::Up => -1.0,
            Direction::Down => 1.0,
            Direction::Stop => 0.0,
        }
    }

    pub fn from_keys(up: bool, down: bool) -> Self {
        match (up, down) {
            (true, false) => Direction::Up,
            (false, true) => Direction::Down,
            _ => Direction::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerSide {
    Left,
    Right,
}

impl PlayerSide {
    pub fn opposite(self) -> Self {
        match self {
            PlayerSide::Left => PlayerSide::Right,
            PlayerSide::Right => PlayerSide::Left,
        }
    }

    pub fn player_number(self) -> u8 {
        match self {
            PlayerSide::Left => 1,
            PlayerSide::Right => 2,
        }
    }

    /// X coordinate of this side's paddle center line.
    pub fn paddle_x(self) -> f32 {
        match self {
            PlayerSide::Left => PADDLE_OFFSET,
            PlayerSide::Right => GAME_WIDTH - PADDLE_OFFSET,
        }
    }

    /// Horizontal sign of a ball travelling away from this side's paddle.
    pub fn outward_sign(self) -> f32 {
        match self {
            PlayerSide::Left => 1.0,
            PlayerSide::Right => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerUpKind {
    BigPaddle,
    ShrinkOpponent,
    SpeedUp,
    SlowDown,
}

impl PowerUpKind {
    pub const ALL: [PowerUpKind; 4] = [
        PowerUpKind::BigPaddle,
        PowerUpKind::ShrinkOpponent,
        PowerUpKind::SpeedUp,
        PowerUpKind::SlowDown,
    ];

    pub fn multiplier(self) -> f32 {
        match self {
            PowerUpKind::BigPaddle => PADDLE_SIZE_MULTIPLIER,
            PowerUpKind::ShrinkOpponent => PADDLE_SHRINK_MULTIPLIER,
            PowerUpKind::SpeedUp => BALL_SPEED_MULTIPLIER,
            PowerUpKind::SlowDown => SLOW_BALL_MULTIPLIER,
        }
    }

    /// True for effects on the ball, false for effects on a paddle.
    pub fn affects_ball(self) -> bool {
        matches!(self, PowerUpKind::SpeedUp | PowerUpKind::SlowDown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ranking {
    Wins,
    WinRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_name: String,
    pub wins: u32,
    pub losses: u32,
    pub total_games: u32,
    /// Rounded percentage, 0..=100.
    pub win_rate: u32,
    pub last_played: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client to server
    Connect {
        client_version: u32,
        player_name: String,
    },
    Input {
        direction: Direction,
    },
    Ping {
        client_time: u64,
    },
    LeaderboardRequest {
        ranking: Ranking,
        limit: u8,
    },
    Disconnect,

    // Server to client
    Connected {
        client_id: u32,
    },
    Status {
        message: String,
    },
    GameStart,
    GameEnd {
        reason: String,
    },
    Pong {
        client_time: u64,
        server_time: u64,
    },
    State {
        tick: u32,
        snapshot: MatchSnapshot,
    },
    StateDelta {
        tick: u32,
        delta: StateDelta,
    },
    Leaderboard {
        ranking: Ranking,
        entries: Vec<LeaderboardEntry>,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "connect",
            Packet::Input { .. } => "input",
            Packet::Ping { .. } => "ping",
            Packet::LeaderboardRequest { .. } => "leaderboard_request",
            Packet::Disconnect => "disconnect",
            Packet::Connected { .. } => "connected",
            Packet::Status { .. } => "status",
            Packet::GameStart => "game_start",
            Packet::GameEnd { .. } => "game_end",
            Packet::Pong { .. } => "pong",
            Packet::State { .. } => "state",
            Packet::StateDelta { .. } => "state_delta",
            Packet::Leaderboard { .. } => "leaderboard",
            Packet::Disconnected { .. } => "disconnected",
        }
    }

    /// Whether a client is allowed to send this packet kind.
    pub fn is_client_message(&self) -> bool {
        matches!(
            self,
            Packet::Connect { .. }
                | Packet::Input { .. }
                | Packet::Ping { .. }
                | Packet::LeaderboardRequest { .. }
                | Packet::Disconnect
        )
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] bincode::Error),
    #[error("packet of {0} bytes exceeds the {MAX_PACKET_SIZE} byte limit")]
    Oversize(usize),
    #[error("unexpected {0} packet")]
    Unexpected(&'static str),
}

fn wire_options() -> impl Options {
    // Same layout as bincode::serialize, plus a size limit for untrusted input.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_PACKET_SIZE as u64)
}

pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let data = bincode::serialize(packet)?;
    if data.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::Oversize(data.len()));
    }
    Ok(data)
}

pub fn decode_packet(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    if bytes.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::Oversize(bytes.len()));
    }
    Ok(wire_options().deserialize(bytes)?)
}

/// Cleans a player-supplied display name, falling back when nothing usable is left.
pub fn sanitize_player_name(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// Wall clock in milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::Up.sign(), -1.0);
        assert_eq!(Direction::Down.sign(), 1.0);
        assert_eq!(Direction::Stop.sign(), 0.0);
        assert_eq!(Direction::default(), Direction::Stop);
    }

    #[test]
    fn test_direction_from_keys() {
        assert_eq!(Direction::from_keys(true, false), Direction::Up);
        assert_eq!(Direction::from_keys(false, true), Direction::Down);
        assert_eq!(Direction::from_keys(true, true), Direction::Stop);
        assert_eq!(Direction::from_keys(false, false), Direction::Stop);
    }

    #[test]
    fn test_player_side_geometry() {
        assert_eq!(PlayerSide::Left.paddle_x(), PADDLE_OFFSET);
        assert_eq!(PlayerSide::Right.paddle_x(), GAME_WIDTH - PADDLE_OFFSET);
        assert_eq!(PlayerSide::Left.opposite(), PlayerSide::Right);
        assert_eq!(PlayerSide::Left.player_number(), 1);
        assert_eq!(PlayerSide::Right.player_number(), 2);
        assert_eq!(PlayerSide::Left.outward_sign(), 1.0);
        assert_eq!(PlayerSide::Right.outward_sign(), -1.0);
    }

    #[test]
    fn test_powerup_kinds() {
        assert!(PowerUpKind::SpeedUp.affects_ball());
        assert!(PowerUpKind::SlowDown.affects_ball());
        assert!(!PowerUpKind::BigPaddle.affects_ball());
        assert!(!PowerUpKind::ShrinkOpponent.affects_ball());
        assert!(PowerUpKind::BigPaddle.multiplier() > 1.0);
        assert!(PowerUpKind::ShrinkOpponent.multiplier() < 1.0);
    }

    #[test]
    fn test_packet_codec_input() {
        let packet = Packet::Input {
            direction: Direction::Down,
        };
        let bytes = encode_packet(&packet).unwrap();
        assert_eq!(decode_packet(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_packet_codec_compatible_with_plain_bincode() {
        let packet = Packet::Ping { client_time: 42 };
        let bytes = bincode::serialize(&packet).unwrap();
        match decode_packet(&bytes).unwrap() {
            Packet::Ping { client_time } => assert_eq!(client_time, 42),
            other => panic!("Wrong packet type after decoding: {:?}", other),
        }
    }

    #[test]
    fn test_packet_codec_full_state_fits() {
        let mut snapshot = MatchSnapshot::default();
        for (id, side) in [(1, PlayerSide::Left), (2, PlayerSide::Right)] {
            snapshot.paddles.push(PaddleSnapshot {
                client_id: id,
                name: "W".repeat(MAX_NAME_LEN),
                side,
                y: GAME_HEIGHT / 2.0,
                connected: true,
                paddle_scale: 1.0,
            });
        }
        let packet = Packet::State { tick: 1, snapshot };
        let bytes = encode_packet(&packet).unwrap();
        assert!(bytes.len() < MAX_PACKET_SIZE);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_packet(&[]).is_err());
        assert!(decode_packet(&[0xFF, 0xFF, 0xFF, 0xFF]).is_err());

        let valid = encode_packet(&Packet::Connect {
            client_version: 1,
            player_name: "alice".to_string(),
        })
        .unwrap();
        assert!(decode_packet(&valid[..valid.len() / 2]).is_err());
    }

    #[test]
    fn test_decode_rejects_oversize() {
        let bytes = vec![0u8; MAX_PACKET_SIZE + 1];
        assert!(matches!(
            decode_packet(&bytes),
            Err(ProtocolError::Oversize(_))
        ));
    }

    #[test]
    fn test_client_message_classification() {
        assert!(Packet::Disconnect.is_client_message());
        assert!(Packet::Ping { client_time: 1 }.is_client_message());
        assert!(!Packet::GameStart.is_client_message());
        assert!(!Packet::Pong {
            client_time: 1,
            server_time: 2
        }
        .is_client_message());
        assert_eq!(Packet::GameStart.kind(), "game_start");
    }

    #[test]
    fn test_sanitize_player_name() {
        assert_eq!(sanitize_player_name("  alice ", "Player 1"), "alice");
        assert_eq!(sanitize_player_name("", "Player 1"), "Player 1");
        assert_eq!(sanitize_player_name("\n\t", "Player 2"), "Player 2");
        assert_eq!(sanitize_player_name("bob\u{7}", "x"), "bob");
        let long = "a".repeat(40);
        assert_eq!(sanitize_player_name(&long, "x").len(), MAX_NAME_LEN);
    }

    #[test]
    fn test_now_millis_advances() {
        let t1 = now_millis();
        std::thread::sleep(Duration::from_millis(2));
        let t2 = now_millis();
        assert!(t2 > t1);
    }
}
