//! # Pong Server Library
//!
//! This library provides the authoritative server for networked two-player
//! pong. It owns the canonical state of every match, applies the movement
//! intents clients send, and streams state updates back so that clients can
//! predict, reconcile and interpolate.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every match runs on the server at a fixed tick rate. Paddle motion, ball
//! flight, bounces, scoring and power-ups are decided here and nowhere else.
//! Clients only ever send a direction (`Up`, `Down` or `Stop`), never
//! positions.
//!
//! ### Matchmaking
//! Connecting clients are placed in the first room that is waiting for an
//! opponent, or a fresh room is opened for them. Two players per room; the
//! match starts as soon as the second one arrives.
//!
//! ### State Synchronization
//! After every tick a room compares the new snapshot with the last one it
//! sent and transmits only the sections that changed. Full keyframes go out
//! whenever membership changes and at a fixed tick interval, so a client that
//! lost packets converges again quickly.
//!
//! ## Architecture Design
//!
//! ### One Task Per Room
//! Each room is a tokio task that owns its `MatchState` and tick scheduler.
//! Commands (join, leave, input) arrive on a channel and are handled between
//! ticks, so match state is never shared and never locked.
//!
//! ### Drift-Compensated Ticks
//! Rooms do not use a plain interval timer. The scheduler measures how late
//! each tick fired and shortens the following delay to match, bounded so a
//! stalled process does not burst through a backlog of ticks.
//!
//! ### UDP-Based Communication
//! One bincode-encoded packet per datagram. Undecodable datagrams and packet
//! kinds that only the server may send are dropped at the boundary.
//!
//! ## Module Organization
//!
//! - `client_manager`: registry of connected clients, timeouts, addresses
//! - `game`: the match simulation (`MatchState`)
//! - `leaderboard`: in-memory win/loss records fed by finished matches
//! - `network`: UDP tasks, packet validation, matchmaking, the main loop
//! - `powerup`: power-up spawning, pickup and timed effects
//! - `room`: per-match task, delta sync and lifecycle
//! - `scheduler`: fixed-rate tick scheduling with drift compensation
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         addr: "127.0.0.1:8080".to_string(),
//!         ..Default::default()
//!     };
//!     let mut server = Server::new(config).await?;
//!
//!     // Runs until a shutdown message arrives:
//!     // - accepts connections and places players into rooms
//!     // - forwards inputs to the room that owns the player
//!     // - answers pings and leaderboard queries
//!     // - removes clients that go silent
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod leaderboard;
pub mod network;
pub mod powerup;
pub mod room;
pub mod scheduler;
