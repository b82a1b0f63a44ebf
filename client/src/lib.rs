//! # Pong Client Library
//!
//! This library provides the player-facing side of networked pong: a
//! macroquad window that renders the authoritative server state, hides
//! latency with prediction and smoothing, and can also run a complete
//! two-player match locally when no server is around.
//!
//! ## Core Concepts
//!
//! ### Client-Side Prediction
//! The local paddle moves the moment a key is pressed. The client applies
//! the same `move_paddle` kernel the server runs, so in the common case the
//! predicted position and the authoritative one agree.
//!
//! ### Server Reconciliation
//! Whenever a new server frame arrives the predicted paddle is compared with
//! the server's. Differences within a small deadband are ignored; larger
//! ones snap the paddle to the server position.
//!
//! ### Interpolation and Extrapolation
//! The opponent paddle eases toward its latest server position every frame.
//! The ball is first extrapolated along its server velocity for the time
//! since the last update, clamped to the field, and then eased the same way.
//! A resting server ball (serve, reset) is shown exactly where it is.
//!
//! ## Architecture Overview
//!
//! ### Frame Loop and Network Thread
//! The macroquad frame loop never blocks on the network. A dedicated thread
//! runs a tokio runtime with the UDP connection; it hands events to the
//! frame loop over a channel and receives commands (inputs, leaderboard
//! queries) the same way. Dropping the connection handle closes the command
//! channel, which makes the network task say goodbye to the server and exit.
//!
//! ### Delta Synchronization
//! The server sends full keyframes and, in between, deltas that carry only
//! the sections that changed. The network task rebuilds the full snapshot
//! before handing it to the game, dropping anything older than what it has
//! already applied.
//!
//! ### Online and Offline Modes
//! `ClientGame` renders server state online and drives a `LocalMatch`
//! offline. The local match only simulates while offline, so switching
//! modes can never leak local scoring into a networked game.
//!
//! ## Module Organization
//!
//! - `game`: prediction, reconciliation and interpolation, mode switching
//! - `input`: keyboard sampling with change detection and toggles
//! - `network`: UDP connection, handshake, pings, keyframe/delta sync
//! - `offline`: the local two-player match
//! - `rendering`: macroquad drawing of fields, paddles, ball and HUD
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::{ClientGame, Controls, Mode};
//! use client::network::{ClientConfig, Connection};
//!
//! let mut game = ClientGame::new(Mode::Online);
//! let mut connection = Connection::spawn(ClientConfig::default());
//!
//! // Once per rendered frame:
//! for event in connection.drain_events() {
//!     game.handle_network_event(event);
//! }
//! game.update(1.0 / 60.0, &Controls::default());
//! let _to_draw = game.display_snapshot();
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod offline;
pub mod rendering;
