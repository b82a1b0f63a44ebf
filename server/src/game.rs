//! Authoritative match simulation
//!
//! `MatchState` owns everything about one match: the two paddles, the ball,
//! scores, the serve countdown and the power-up field. It is advanced only by
//! `tick` and mutated only through the join/leave/input operations, so the
//! room task that owns it never needs a lock.

use crate::powerup::PowerUpField;
use crate::scheduler::MAX_TICK_DT;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::physics::{
    clamp_paddle, detect_paddle_collision, detect_scoring, launch_velocity, move_paddle,
    paddle_half_height, required_substeps, step_ball, BallState, Paddle,
};
use shared::{
    now_millis, BallSnapshot, Direction, MatchSnapshot, PaddleSnapshot, Phase, PlayerSide,
    PowerUpKind, BALL_SPEED, GAME_HEIGHT, MAX_LAUNCH_ANGLE, PADDLE_SPEED, SERVE_DELAY_MS,
    WINNING_SCORE,
};
use std::collections::HashMap;

pub const WAITING_STATUS: &str = "Waiting for opponent...";
pub const DISCONNECT_REASON: &str = "Player disconnected";

#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub winning_score: u32,
    pub serve_delay_ms: u64,
    pub powerups_enabled: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            winning_score: WINNING_SCORE,
            serve_delay_ms: SERVE_DELAY_MS,
            powerups_enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub client_id: u32,
    pub name: String,
    /// Paddle center.
    pub y: f32,
    pub side: PlayerSide,
    pub connected: bool,
    pub score: u32,
    pub paddle_scale: f32,
}

impl PlayerState {
    pub fn new(client_id: u32, name: String, side: PlayerSide) -> Self {
        Self {
            client_id,
            name,
            y: GAME_HEIGHT / 2.0,
            side,
            connected: true,
            score: 0,
            paddle_scale: 1.0,
        }
    }

    pub fn player_number(&self) -> u8 {
        self.side.player_number()
    }

    fn paddle(&self) -> Paddle {
        Paddle::new(self.y, self.paddle_scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// First player in; only they should hear the waiting status.
    WaitingForOpponent { side: PlayerSide },
    MatchStarted { side: PlayerSide },
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Removed,
    /// A player left mid-match and the match finished without a winner.
    MatchAbandoned,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    BallLaunched,
    Scored {
        side: PlayerSide,
        score_left: u32,
        score_right: u32,
    },
    PowerUpSpawned {
        id: u32,
        kind: PowerUpKind,
    },
    PowerUpCollected {
        kind: PowerUpKind,
        collector_id: u32,
    },
    EffectExpired {
        kind: PowerUpKind,
        target_id: u32,
    },
    Finished {
        winner: Option<PlayerSide>,
        reason: String,
    },
}

/// Outcome of a match decided on points.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub winner_name: String,
    pub loser_name: String,
    pub winner_score: u32,
    pub loser_score: u32,
    pub timestamp: u64,
}

#[derive(Debug)]
pub struct MatchState {
    config: MatchConfig,
    phase: Phase,
    players: HashMap<u32, PlayerState>,
    inputs: HashMap<u32, Direction>,
    ball: BallState,
    /// Seconds left before the next serve, while a serve is pending.
    serve_countdown: Option<f32>,
    /// Milliseconds of simulated `Playing` time.
    clock_ms: f64,
    tick: u32,
    last_hitter: Option<u32>,
    powerups: PowerUpField,
    winner: Option<PlayerSide>,
    finish_reason: Option<String>,
    rng: StdRng,
}

impl MatchState {
    pub fn new(config: MatchConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: MatchConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: MatchConfig, rng: StdRng) -> Self {
        let powerups = PowerUpField::new(config.powerups_enabled);
        Self {
            config,
            phase: Phase::Waiting,
            players: HashMap::new(),
            inputs: HashMap::new(),
            ball: BallState::centered(),
            serve_countdown: None,
            clock_ms: 0.0,
            tick: 0,
            last_hitter: None,
            powerups,
            winner: None,
            finish_reason: None,
            rng,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms as u64
    }

    pub fn ball(&self) -> &BallState {
        &self.ball
    }

    /// Places the ball directly, for scripted situations.
    pub fn set_ball(&mut self, ball: BallState) {
        self.ball = ball;
        self.serve_countdown = None;
    }

    pub fn player(&self, client_id: u32) -> Option<&PlayerState> {
        self.players.get(&client_id)
    }

    pub fn player_on(&self, side: PlayerSide) -> Option<&PlayerState> {
        self.players.values().find(|p| p.side == side)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn input(&self, client_id: u32) -> Direction {
        self.inputs.get(&client_id).copied().unwrap_or_default()
    }

    pub fn winner(&self) -> Option<PlayerSide> {
        self.winner
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn serve_pending(&self) -> bool {
        self.serve_countdown.is_some()
    }

    pub fn last_hitter(&self) -> Option<u32> {
        self.last_hitter
    }

    pub fn powerups(&self) -> &PowerUpField {
        &self.powerups
    }

    pub fn powerups_mut(&mut self) -> &mut PowerUpField {
        &mut self.powerups
    }

    pub fn add_player(&mut self, client_id: u32, name: &str) -> JoinOutcome {
        if self.phase == Phase::Finished
            || self.players.len() >= 2
            || self.players.contains_key(&client_id)
        {
            return JoinOutcome::Rejected;
        }

        let side = if self.player_on(PlayerSide::Left).is_none() {
            PlayerSide::Left
        } else {
            PlayerSide::Right
        };

        info!(
            "Player {} ({}) joined as player {}",
            client_id,
            name,
            side.player_number()
        );
        self.players
            .insert(client_id, PlayerState::new(client_id, name.to_string(), side));
        self.inputs.insert(client_id, Direction::Stop);

        if self.players.len() == 2 {
            self.start_match();
            JoinOutcome::MatchStarted { side }
        } else {
            JoinOutcome::WaitingForOpponent { side }
        }
    }

    pub fn remove_player(&mut self, client_id: u32) -> LeaveOutcome {
        match self.phase {
            Phase::Waiting => {
                if self.players.remove(&client_id).is_some() {
                    self.inputs.remove(&client_id);
                    info!("Player {} left before the match started", client_id);
                    LeaveOutcome::Removed
                } else {
                    LeaveOutcome::Unknown
                }
            }
            Phase::Playing => match self.players.get_mut(&client_id) {
                Some(player) => {
                    player.connected = false;
                    self.inputs.insert(client_id, Direction::Stop);
                    self.finish(None, DISCONNECT_REASON.to_string());
                    LeaveOutcome::MatchAbandoned
                }
                None => LeaveOutcome::Unknown,
            },
            Phase::Finished => match self.players.get_mut(&client_id) {
                Some(player) => {
                    player.connected = false;
                    LeaveOutcome::Removed
                }
                None => LeaveOutcome::Unknown,
            },
        }
    }

    /// Stores the latest intent of a player. Returns false when ignored.
    pub fn set_input(&mut self, client_id: u32, direction: Direction) -> bool {
        match self.players.get(&client_id) {
            Some(player) if player.connected => {
                self.inputs.insert(client_id, direction);
                true
            }
            _ => false,
        }
    }

    /// Advances the match by `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> Vec<MatchEvent> {
        let mut events = Vec::new();
        if self.phase != Phase::Playing {
            return events;
        }

        let dt = if dt.is_finite() {
            dt.clamp(0.0, MAX_TICK_DT)
        } else {
            0.0
        };
        self.tick = self.tick.wrapping_add(1);
        self.clock_ms += dt as f64 * 1000.0;

        for player in self.players.values_mut().filter(|p| p.connected) {
            let direction = self.inputs.get(&player.client_id).copied().unwrap_or_default();
            player.y = move_paddle(
                player.y,
                direction,
                PADDLE_SPEED,
                dt,
                paddle_half_height(player.paddle_scale),
            );
        }

        match self.serve_countdown {
            Some(remaining) => {
                let remaining = remaining - dt;
                if remaining <= 0.0 {
                    self.serve_countdown = None;
                    self.launch_ball();
                    events.push(MatchEvent::BallLaunched);
                } else {
                    self.serve_countdown = Some(remaining);
                }
            }
            None => self.advance_ball(dt),
        }

        if let Some(scorer) = detect_scoring(&self.ball) {
            self.award_point(scorer, &mut events);
        }

        if self.phase == Phase::Playing {
            self.update_powerups(&mut events);
        }

        events
    }

    fn start_match(&mut self) {
        self.phase = Phase::Playing;
        for player in self.players.values_mut() {
            player.y = GAME_HEIGHT / 2.0;
        }
        self.reset_ball();
        info!("Match started");
    }

    fn reset_ball(&mut self) {
        self.ball = BallState::centered();
        self.last_hitter = None;
        self.serve_countdown = Some(self.config.serve_delay_ms as f32 / 1000.0);
    }

    fn launch_ball(&mut self) {
        let angle = self.rng.gen_range(-MAX_LAUNCH_ANGLE..=MAX_LAUNCH_ANGLE);
        let direction = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let speed = BALL_SPEED * self.powerups.ball_speed_modifier();
        let (vx, vy) = launch_velocity(angle, direction, speed);
        self.ball = BallState {
            vx,
            vy,
            ..BallState::centered()
        };
        debug!("Ball launched with velocity ({:.1}, {:.1})", vx, vy);
    }

    fn advance_ball(&mut self, dt: f32) {
        let substeps = required_substeps(self.ball.speed(), dt);
        let step = dt / substeps as f32;

        for _ in 0..substeps {
            self.ball = step_ball(&self.ball, step);
            self.check_paddle_hit();
            if detect_scoring(&self.ball).is_some() {
                break;
            }
        }
    }

    fn check_paddle_hit(&mut self) {
        let side = if self.ball.vx < 0.0 {
            PlayerSide::Left
        } else if self.ball.vx > 0.0 {
            PlayerSide::Right
        } else {
            return;
        };

        let modifier = self.powerups.ball_speed_modifier();
        let Some(player) = self.players.values().find(|p| p.side == side) else {
            return;
        };

        if let Some(bounced) = detect_paddle_collision(&self.ball, &player.paddle(), side, modifier)
        {
            self.ball = bounced;
            self.last_hitter = Some(player.client_id);
        }
    }

    fn award_point(&mut self, scorer: PlayerSide, events: &mut Vec<MatchEvent>) {
        let Some(player) = self.players.values_mut().find(|p| p.side == scorer) else {
            self.reset_ball();
            return;
        };
        player.score += 1;
        let score = player.score;
        let number = player.player_number();

        let (score_left, score_right) = self.scores();
        info!(
            "Player {} scored ({} - {})",
            number, score_left, score_right
        );
        events.push(MatchEvent::Scored {
            side: scorer,
            score_left,
            score_right,
        });

        if score >= self.config.winning_score {
            let reason = format!("Player {} wins!", number);
            self.finish(Some(scorer), reason.clone());
            events.push(MatchEvent::Finished {
                winner: Some(scorer),
                reason,
            });
        } else {
            self.reset_ball();
        }
    }

    fn update_powerups(&mut self, events: &mut Vec<MatchEvent>) {
        let clock = self.clock_ms();
        self.powerups.prune(clock);

        let expired = self.powerups.take_expired(clock);
        for effect in &expired {
            if effect.kind.affects_ball() {
                self.ball.scale_velocity(1.0 / effect.kind.multiplier());
            }
            events.push(MatchEvent::EffectExpired {
                kind: effect.kind,
                target_id: effect.target_id,
            });
        }
        if !expired.is_empty() {
            self.refresh_paddle_scales();
        }

        if let Some(spawned) = self.powerups.maybe_spawn(clock, &mut self.rng) {
            debug!("Power-up {:?} spawned at ({:.0}, {:.0})", spawned.kind, spawned.x, spawned.y);
            events.push(MatchEvent::PowerUpSpawned {
                id: spawned.id,
                kind: spawned.kind,
            });
        }

        let Some(collector_id) = self.last_hitter else {
            return;
        };
        if let Some(collected) = self.powerups.collect(&self.ball) {
            self.apply_powerup(collected.kind, collector_id, clock);
            events.push(MatchEvent::PowerUpCollected {
                kind: collected.kind,
                collector_id,
            });
        }
    }

    fn apply_powerup(&mut self, kind: PowerUpKind, collector_id: u32, clock: u64) {
        let target_id = match kind {
            PowerUpKind::ShrinkOpponent => {
                match self.players.keys().find(|id| **id != collector_id) {
                    Some(id) => *id,
                    None => return,
                }
            }
            _ => collector_id,
        };

        info!("Player {} collected {:?}", collector_id, kind);
        self.powerups.add_effect(kind, target_id, clock);
        if kind.affects_ball() {
            self.ball.scale_velocity(kind.multiplier());
        } else {
            self.refresh_paddle_scales();
        }
    }

    fn refresh_paddle_scales(&mut self) {
        for player in self.players.values_mut() {
            player.paddle_scale = self.powerups.paddle_scale(player.client_id);
            player.y = clamp_paddle(player.y, paddle_half_height(player.paddle_scale));
        }
    }

    fn finish(&mut self, winner: Option<PlayerSide>, reason: String) {
        info!("Match finished: {}", reason);
        self.phase = Phase::Finished;
        self.winner = winner;
        self.finish_reason = Some(reason);
        self.serve_countdown = None;
        self.ball.vx = 0.0;
        self.ball.vy = 0.0;
        self.powerups.clear();
        self.refresh_paddle_scales();
    }

    fn scores(&self) -> (u32, u32) {
        let score = |side| self.player_on(side).map_or(0, |p| p.score);
        (score(PlayerSide::Left), score(PlayerSide::Right))
    }

    /// Result of a match won on points, for the leaderboard.
    pub fn result(&self) -> Option<MatchResult> {
        let winner = self.player_on(self.winner?)?;
        let loser = self.player_on(winner.side.opposite())?;
        Some(MatchResult {
            winner_name: winner.name.clone(),
            loser_name: loser.name.clone(),
            winner_score: winner.score,
            loser_score: loser.score,
            timestamp: now_millis(),
        })
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        let mut paddles: Vec<PaddleSnapshot> = self
            .players
            .values()
            .map(|p| PaddleSnapshot {
                client_id: p.client_id,
                name: p.name.clone(),
                side: p.side,
                y: p.y,
                connected: p.connected,
                paddle_scale: p.paddle_scale,
            })
            .collect();
        paddles.sort_by_key(|p| p.side.player_number());

        let (score_left, score_right) = self.scores();
        MatchSnapshot {
            phase: self.phase,
            paddles,
            ball: BallSnapshot {
                x: self.ball.x,
                y: self.ball.y,
                vx: self.ball.vx,
                vy: self.ball.vy,
            },
            score_left,
            score_right,
            winner: self.winner,
            powerups: self.powerups.powerup_snapshots(),
            effects: self.powerups.effect_snapshots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{BALL_RADIUS, GAME_WIDTH, PADDLE_OFFSET};

    const DT: f32 = 1.0 / 60.0;

    fn no_powerups() -> MatchConfig {
        MatchConfig {
            powerups_enabled: false,
            ..Default::default()
        }
    }

    fn started_match(config: MatchConfig) -> MatchState {
        let mut state = MatchState::with_seed(config, 1);
        state.add_player(1, "alice");
        state.add_player(2, "bob");
        state
    }

    fn serve(state: &mut MatchState) {
        while state.serve_pending() {
            state.tick(DT);
        }
    }

    #[test]
    fn test_second_join_starts_match() {
        let mut state = MatchState::with_seed(no_powerups(), 1);
        assert_eq!(
            state.add_player(1, "alice"),
            JoinOutcome::WaitingForOpponent {
                side: PlayerSide::Left
            }
        );
        assert_eq!(state.phase(), Phase::Waiting);

        assert_eq!(
            state.add_player(2, "bob"),
            JoinOutcome::MatchStarted {
                side: PlayerSide::Right
            }
        );
        assert_eq!(state.phase(), Phase::Playing);
        assert!(state.serve_pending());
        assert_eq!(state.ball().speed(), 0.0);
        assert_eq!(state.player(1).unwrap().player_number(), 1);
        assert_eq!(state.player(2).unwrap().player_number(), 2);
    }

    #[test]
    fn test_third_join_rejected() {
        let mut state = started_match(no_powerups());
        assert_eq!(state.add_player(3, "carol"), JoinOutcome::Rejected);
        assert_eq!(state.add_player(1, "alice"), JoinOutcome::Rejected);
        assert_eq!(state.player_count(), 2);
    }

    #[test]
    fn test_waiting_leave_keeps_waiting() {
        let mut state = MatchState::with_seed(no_powerups(), 1);
        state.add_player(1, "alice");
        assert_eq!(state.remove_player(1), LeaveOutcome::Removed);
        assert_eq!(state.phase(), Phase::Waiting);
        assert_eq!(state.player_count(), 0);
        assert_eq!(state.remove_player(1), LeaveOutcome::Unknown);

        // The freed left side is handed to the next joiner.
        state.add_player(5, "dave");
        assert_eq!(state.player(5).unwrap().side, PlayerSide::Left);
    }

    #[test]
    fn test_ticks_are_noop_outside_playing() {
        let mut state = MatchState::with_seed(no_powerups(), 1);
        state.add_player(1, "alice");
        state.set_input(1, Direction::Up);
        assert!(state.tick(DT).is_empty());
        assert_eq!(state.tick_count(), 0);
        assert_eq!(state.player(1).unwrap().y, GAME_HEIGHT / 2.0);
    }

    #[test]
    fn test_serve_waits_for_delay() {
        let mut state = started_match(no_powerups());
        let mut launched_at = None;
        for i in 1..=120 {
            let events = state.tick(DT);
            if events.contains(&MatchEvent::BallLaunched) {
                launched_at = Some(i);
                break;
            }
            assert_eq!(state.ball().speed(), 0.0);
        }

        let launched_at = launched_at.unwrap();
        assert!((59..=61).contains(&launched_at));
        assert_approx_eq!(state.ball().speed(), BALL_SPEED, 1e-2);
        let angle = (state.ball().vy / state.ball().vx.abs()).atan();
        assert!(angle.abs() <= MAX_LAUNCH_ANGLE + 1e-4);
    }

    #[test]
    fn test_input_moves_only_own_paddle() {
        let mut state = started_match(no_powerups());
        assert!(state.set_input(1, Direction::Up));
        assert!(!state.set_input(99, Direction::Up));

        state.tick(0.1);
        assert_approx_eq!(state.player(1).unwrap().y, GAME_HEIGHT / 2.0 - PADDLE_SPEED * 0.05);
        assert_eq!(state.player(2).unwrap().y, GAME_HEIGHT / 2.0);

        // Last intent wins and persists across ticks.
        state.set_input(1, Direction::Down);
        state.set_input(1, Direction::Stop);
        let y = state.player(1).unwrap().y;
        state.tick(DT);
        assert_eq!(state.player(1).unwrap().y, y);
    }

    #[test]
    fn test_paddles_still_without_input() {
        let mut state = started_match(MatchConfig::default());
        for _ in 0..200 {
            state.tick(DT);
            for id in [1, 2] {
                assert_eq!(state.player(id).unwrap().y, GAME_HEIGHT / 2.0);
            }
        }
    }

    #[test]
    fn test_goal_scores_once_and_resets() {
        let mut state = started_match(no_powerups());
        state.set_ball(BallState {
            x: 0.0,
            y: 360.0,
            vx: -50.0,
            vy: 0.0,
        });

        let events = state.tick(DT);
        let scored: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, MatchEvent::Scored { .. }))
            .collect();
        assert_eq!(scored.len(), 1);
        assert_eq!(state.player(2).unwrap().score, 1);
        assert_eq!(state.player(1).unwrap().score, 0);
        assert_eq!(state.ball().x, GAME_WIDTH / 2.0);
        assert_eq!(state.ball().y, GAME_HEIGHT / 2.0);
        assert_eq!(state.ball().speed(), 0.0);

        // No further scoring while the serve is pending, then a relaunch.
        let mut relaunched = false;
        for _ in 0..90 {
            let events = state.tick(DT);
            assert!(!events.iter().any(|e| matches!(e, MatchEvent::Scored { .. })));
            if events.contains(&MatchEvent::BallLaunched) {
                relaunched = true;
                break;
            }
        }
        assert!(relaunched);
        assert!(state.ball().speed() > 0.0);
    }

    #[test]
    fn test_winning_score_finishes_match() {
        let mut state = started_match(MatchConfig {
            winning_score: 2,
            ..no_powerups()
        });

        for _ in 0..2 {
            state.set_ball(BallState {
                x: GAME_WIDTH - BALL_RADIUS,
                y: 360.0,
                vx: 100.0,
                vy: 0.0,
            });
            state.tick(DT);
        }

        assert_eq!(state.phase(), Phase::Finished);
        assert_eq!(state.winner(), Some(PlayerSide::Left));
        assert_eq!(state.finish_reason(), Some("Player 1 wins!"));
        assert!(state.tick(DT).is_empty());

        let result = state.result().unwrap();
        assert_eq!(result.winner_name, "alice");
        assert_eq!(result.loser_name, "bob");
        assert_eq!((result.winner_score, result.loser_score), (2, 0));

        // A finished match never takes new players.
        assert_eq!(state.add_player(3, "carol"), JoinOutcome::Rejected);
    }

    #[test]
    fn test_disconnect_while_playing_finishes() {
        let mut state = started_match(no_powerups());
        serve(&mut state);
        assert_eq!(state.remove_player(2), LeaveOutcome::MatchAbandoned);
        assert_eq!(state.phase(), Phase::Finished);
        assert_eq!(state.winner(), None);
        assert_eq!(state.finish_reason(), Some(DISCONNECT_REASON));
        assert!(!state.player(2).unwrap().connected);
        assert_eq!(state.ball().speed(), 0.0);
        assert!(state.result().is_none());
        assert!(!state.set_input(2, Direction::Up));

        assert_eq!(state.remove_player(1), LeaveOutcome::Removed);
    }

    #[test]
    fn test_paddle_returns_ball() {
        let mut state = started_match(no_powerups());
        state.set_ball(BallState {
            x: PADDLE_OFFSET + 25.0,
            y: 360.0,
            vx: -BALL_SPEED,
            vy: 0.0,
        });
        for _ in 0..10 {
            state.tick(DT);
        }
        assert!(state.ball().vx > 0.0);
        assert_eq!(state.last_hitter(), Some(1));
        assert_eq!(state.player(2).unwrap().score, 0);
    }

    #[test]
    fn test_fast_ball_does_not_tunnel_through_paddle() {
        let mut state = started_match(no_powerups());
        state.set_ball(BallState {
            x: PADDLE_OFFSET + 70.0,
            y: 360.0,
            vx: -1500.0,
            vy: 0.0,
        });
        state.tick(MAX_TICK_DT);
        assert!(state.ball().vx > 0.0);
        assert_eq!(state.player(2).unwrap().score, 0);
    }

    #[test]
    fn test_collected_speed_up_scales_ball_and_expires() {
        let mut state = started_match(MatchConfig::default());
        state.set_ball(BallState {
            x: PADDLE_OFFSET + 25.0,
            y: 360.0,
            vx: -BALL_SPEED,
            vy: 0.0,
        });
        state.tick(DT);
        assert_eq!(state.last_hitter(), Some(1));
        let speed_before = state.ball().speed();

        let (bx, by) = (state.ball().x, state.ball().y);
        let clock = state.clock_ms();
        state
            .powerups_mut()
            .insert(PowerUpKind::SpeedUp, bx + 10.0, by, clock);

        let events = state.tick(0.0);
        assert!(events.contains(&MatchEvent::PowerUpCollected {
            kind: PowerUpKind::SpeedUp,
            collector_id: 1,
        }));
        assert_approx_eq!(state.ball().speed(), speed_before * 1.5, 1e-2);
        assert_approx_eq!(state.powerups().ball_speed_modifier(), 1.5);

        // Park the ball so it stays in play while the effect runs out.
        state.set_ball(BallState {
            x: 640.0,
            y: 360.0,
            vx: 0.0,
            vy: 600.0,
        });
        let mut expired = false;
        for _ in 0..400 {
            let events = state.tick(DT);
            if events
                .iter()
                .any(|e| matches!(e, MatchEvent::EffectExpired { .. }))
            {
                expired = true;
                break;
            }
        }
        assert!(expired);
        assert_approx_eq!(state.ball().speed(), 400.0, 1e-2);
        assert_approx_eq!(state.powerups().ball_speed_modifier(), 1.0);
    }

    #[test]
    fn test_shrink_opponent_targets_other_player() {
        let mut state = started_match(MatchConfig::default());
        state.set_ball(BallState {
            x: PADDLE_OFFSET + 25.0,
            y: 360.0,
            vx: -BALL_SPEED,
            vy: 0.0,
        });
        state.tick(DT);
        let (bx, by) = (state.ball().x, state.ball().y);
        let clock = state.clock_ms();
        state
            .powerups_mut()
            .insert(PowerUpKind::ShrinkOpponent, bx, by, clock);
        state.tick(0.0);

        assert_approx_eq!(state.player(2).unwrap().paddle_scale, 0.6);
        assert_approx_eq!(state.player(1).unwrap().paddle_scale, 1.0);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.effects.len(), 1);
        assert_eq!(snapshot.effects[0].target_id, 2);
    }

    #[test]
    fn test_big_paddle_reclamps_at_edge() {
        let mut state = started_match(MatchConfig::default());
        state.set_input(1, Direction::Up);
        for _ in 0..60 {
            state.tick(DT);
        }
        assert_approx_eq!(state.player(1).unwrap().y, 50.0);

        state.set_ball(BallState {
            x: PADDLE_OFFSET + 25.0,
            y: 60.0,
            vx: -BALL_SPEED,
            vy: 0.0,
        });
        state.tick(DT);
        assert_eq!(state.last_hitter(), Some(1));
        let (bx, by) = (state.ball().x, state.ball().y);
        let clock = state.clock_ms();
        state
            .powerups_mut()
            .insert(PowerUpKind::BigPaddle, bx, by, clock);
        state.tick(0.0);

        let player = state.player(1).unwrap();
        assert_approx_eq!(player.paddle_scale, 1.5);
        assert_approx_eq!(player.y, 75.0);
    }

    #[test]
    fn test_no_collection_before_first_hit() {
        let mut state = started_match(MatchConfig::default());
        state.set_ball(BallState {
            x: 640.0,
            y: 360.0,
            vx: 100.0,
            vy: 0.0,
        });
        state.powerups_mut().insert(PowerUpKind::BigPaddle, 645.0, 360.0, 0);
        let events = state.tick(DT);
        assert!(!events
            .iter()
            .any(|e| matches!(e, MatchEvent::PowerUpCollected { .. })));
    }

    #[test]
    fn test_snapshot_reports_sides_and_scores() {
        let mut state = started_match(no_powerups());
        state.set_ball(BallState {
            x: 0.0,
            y: 360.0,
            vx: -50.0,
            vy: 0.0,
        });
        state.tick(DT);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, Phase::Playing);
        assert_eq!(snapshot.paddles.len(), 2);
        assert_eq!(snapshot.paddles[0].side, PlayerSide::Left);
        assert_eq!(snapshot.paddles[0].name, "alice");
        assert_eq!(snapshot.score_left, 0);
        assert_eq!(snapshot.score_right, 1);
        assert_eq!(snapshot.winner, None);
    }
}
