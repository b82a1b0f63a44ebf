//! Local two-player match on one keyboard
//!
//! Runs the same paddle and ball kernel the server uses, but entirely on the
//! client. Scoring and the world-bound collisions (walls, paddles, goal
//! lines) only run while the match is enabled; the online client keeps one of
//! these around disabled so switching modes never carries local scoring into
//! a networked game.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::physics::{self, BallState, Paddle};
use shared::{
    BallSnapshot, Direction, MatchSnapshot, PaddleSnapshot, Phase, PlayerSide, BALL_SPEED,
    GAME_HEIGHT, MAX_LAUNCH_ANGLE, PADDLE_SPEED, SERVE_DELAY_MS,
};

pub const LEFT_PLAYER_NAME: &str = "Player 1";
pub const RIGHT_PLAYER_NAME: &str = "Player 2";

pub struct LocalMatch {
    left_y: f32,
    right_y: f32,
    left_input: Direction,
    right_input: Direction,
    ball: BallState,
    score_left: u32,
    score_right: u32,
    serve_remaining: Option<f32>,
    serve_toward: PlayerSide,
    world_bounds: bool,
    rng: StdRng,
}

impl Default for LocalMatch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMatch {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            left_y: GAME_HEIGHT / 2.0,
            right_y: GAME_HEIGHT / 2.0,
            left_input: Direction::Stop,
            right_input: Direction::Stop,
            ball: BallState::centered(),
            score_left: 0,
            score_right: 0,
            serve_remaining: Some(SERVE_DELAY_MS as f32 / 1000.0),
            serve_toward: PlayerSide::Right,
            world_bounds: false,
            rng,
        }
    }

    pub fn world_bounds_enabled(&self) -> bool {
        self.world_bounds
    }

    /// Turns wall, paddle and goal handling (and with it scoring) on or off.
    pub fn set_world_bounds(&mut self, enabled: bool) {
        self.world_bounds = enabled;
    }

    /// Stops both paddles and the ball, and queues a fresh serve.
    pub fn zero_velocities(&mut self) {
        self.left_input = Direction::Stop;
        self.right_input = Direction::Stop;
        self.ball = BallState {
            vx: 0.0,
            vy: 0.0,
            ..self.ball
        };
        self.serve_remaining = Some(SERVE_DELAY_MS as f32 / 1000.0);
    }

    pub fn set_inputs(&mut self, left: Direction, right: Direction) {
        self.left_input = left;
        self.right_input = right;
    }

    pub fn ball(&self) -> &BallState {
        &self.ball
    }

    pub fn set_ball(&mut self, ball: BallState) {
        self.ball = ball;
        self.serve_remaining = None;
    }

    pub fn paddle_y(&self, side: PlayerSide) -> f32 {
        match side {
            PlayerSide::Left => self.left_y,
            PlayerSide::Right => self.right_y,
        }
    }

    pub fn scores(&self) -> (u32, u32) {
        (self.score_left, self.score_right)
    }

    pub fn update(&mut self, dt: f32) {
        if !self.world_bounds {
            return;
        }
        let dt = dt.clamp(0.0, 0.05);
        let half = physics::paddle_half_height(1.0);
        self.left_y = physics::move_paddle(self.left_y, self.left_input, PADDLE_SPEED, dt, half);
        self.right_y =
            physics::move_paddle(self.right_y, self.right_input, PADDLE_SPEED, dt, half);

        if let Some(remaining) = self.serve_remaining {
            let remaining = remaining - dt;
            if remaining <= 0.0 {
                self.serve();
            } else {
                self.serve_remaining = Some(remaining);
            }
            return;
        }

        let substeps = physics::required_substeps(self.ball.speed(), dt);
        let step = dt / substeps as f32;
        for _ in 0..substeps {
            self.ball = physics::step_ball(&self.ball, step);
            for side in [PlayerSide::Left, PlayerSide::Right] {
                let paddle = Paddle::new(self.paddle_y(side), 1.0);
                if let Some(bounced) =
                    physics::detect_paddle_collision(&self.ball, &paddle, side, 1.0)
                {
                    self.ball = bounced;
                }
            }
            if let Some(scorer) = physics::detect_scoring(&self.ball) {
                self.award_point(scorer);
                break;
            }
        }
    }

    fn serve(&mut self) {
        let angle = self.rng.gen_range(-MAX_LAUNCH_ANGLE..=MAX_LAUNCH_ANGLE);
        let sign = self.serve_toward.outward_sign() * -1.0;
        let (vx, vy) = physics::launch_velocity(angle, sign, BALL_SPEED);
        self.ball = BallState {
            vx,
            vy,
            ..BallState::centered()
        };
        self.serve_remaining = None;
    }

    fn award_point(&mut self, scorer: PlayerSide) {
        match scorer {
            PlayerSide::Left => self.score_left += 1,
            PlayerSide::Right => self.score_right += 1,
        }
        debug!(
            "Local point for {:?}: {} - {}",
            scorer, self.score_left, self.score_right
        );
        // Serve toward the player who just conceded.
        self.serve_toward = scorer.opposite();
        self.ball = BallState::centered();
        self.serve_remaining = Some(SERVE_DELAY_MS as f32 / 1000.0);
    }

    /// The local match in the same shape the server streams, for drawing.
    pub fn snapshot(&self) -> MatchSnapshot {
        let paddle = |id, name: &str, side, y| PaddleSnapshot {
            client_id: id,
            name: name.to_string(),
            side,
            y,
            connected: true,
            paddle_scale: 1.0,
        };
        MatchSnapshot {
            phase: Phase::Playing,
            paddles: vec![
                paddle(1, LEFT_PLAYER_NAME, PlayerSide::Left, self.left_y),
                paddle(2, RIGHT_PLAYER_NAME, PlayerSide::Right, self.right_y),
            ],
            ball: BallSnapshot {
                x: self.ball.x,
                y: self.ball.y,
                vx: self.ball.vx,
                vy: self.ball.vy,
            },
            score_left: self.score_left,
            score_right: self.score_right,
            ..Default::default()
        }
    }
}
