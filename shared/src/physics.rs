//! Paddle and ball physics shared by the server simulation, client-side
//! prediction and offline play. Every function here is pure.

use crate::{
    Direction, PlayerSide, BALL_RADIUS, BALL_SPEED, GAME_HEIGHT, GAME_WIDTH, MAX_BOUNCE_ANGLE,
    MAX_LAUNCH_ANGLE, MAX_SPEED_FACTOR, PADDLE_HEIGHT, PADDLE_WIDTH, RALLY_SPEEDUP,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Default for BallState {
    fn default() -> Self {
        Self::centered()
    }
}

impl BallState {
    /// Resting ball in the middle of the field.
    pub fn centered() -> Self {
        Self {
            x: GAME_WIDTH / 2.0,
            y: GAME_HEIGHT / 2.0,
            vx: 0.0,
            vy: 0.0,
        }
    }

    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    pub fn is_moving(&self) -> bool {
        self.vx != 0.0 || self.vy != 0.0
    }

    /// Multiplies the velocity, keeping the direction.
    pub fn scale_velocity(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.vx *= factor;
            self.vy *= factor;
        }
    }
}

/// Paddle geometry needed for collision checks. `y` is the center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    pub y: f32,
    pub half_height: f32,
}

impl Paddle {
    pub fn new(y: f32, scale: f32) -> Self {
        Self {
            y,
            half_height: paddle_half_height(scale),
        }
    }
}

fn sanitize_factor(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

pub fn paddle_half_height(scale: f32) -> f32 {
    PADDLE_HEIGHT * sanitize_factor(scale) / 2.0
}

/// Clamps a paddle center so the whole paddle stays on the field.
pub fn clamp_paddle(y: f32, half_height: f32) -> f32 {
    let half = if half_height.is_finite() {
        half_height.clamp(0.0, GAME_HEIGHT / 2.0)
    } else {
        PADDLE_HEIGHT / 2.0
    };
    if !y.is_finite() {
        return GAME_HEIGHT / 2.0;
    }
    y.clamp(half, GAME_HEIGHT - half)
}

pub fn move_paddle(y: f32, direction: Direction, speed: f32, dt: f32, half_height: f32) -> f32 {
    let step = direction.sign() * speed * dt.max(0.0);
    let target = if step.is_finite() { y + step } else { y };
    clamp_paddle(target, half_height)
}

/// Integrates the ball and reflects it off the top and bottom walls.
pub fn step_ball(ball: &BallState, dt: f32) -> BallState {
    let dt = dt.max(0.0);
    let mut next = BallState {
        x: ball.x + ball.vx * dt,
        y: ball.y + ball.vy * dt,
        ..*ball
    };

    if next.y - BALL_RADIUS <= 0.0 {
        next.y = BALL_RADIUS;
        next.vy = next.vy.abs();
    } else if next.y + BALL_RADIUS >= GAME_HEIGHT {
        next.y = GAME_HEIGHT - BALL_RADIUS;
        next.vy = -next.vy.abs();
    }

    next
}

/// Axis-aligned overlap between the ball and a box given by center and half extents.
pub fn ball_overlaps_box(ball: &BallState, cx: f32, cy: f32, half_w: f32, half_h: f32) -> bool {
    ball.x + BALL_RADIUS >= cx - half_w
        && ball.x - BALL_RADIUS <= cx + half_w
        && ball.y + BALL_RADIUS >= cy - half_h
        && ball.y - BALL_RADIUS <= cy + half_h
}

/// Returns the bounced ball when it hits `paddle` while travelling toward it.
///
/// The bounce angle grows with the distance from the paddle center, up to
/// `MAX_BOUNCE_ANGLE` at the edges. Every hit speeds the ball up, capped at
/// `MAX_SPEED_FACTOR * BALL_SPEED * speed_modifier`.
pub fn detect_paddle_collision(
    ball: &BallState,
    paddle: &Paddle,
    side: PlayerSide,
    speed_modifier: f32,
) -> Option<BallState> {
    let approaching = match side {
        PlayerSide::Left => ball.vx < 0.0,
        PlayerSide::Right => ball.vx > 0.0,
    };
    if !approaching {
        return None;
    }

    let paddle_x = side.paddle_x();
    let half_w = PADDLE_WIDTH / 2.0;
    if !ball_overlaps_box(ball, paddle_x, paddle.y, half_w, paddle.half_height) {
        return None;
    }

    let half = if paddle.half_height > 0.0 {
        paddle.half_height
    } else {
        PADDLE_HEIGHT / 2.0
    };
    let relative = (paddle.y - ball.y) / half;
    let relative = if relative.is_finite() {
        relative.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let angle = relative * MAX_BOUNCE_ANGLE;

    let current = ball.speed();
    let current = if current.is_finite() && current > 0.0 {
        current
    } else {
        BALL_SPEED
    };
    let cap = MAX_SPEED_FACTOR * BALL_SPEED * sanitize_factor(speed_modifier);
    let speed = (current * RALLY_SPEEDUP).min(cap);

    let dir = side.outward_sign();
    let x = paddle_x + dir * (half_w + BALL_RADIUS + 1.0);

    Some(BallState {
        x,
        y: ball.y,
        vx: speed * angle.cos() * dir,
        vy: -speed * angle.sin(),
    })
}

/// Returns the side that scored when the ball reaches a goal line.
pub fn detect_scoring(ball: &BallState) -> Option<PlayerSide> {
    if ball.x - BALL_RADIUS <= 0.0 {
        Some(PlayerSide::Right)
    } else if ball.x + BALL_RADIUS >= GAME_WIDTH {
        Some(PlayerSide::Left)
    } else {
        None
    }
}

/// Serve velocity for a launch angle (clamped to `MAX_LAUNCH_ANGLE`).
pub fn launch_velocity(angle: f32, direction_sign: f32, speed: f32) -> (f32, f32) {
    let angle = if angle.is_finite() {
        angle.clamp(-MAX_LAUNCH_ANGLE, MAX_LAUNCH_ANGLE)
    } else {
        0.0
    };
    let dir = if direction_sign < 0.0 { -1.0 } else { 1.0 };
    (angle.cos() * speed * dir, angle.sin() * speed)
}

/// Number of equal sub-steps that keep the ball from skipping a paddle.
pub fn required_substeps(speed: f32, dt: f32) -> u32 {
    const MAX_MOVEMENT_PER_STEP: f32 = BALL_RADIUS;
    const MAX_SUBSTEPS: u32 = 16;

    let movement = speed * dt;
    if !movement.is_finite() || movement <= MAX_MOVEMENT_PER_STEP {
        return 1;
    }
    ((movement / MAX_MOVEMENT_PER_STEP).ceil() as u32).clamp(1, MAX_SUBSTEPS)
}
