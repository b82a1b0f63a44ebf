use crate::{Phase, PlayerSide, PowerUpKind, GAME_HEIGHT, GAME_WIDTH};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaddleSnapshot {
    pub client_id: u32,
    pub name: String,
    pub side: PlayerSide,
    /// Paddle center.
    pub y: f32,
    pub connected: bool,
    pub paddle_scale: f32,
}

impl PaddleSnapshot {
    pub fn player_number(&self) -> u8 {
        self.side.player_number()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Default for BallSnapshot {
    fn default() -> Self {
        Self {
            x: GAME_WIDTH / 2.0,
            y: GAME_HEIGHT / 2.0,
            vx: 0.0,
            vy: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerUpSnapshot {
    pub id: u32,
    pub kind: PowerUpKind,
    pub x: f32,
    pub y: f32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSnapshot {
    pub kind: PowerUpKind,
    pub target_id: u32,
    /// Match clock, in milliseconds.
    pub expires_at: u64,
}

/// Everything a client needs to draw one moment of a match.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub phase: Phase,
    /// Sorted left side first.
    pub paddles: Vec<PaddleSnapshot>,
    pub ball: BallSnapshot,
    pub score_left: u32,
    pub score_right: u32,
    pub winner: Option<PlayerSide>,
    pub powerups: Vec<PowerUpSnapshot>,
    pub effects: Vec<EffectSnapshot>,
}

/// Changed sections of a [`MatchSnapshot`]. Every section carries absolute
/// values, so a delta applied after a lost one still converges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateDelta {
    pub phase: Option<Phase>,
    pub paddles: Option<Vec<PaddleSnapshot>>,
    pub ball: Option<BallSnapshot>,
    pub scores: Option<(u32, u32)>,
    pub winner: Option<Option<PlayerSide>>,
    pub powerups: Option<Vec<PowerUpSnapshot>>,
    pub effects: Option<Vec<EffectSnapshot>>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.phase.is_none()
            && self.paddles.is_none()
            && self.ball.is_none()
            && self.scores.is_none()
            && self.winner.is_none()
            && self.powerups.is_none()
            && self.effects.is_none()
    }
}

fn changed<T: PartialEq + Clone>(current: &T, previous: &T) -> Option<T> {
    if current != previous {
        Some(current.clone())
    } else {
        None
    }
}

impl MatchSnapshot {
    pub fn paddle(&self, client_id: u32) -> Option<&PaddleSnapshot> {
        self.paddles.iter().find(|p| p.client_id == client_id)
    }

    pub fn paddle_on(&self, side: PlayerSide) -> Option<&PaddleSnapshot> {
        self.paddles.iter().find(|p| p.side == side)
    }

    pub fn score_of(&self, side: PlayerSide) -> u32 {
        match side {
            PlayerSide::Left => self.score_left,
            PlayerSide::Right => self.score_right,
        }
    }

    /// Sections of `self` that differ from `previous`.
    pub fn diff(&self, previous: &MatchSnapshot) -> StateDelta {
        let scores = (self.score_left, self.score_right);
        StateDelta {
            phase: changed(&self.phase, &previous.phase),
            paddles: changed(&self.paddles, &previous.paddles),
            ball: changed(&self.ball, &previous.ball),
            scores: changed(&scores, &(previous.score_left, previous.score_right)),
            winner: changed(&self.winner, &previous.winner),
            powerups: changed(&self.powerups, &previous.powerups),
            effects: changed(&self.effects, &previous.effects),
        }
    }

    pub fn apply(&mut self, delta: &StateDelta) {
        if let Some(phase) = delta.phase {
            self.phase = phase;
        }
        if let Some(paddles) = &delta.paddles {
            self.paddles = paddles.clone();
        }
        if let Some(ball) = delta.ball {
            self.ball = ball;
        }
        if let Some((left, right)) = delta.scores {
            self.score_left = left;
            self.score_right = right;
        }
        if let Some(winner) = delta.winner {
            self.winner = winner;
        }
        if let Some(powerups) = &delta.powerups {
            self.powerups = powerups.clone();
        }
        if let Some(effects) = &delta.effects {
            self.effects = effects.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paddle(client_id: u32, side: PlayerSide, y: f32) -> PaddleSnapshot {
        PaddleSnapshot {
            client_id,
            name: format!("Player {}", client_id),
            side,
            y,
            connected: true,
            paddle_scale: 1.0,
        }
    }

    fn two_player_snapshot() -> MatchSnapshot {
        MatchSnapshot {
            phase: Phase::Playing,
            paddles: vec![
                paddle(1, PlayerSide::Left, 360.0),
                paddle(2, PlayerSide::Right, 360.0),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_snapshots_produce_empty_delta() {
        let snapshot = two_player_snapshot();
        assert!(snapshot.diff(&snapshot.clone()).is_empty());
    }

    #[test]
    fn test_diff_only_carries_changed_sections() {
        let before = two_player_snapshot();
        let mut after = before.clone();
        after.ball.x += 10.0;
        after.score_right = 1;

        let delta = after.diff(&before);
        assert!(delta.ball.is_some());
        assert_eq!(delta.scores, Some((0, 1)));
        assert!(delta.phase.is_none());
        assert!(delta.paddles.is_none());
        assert!(delta.powerups.is_none());
    }

    #[test]
    fn test_apply_reconstructs_snapshot() {
        let before = two_player_snapshot();
        let mut after = before.clone();
        after.phase = Phase::Finished;
        after.winner = Some(PlayerSide::Left);
        after.score_left = 5;
        after.paddles[1].connected = false;
        after.powerups.push(PowerUpSnapshot {
            id: 3,
            kind: PowerUpKind::SpeedUp,
            x: 600.0,
            y: 200.0,
            active: true,
        });

        let mut replica = before.clone();
        replica.apply(&after.diff(&before));
        assert_eq!(replica, after);
    }

    #[test]
    fn test_later_delta_converges_after_lost_delta() {
        let base = two_player_snapshot();
        let mut step1 = base.clone();
        step1.ball.x = 700.0;
        let mut step2 = step1.clone();
        step2.ball.x = 710.0;

        // The client only ever saw `base`; the delta for step1 is lost.
        let mut replica = base.clone();
        replica.apply(&step2.diff(&step1));
        assert_eq!(replica.ball, step2.ball);
    }

    #[test]
    fn test_winner_cleared_through_delta() {
        let mut with_winner = two_player_snapshot();
        with_winner.winner = Some(PlayerSide::Right);
        let without = two_player_snapshot();

        let delta = without.diff(&with_winner);
        assert_eq!(delta.winner, Some(None));
        with_winner.apply(&delta);
        assert_eq!(with_winner.winner, None);
    }

    #[test]
    fn test_paddle_lookup() {
        let snapshot = two_player_snapshot();
        assert_eq!(snapshot.paddle(2).map(|p| p.side), Some(PlayerSide::Right));
        assert_eq!(snapshot.paddle_on(PlayerSide::Left).map(|p| p.client_id), Some(1));
        assert!(snapshot.paddle(99).is_none());
        assert_eq!(snapshot.paddles[1].player_number(), 2);
    }
}
