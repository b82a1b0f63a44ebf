//! Power-up field and timed effects
//!
//! All times are on the match clock (milliseconds of `Playing` time), so a
//! paused or stalled room never expires an effect early.

use rand::Rng;
use shared::physics::{ball_overlaps_box, BallState};
use shared::{
    EffectSnapshot, PowerUpKind, PowerUpSnapshot, GAME_HEIGHT, GAME_WIDTH, MAX_FIELD_POWERUPS,
    POWERUP_DURATION_MS, POWERUP_LIFETIME_MS, POWERUP_SIZE, POWERUP_SPAWN_CHANCE,
    POWERUP_SPAWN_INTERVAL_MS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PowerUp {
    pub id: u32,
    pub kind: PowerUpKind,
    pub x: f32,
    pub y: f32,
    /// Cleared on pickup; inactive entries are pruned on the next update.
    pub active: bool,
    pub expires_at: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEffect {
    pub kind: PowerUpKind,
    pub target_id: u32,
    pub expires_at: u64,
}

#[derive(Debug)]
pub struct PowerUpField {
    enabled: bool,
    next_spawn_at: u64,
    next_id: u32,
    powerups: Vec<PowerUp>,
    effects: Vec<ActiveEffect>,
}

impl PowerUpField {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            next_spawn_at: POWERUP_SPAWN_INTERVAL_MS,
            next_id: 1,
            powerups: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn powerups(&self) -> &[PowerUp] {
        &self.powerups
    }

    pub fn effects(&self) -> &[ActiveEffect] {
        &self.effects
    }

    /// Drops collected and timed-out power-ups from the field.
    pub fn prune(&mut self, clock: u64) {
        self.powerups.retain(|p| p.active && p.expires_at > clock);
    }

    /// Rolls for a spawn once per spawn interval.
    pub fn maybe_spawn<R: Rng>(&mut self, clock: u64, rng: &mut R) -> Option<&PowerUp> {
        if !self.enabled || clock < self.next_spawn_at {
            return None;
        }
        self.next_spawn_at = clock + POWERUP_SPAWN_INTERVAL_MS;

        if self.powerups.len() >= MAX_FIELD_POWERUPS || !rng.gen_bool(POWERUP_SPAWN_CHANCE) {
            return None;
        }

        let kind = PowerUpKind::ALL[rng.gen_range(0..PowerUpKind::ALL.len())];
        let x = rng.gen_range(GAME_WIDTH * 0.25..GAME_WIDTH * 0.75);
        let y = rng.gen_range(GAME_HEIGHT * 0.25..GAME_HEIGHT * 0.75);
        Some(self.insert(kind, x, y, clock))
    }

    /// Places a power-up directly, bypassing the spawn roll.
    pub fn insert(&mut self, kind: PowerUpKind, x: f32, y: f32, clock: u64) -> &PowerUp {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.powerups.push(PowerUp {
            id,
            kind,
            x,
            y,
            active: true,
            expires_at: clock + POWERUP_LIFETIME_MS,
        });
        &self.powerups[self.powerups.len() - 1]
    }

    /// Marks the first power-up the ball touches as collected.
    pub fn collect(&mut self, ball: &BallState) -> Option<PowerUp> {
        let half = POWERUP_SIZE / 2.0;
        let hit = self
            .powerups
            .iter_mut()
            .find(|p| p.active && ball_overlaps_box(ball, p.x, p.y, half, half))?;
        hit.active = false;
        Some(hit.clone())
    }

    pub fn add_effect(&mut self, kind: PowerUpKind, target_id: u32, clock: u64) {
        self.effects.push(ActiveEffect {
            kind,
            target_id,
            expires_at: clock + POWERUP_DURATION_MS,
        });
    }

    /// Removes and returns every effect that has run out.
    pub fn take_expired(&mut self, clock: u64) -> Vec<ActiveEffect> {
        let (expired, remaining): (Vec<_>, Vec<_>) = self
            .effects
            .drain(..)
            .partition(|e| e.expires_at <= clock);
        self.effects = remaining;
        expired
    }

    /// Product of the active ball effects.
    pub fn ball_speed_modifier(&self) -> f32 {
        self.effects
            .iter()
            .filter(|e| e.kind.affects_ball())
            .map(|e| e.kind.multiplier())
            .product()
    }

    /// Product of the active paddle effects on one player.
    pub fn paddle_scale(&self, client_id: u32) -> f32 {
        self.effects
            .iter()
            .filter(|e| !e.kind.affects_ball() && e.target_id == client_id)
            .map(|e| e.kind.multiplier())
            .product()
    }

    pub fn clear(&mut self) {
        self.powerups.clear();
        self.effects.clear();
    }

    pub fn powerup_snapshots(&self) -> Vec<PowerUpSnapshot> {
        self.powerups
            .iter()
            .map(|p| PowerUpSnapshot {
                id: p.id,
                kind: p.kind,
                x: p.x,
                y: p.y,
                active: p.active,
            })
            .collect()
    }

    pub fn effect_snapshots(&self) -> Vec<EffectSnapshot> {
        self.effects
            .iter()
            .map(|e| EffectSnapshot {
                kind: e.kind,
                target_id: e.target_id,
                expires_at: e.expires_at,
            })
            .collect()
    }
}
