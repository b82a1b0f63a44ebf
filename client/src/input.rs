//! Keyboard input with change detection and edge-triggered toggles

use crate::game::Controls;
use macroquad::prelude::{is_key_down, KeyCode};
use shared::Direction;
use std::time::{Duration, Instant};

/// How often an unchanged direction is sent again, so a lost datagram does
/// not leave the paddle stuck.
pub const INPUT_RESEND_INTERVAL: Duration = Duration::from_millis(250);

/// Raw key states for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KeySample {
    pub w: bool,
    pub s: bool,
    pub up: bool,
    pub down: bool,
    pub offline: bool,
    pub reconnect: bool,
    pub leaderboard: bool,
    pub ranking: bool,
}

impl KeySample {
    pub fn read() -> Self {
        Self {
            w: is_key_down(KeyCode::W),
            s: is_key_down(KeyCode::S),
            up: is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::Down),
            offline: is_key_down(KeyCode::O),
            reconnect: is_key_down(KeyCode::R),
            leaderboard: is_key_down(KeyCode::L),
            ranking: is_key_down(KeyCode::Tab),
        }
    }
}

/// Keys pressed this frame (not held).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggles {
    pub offline: bool,
    pub reconnect: bool,
    pub leaderboard: bool,
    pub ranking: bool,
}

pub struct InputManager {
    last_direction: Direction,
    last_sent: Option<Instant>,
    prev: KeySample,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            last_direction: Direction::Stop,
            last_sent: None,
            prev: KeySample::default(),
        }
    }

    pub fn update(&mut self) -> (Toggles, Controls, Option<Direction>) {
        self.process(KeySample::read(), Instant::now())
    }

    /// Turns one frame of key states into toggles, paddle controls and the
    /// direction to send to the server, if any.
    pub fn process(
        &mut self,
        keys: KeySample,
        now: Instant,
    ) -> (Toggles, Controls, Option<Direction>) {
        let toggles = Toggles {
            offline: keys.offline && !self.prev.offline,
            reconnect: keys.reconnect && !self.prev.reconnect,
            leaderboard: keys.leaderboard && !self.prev.leaderboard,
            ranking: keys.ranking && !self.prev.ranking,
        };
        self.prev = keys;

        let controls = Controls {
            local: Direction::from_keys(keys.w || keys.up, keys.s || keys.down),
            left: Direction::from_keys(keys.w, keys.s),
            right: Direction::from_keys(keys.up, keys.down),
        };

        let changed = controls.local != self.last_direction;
        let resend_due = self
            .last_sent
            .map_or(true, |sent| now.duration_since(sent) >= INPUT_RESEND_INTERVAL);

        let to_send = if changed || resend_due {
            self.last_direction = controls.local;
            self.last_sent = Some(now);
            Some(controls.local)
        } else {
            None
        };

        (toggles, controls, to_send)
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_fire_once_per_press() {
        let mut input = InputManager::new();
        let now = Instant::now();
        let pressed = KeySample {
            offline: true,
            ..Default::default()
        };

        let (toggles, _, _) = input.process(pressed, now);
        assert!(toggles.offline);
        let (toggles, _, _) = input.process(pressed, now);
        assert!(!toggles.offline);
        input.process(KeySample::default(), now);
        let (toggles, _, _) = input.process(pressed, now);
        assert!(toggles.offline);
        assert!(!toggles.reconnect);
    }

    #[test]
    fn test_controls_mapping() {
        let mut input = InputManager::new();
        let keys = KeySample {
            w: true,
            down: true,
            ..Default::default()
        };
        let (_, controls, _) = input.process(keys, Instant::now());
        assert_eq!(controls.left, Direction::Up);
        assert_eq!(controls.right, Direction::Down);
        // Both keys sets pressed in opposite directions cancel out.
        assert_eq!(controls.local, Direction::Stop);
    }

    #[test]
    fn test_direction_sent_on_change_and_resend() {
        let mut input = InputManager::new();
        let start = Instant::now();
        let up = KeySample {
            up: true,
            ..Default::default()
        };

        let (_, _, sent) = input.process(up, start);
        assert_eq!(sent, Some(Direction::Up));

        let (_, _, sent) = input.process(up, start + Duration::from_millis(16));
        assert_eq!(sent, None);

        let (_, _, sent) = input.process(KeySample::default(), start + Duration::from_millis(32));
        assert_eq!(sent, Some(Direction::Stop));

        let (_, _, sent) = input.process(
            KeySample::default(),
            start + Duration::from_millis(32) + INPUT_RESEND_INTERVAL,
        );
        assert_eq!(sent, Some(Direction::Stop));
    }
}
