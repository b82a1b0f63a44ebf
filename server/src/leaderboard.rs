//! In-memory leaderboard fed by finished matches

use crate::game::MatchResult;
use log::info;
use shared::{LeaderboardEntry, Ranking};
use std::collections::HashMap;

/// Upper bound on entries in one reply, so it fits a single datagram.
pub const MAX_LEADERBOARD_ENTRIES: usize = 20;
/// Games needed before a player shows up in the win-rate ranking.
pub const MIN_GAMES_FOR_WIN_RATE: u32 = 5;
const MAX_KEY_LEN: usize = 50;

/// Normalizes a display name into the key its stats are stored under.
pub fn leaderboard_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        let c = if c.is_whitespace() || "/.#$[]".contains(c) {
            '_'
        } else {
            c
        };
        if c == '_' && key.ends_with('_') {
            continue;
        }
        key.push(c);
    }

    let key: String = key.trim_matches('_').chars().take(MAX_KEY_LEN).collect();
    if key.is_empty() {
        "anonymous".to_string()
    } else {
        key
    }
}

fn win_rate(wins: u32, total: u32) -> u32 {
    if total == 0 {
        0
    } else {
        (wins as f64 / total as f64 * 100.0).round() as u32
    }
}

#[derive(Debug, Default)]
pub struct Leaderboard {
    entries: HashMap<String, LeaderboardEntry>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, name: &str) -> Option<&LeaderboardEntry> {
        self.entries.get(&leaderboard_key(name))
    }

    fn entry_mut(&mut self, name: &str) -> &mut LeaderboardEntry {
        self.entries
            .entry(leaderboard_key(name))
            .or_insert_with(|| LeaderboardEntry {
                player_name: name.to_string(),
                wins: 0,
                losses: 0,
                total_games: 0,
                win_rate: 0,
                last_played: 0,
            })
    }

    pub fn record(&mut self, result: &MatchResult) {
        let winner = self.entry_mut(&result.winner_name);
        winner.wins += 1;
        winner.total_games += 1;
        winner.win_rate = win_rate(winner.wins, winner.total_games);
        winner.last_played = result.timestamp;

        let loser = self.entry_mut(&result.loser_name);
        loser.losses += 1;
        loser.total_games += 1;
        loser.win_rate = win_rate(loser.wins, loser.total_games);
        loser.last_played = result.timestamp;

        info!(
            "Recorded game: {} beat {} ({} - {})",
            result.winner_name, result.loser_name, result.winner_score, result.loser_score
        );
    }

    pub fn top(&self, ranking: Ranking, limit: usize) -> Vec<LeaderboardEntry> {
        let limit = limit.min(MAX_LEADERBOARD_ENTRIES);
        let mut entries: Vec<&LeaderboardEntry> = match ranking {
            Ranking::Wins => self.entries.values().collect(),
            Ranking::WinRate => self
                .entries
                .values()
                .filter(|e| e.total_games >= MIN_GAMES_FOR_WIN_RATE)
                .collect(),
        };

        entries.sort_by(|a, b| {
            let primary = match ranking {
                Ranking::Wins => b.wins.cmp(&a.wins),
                Ranking::WinRate => b.win_rate.cmp(&a.win_rate).then(b.wins.cmp(&a.wins)),
            };
            primary.then_with(|| a.player_name.cmp(&b.player_name))
        });

        entries.into_iter().take(limit).cloned().collect()
    }
}
