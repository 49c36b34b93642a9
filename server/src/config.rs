use crate::game::Rules;
use shared::{GameId, Namespace};

/// Settings shared by the lobby service and every game worker it launches.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub namespace: Namespace,
    pub rules: Rules,
    /// Upper bound on concurrently running games.
    pub max_games: usize,
}

impl ServerConfig {
    pub fn new(namespace: Namespace, rules: Rules, max_games: usize) -> Self {
        Self {
            namespace,
            rules,
            max_games,
        }
    }

    /// Command line that makes the server binary run as the worker of `game_id`.
    pub fn worker_args(&self, game_id: GameId) -> Vec<String> {
        vec![
            "--namespace".to_string(),
            self.namespace.as_str().to_string(),
            "--power".to_string(),
            self.rules.win_power.to_string(),
            "--double-tile-chance".to_string(),
            self.rules.spawn.double_chance().to_string(),
            "worker".to_string(),
            game_id.to_string(),
        ]
    }
}
