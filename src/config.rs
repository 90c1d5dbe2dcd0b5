//! 对局参数，注册表内所有会话共享。

use serde::{Deserialize, Serialize};

const DEFAULT_STARTING_HEALTH: i16 = 30;
const DEFAULT_MAX_MANA: u8 = 10;
const DEFAULT_MAX_BOARD_SIZE: usize = 7;
const DEFAULT_MAX_HAND_SIZE: usize = 10;
const DEFAULT_FIRST_HAND_SIZE: usize = 3;
const DEFAULT_SECOND_HAND_SIZE: usize = 4;
const DEFAULT_CLEANUP_ITERATION_LIMIT: u32 = 64;
const DEFAULT_GRACE_PERIOD_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DuelConfig {
    /// 英雄初始生命值，也是治疗上限。
    pub starting_health: i16,
    pub max_mana: u8,
    pub max_board_size: usize,
    pub max_hand_size: usize,
    pub first_hand_size: usize,
    pub second_hand_size: usize,
    /// 单次清理允许的最大清扫轮数。
    pub cleanup_iteration_limit: u32,
    /// 会话结束后保留多久再被清除。
    pub grace_period_ms: u64,
}

impl DuelConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            starting_health: DEFAULT_STARTING_HEALTH,
            max_mana: DEFAULT_MAX_MANA,
            max_board_size: DEFAULT_MAX_BOARD_SIZE,
            max_hand_size: DEFAULT_MAX_HAND_SIZE,
            first_hand_size: DEFAULT_FIRST_HAND_SIZE,
            second_hand_size: DEFAULT_SECOND_HAND_SIZE,
            cleanup_iteration_limit: DEFAULT_CLEANUP_ITERATION_LIMIT,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = DuelConfig::from_json(r#"{ "starting_health": 20 }"#)
            .expect("partial config should parse");
        assert_eq!(config.starting_health, 20);
        assert_eq!(config.max_board_size, 7);
        assert_eq!(config.max_mana, 10);
        assert_eq!(config.grace_period_ms, 60_000);
    }

    #[test]
    fn malformed_config_is_reported() {
        assert!(DuelConfig::from_json("{ not json").is_err());
    }
}
