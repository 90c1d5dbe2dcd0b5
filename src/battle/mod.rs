//! 自走棋战斗：基于阵容快照的加权随机交换。

pub mod combat;
pub mod opponent;

pub use combat::{
    BattleResult, CombatEvent, CombatReport, CombatResolver, CombatSide, CombatUnit,
    ATTACKER_FOCUS_CHANCE, DEFENDER_FOCUS_CHANCE, MAX_COMBAT_STEPS,
};
pub use opponent::{generate_opponent_roster, max_tier, roster_size, MAX_ROSTER_SIZE};
