use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::opponent::generate_opponent_roster;
use crate::game::TavernMinion;

/// 行动方用最强存活随从攻击的概率。
pub const ATTACKER_FOCUS_CHANCE: f64 = 0.8;
/// 攻击落在最弱存活防守者上的概率。
pub const DEFENDER_FOCUS_CHANCE: f64 = 0.7;
/// 双方都有存活随从时允许的最大交换次数。
pub const MAX_COMBAT_STEPS: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CombatUnit {
    #[serde(default)]
    pub card_id: String,
    pub name: String,
    pub attack: i16,
    pub health: i16,
    #[serde(default)]
    pub max_health: i16,
    pub tier: u8,
    #[serde(default)]
    pub dead: bool,
}

impl CombatUnit {
    pub fn from_tavern(minion: &TavernMinion) -> Self {
        Self {
            card_id: minion.id.clone(),
            name: minion.name.clone(),
            attack: minion.attack,
            health: minion.health,
            max_health: minion.health,
            tier: minion.tier,
            dead: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.dead && self.health > 0
    }

    fn normalized(&self) -> Self {
        let mut unit = self.clone();
        unit.max_health = unit.max_health.max(unit.health);
        unit.dead = !self.is_alive();
        unit
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CombatSide {
    Player,
    Opponent,
}

impl CombatSide {
    pub fn other(self) -> Self {
        match self {
            CombatSide::Player => CombatSide::Opponent,
            CombatSide::Opponent => CombatSide::Player,
        }
    }

    fn slot(self) -> usize {
        match self {
            CombatSide::Player => 0,
            CombatSide::Opponent => 1,
        }
    }
}

/// 以玩家视角表示的战斗结果。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BattleResult {
    Win,
    Loss,
    Tie,
}

/// 回放记录，下标对应传入时的阵容顺序。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CombatEvent {
    AttackDeclared {
        step: u32,
        side: CombatSide,
        attacker: usize,
        defender: usize,
    },
    DamageApplied {
        side: CombatSide,
        index: usize,
        amount: i16,
        remaining: i16,
    },
    UnitDied {
        side: CombatSide,
        index: usize,
    },
    StepLimitReached {
        steps: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CombatReport {
    /// 仅用于显示。
    pub round: u32,
    pub result: BattleResult,
    pub damage: u32,
    /// 某方阵容一开始为空、没有发生交换时为 `None`。
    pub first_attacker: Option<CombatSide>,
    pub steps: u32,
    pub capped: bool,
    pub events: Vec<CombatEvent>,
    pub player: Vec<CombatUnit>,
    pub opponent: Vec<CombatUnit>,
}

impl CombatReport {
    /// 玩家在本场战斗中损失的生命值，胜利或平局为零。
    pub fn health_change(&self) -> i32 {
        match self.result {
            BattleResult::Loss => -(self.damage as i32),
            BattleResult::Win | BattleResult::Tie => 0,
        }
    }
}

/// 基于阵容快照副本结算自走棋战斗。
pub struct CombatResolver {
    rng: SmallRng,
}

impl Default for CombatResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CombatResolver {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn resolve(
        &mut self,
        round: u32,
        player: &[CombatUnit],
        opponent: &[CombatUnit],
    ) -> CombatReport {
        let mut rosters = [
            player.iter().map(CombatUnit::normalized).collect::<Vec<_>>(),
            opponent.iter().map(CombatUnit::normalized).collect::<Vec<_>>(),
        ];
        let mut events = Vec::new();
        let mut steps = 0;
        let mut capped = false;
        let mut first_attacker = None;

        if has_living(&rosters[0]) && has_living(&rosters[1]) {
            let mut acting = if self.rng.gen_bool(0.5) {
                CombatSide::Player
            } else {
                CombatSide::Opponent
            };
            first_attacker = Some(acting);

            while has_living(&rosters[0]) && has_living(&rosters[1]) {
                if steps >= MAX_COMBAT_STEPS {
                    log::warn!("round {round}: combat called after {steps} exchanges");
                    events.push(CombatEvent::StepLimitReached { steps });
                    capped = true;
                    break;
                }
                steps += 1;
                self.exchange(&mut rosters, acting, steps, &mut events);
                acting = acting.other();
            }
        }

        let (result, damage) = settle(&rosters);
        log::debug!("round {round}: {result:?} for {damage} after {steps} exchanges");
        let [player, opponent] = rosters;
        CombatReport {
            round,
            result,
            damage,
            first_attacker,
            steps,
            capped,
            events,
            player,
            opponent,
        }
    }

    /// 为 `round` 生成对手阵容并与玩家阵容战斗。
    pub fn resolve_against_generated(&mut self, round: u32, player: &[CombatUnit]) -> CombatReport {
        let opponent = generate_opponent_roster(round, &mut self.rng);
        self.resolve(round, player, &opponent)
    }

    fn exchange(
        &mut self,
        rosters: &mut [Vec<CombatUnit>; 2],
        acting: CombatSide,
        step: u32,
        events: &mut Vec<CombatEvent>,
    ) {
        let defending = acting.other();
        let (Some(attacker), Some(defender)) = (
            self.pick_attacker(&rosters[acting.slot()]),
            self.pick_defender(&rosters[defending.slot()]),
        ) else {
            return;
        };
        events.push(CombatEvent::AttackDeclared {
            step,
            side: acting,
            attacker,
            defender,
        });

        let dealt = rosters[acting.slot()][attacker].attack.max(1);
        let returned = rosters[defending.slot()][defender].attack.max(1);
        for (side, index, amount) in [(defending, defender, dealt), (acting, attacker, returned)] {
            let unit = &mut rosters[side.slot()][index];
            unit.health -= amount;
            events.push(CombatEvent::DamageApplied {
                side,
                index,
                amount,
                remaining: unit.health,
            });
        }
        for (side, index) in [(defending, defender), (acting, attacker)] {
            let unit = &mut rosters[side.slot()][index];
            if unit.health <= 0 {
                unit.dead = true;
                events.push(CombatEvent::UnitDied { side, index });
            }
        }
    }

    fn pick_attacker(&mut self, roster: &[CombatUnit]) -> Option<usize> {
        let living = living_indices(roster);
        if self.rng.gen_bool(ATTACKER_FOCUS_CHANCE) {
            // 平局时取第一个
            living
                .iter()
                .copied()
                .max_by_key(|&index| (roster[index].attack, std::cmp::Reverse(index)))
        } else {
            living.choose(&mut self.rng).copied()
        }
    }

    fn pick_defender(&mut self, roster: &[CombatUnit]) -> Option<usize> {
        let living = living_indices(roster);
        if self.rng.gen_bool(DEFENDER_FOCUS_CHANCE) {
            living
                .iter()
                .copied()
                .min_by_key(|&index| roster[index].health)
        } else {
            living.choose(&mut self.rng).copied()
        }
    }
}

fn living_indices(roster: &[CombatUnit]) -> Vec<usize> {
    roster
        .iter()
        .enumerate()
        .filter(|(_, unit)| unit.is_alive())
        .map(|(index, _)| index)
        .collect()
}

fn has_living(roster: &[CombatUnit]) -> bool {
    roster.iter().any(CombatUnit::is_alive)
}

fn living_weight(roster: &[CombatUnit]) -> u32 {
    roster
        .iter()
        .filter(|unit| unit.is_alive())
        .map(|unit| u32::from(unit.tier))
        .sum()
}

fn settle(rosters: &[Vec<CombatUnit>; 2]) -> (BattleResult, u32) {
    match (has_living(&rosters[0]), has_living(&rosters[1])) {
        (true, false) => (BattleResult::Win, living_weight(&rosters[0])),
        (false, true) => (BattleResult::Loss, living_weight(&rosters[1])),
        _ => (BattleResult::Tie, 0),
    }
}
