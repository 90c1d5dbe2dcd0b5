use serde::{Deserialize, Serialize};

use super::state::{DuelState, EntityRef, GameEvent, SideId, TargetRef, UnitId};

/// 效果作用对象，相对于效果来源方而言。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EffectTarget {
    /// 行动附带的目标，在敌方一侧解析。
    ChosenEnemy,
    /// 行动附带的目标，在己方一侧解析。
    ChosenFriendly,
    SourceSide,
    OpposingSide,
}

impl EffectTarget {
    pub fn is_chosen(self) -> bool {
        matches!(self, EffectTarget::ChosenEnemy | EffectTarget::ChosenFriendly)
    }

    pub fn resolve_side(self, ctx: &EffectContext, state: &DuelState) -> SideId {
        match self {
            EffectTarget::ChosenFriendly | EffectTarget::SourceSide => ctx.source_side,
            EffectTarget::ChosenEnemy | EffectTarget::OpposingSide => {
                state.opponent_of(ctx.source_side)
            }
        }
    }

    /// 解析为当前存在的英雄或随从；目标缺失或已失效时返回 `None`。
    pub fn resolve_entity(self, ctx: &EffectContext, state: &DuelState) -> Option<EntityRef> {
        let side = self.resolve_side(ctx, state);
        match self {
            EffectTarget::SourceSide | EffectTarget::OpposingSide => Some(EntityRef::Hero { side }),
            EffectTarget::ChosenEnemy | EffectTarget::ChosenFriendly => match ctx.target? {
                TargetRef::Hero => Some(EntityRef::Hero { side }),
                TargetRef::Unit { index } => {
                    if index < state.side(side).board.len() {
                        Some(EntityRef::Unit { side, index })
                    } else {
                        None
                    }
                }
            },
        }
    }
}

/// 由效果召唤（而非从手牌打出）的随从属性。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummonSpec {
    pub card_id: String,
    pub name: String,
    pub attack: i16,
    pub health: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectKind {
    Damage { amount: i16, target: EffectTarget },
    Heal { amount: i16, target: EffectTarget },
    Draw { count: u8, target: EffectTarget },
    AoeDamage { amount: i16, target: EffectTarget },
    Buff {
        attack: i16,
        health: i16,
        target: EffectTarget,
    },
    GainMana { amount: u8, target: EffectTarget },
    Summon { unit: SummonSpec, target: EffectTarget },
}

impl EffectKind {
    pub fn target(&self) -> EffectTarget {
        match self {
            EffectKind::Damage { target, .. }
            | EffectKind::Heal { target, .. }
            | EffectKind::Draw { target, .. }
            | EffectKind::AoeDamage { target, .. }
            | EffectKind::Buff { target, .. }
            | EffectKind::GainMana { target, .. }
            | EffectKind::Summon { target, .. } => *target,
        }
    }

    /// 对对局结算效果。生命值可能降到零或以下，阵亡移除交给清理阶段。
    pub fn apply(&self, ctx: &EffectContext, state: &mut DuelState) -> EffectResolution {
        let mut events = Vec::new();
        match self {
            EffectKind::Damage { amount, target } => {
                if let Some(entity) = target.resolve_entity(ctx, state) {
                    events.extend(state.damage_entity(entity, *amount));
                }
            }
            EffectKind::Heal { amount, target } => {
                if let Some(entity) = target.resolve_entity(ctx, state) {
                    events.extend(state.heal_entity(entity, *amount));
                }
            }
            EffectKind::Draw { count, target } => {
                let side = target.resolve_side(ctx, state);
                for _ in 0..*count {
                    events.extend(state.draw_card(side));
                }
            }
            EffectKind::AoeDamage { amount, target } => {
                let side = target.resolve_side(ctx, state);
                // 先固定数量，结算中途召唤的随从不受影响
                let affected = state.side(side).board.len();
                for index in 0..affected {
                    events.extend(state.damage_entity(EntityRef::Unit { side, index }, *amount));
                }
            }
            EffectKind::Buff {
                attack,
                health,
                target,
            } => {
                if let Some(EntityRef::Unit { side, index }) = target.resolve_entity(ctx, state) {
                    events.extend(state.buff_unit(side, index, *attack, *health));
                }
            }
            EffectKind::GainMana { amount, target } => {
                let side = target.resolve_side(ctx, state);
                events.extend(state.gain_mana(side, *amount));
            }
            EffectKind::Summon { unit, target } => {
                let side = target.resolve_side(ctx, state);
                match state.summon_unit(side, unit) {
                    Some(event) => events.push(event),
                    None => log::debug!(
                        "summon of {} suppressed: side {} board is full",
                        unit.card_id,
                        side
                    ),
                }
            }
        }
        EffectResolution { events }
    }
}

/// 卡牌附带的效果描述，以及是否需要玩家指定目标。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardEffect {
    pub kind: EffectKind,
    #[serde(default)]
    pub target_required: bool,
}

impl CardEffect {
    pub fn new(kind: EffectKind) -> Self {
        let target_required = kind.target().is_chosen();
        Self {
            kind,
            target_required,
        }
    }

    pub fn damage(amount: i16, target: EffectTarget) -> Self {
        Self::new(EffectKind::Damage { amount, target })
    }

    pub fn heal(amount: i16, target: EffectTarget) -> Self {
        Self::new(EffectKind::Heal { amount, target })
    }

    pub fn draw(count: u8) -> Self {
        Self::new(EffectKind::Draw {
            count,
            target: EffectTarget::SourceSide,
        })
    }

    pub fn aoe_damage(amount: i16) -> Self {
        Self::new(EffectKind::AoeDamage {
            amount,
            target: EffectTarget::OpposingSide,
        })
    }

    pub fn buff(attack: i16, health: i16) -> Self {
        Self::new(EffectKind::Buff {
            attack,
            health,
            target: EffectTarget::ChosenFriendly,
        })
    }

    pub fn gain_mana(amount: u8) -> Self {
        Self::new(EffectKind::GainMana {
            amount,
            target: EffectTarget::SourceSide,
        })
    }

    pub fn summon(unit: SummonSpec) -> Self {
        Self::new(EffectKind::Summon {
            unit,
            target: EffectTarget::SourceSide,
        })
    }

    pub fn apply(&self, ctx: &EffectContext, state: &mut DuelState) -> EffectResolution {
        self.kind.apply(ctx, state)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectContext {
    pub source_side: SideId,
    pub source_unit: Option<UnitId>,
    pub target: Option<TargetRef>,
}

impl EffectContext {
    pub fn new(source_side: SideId) -> Self {
        Self {
            source_side,
            source_unit: None,
            target: None,
        }
    }

    pub fn with_source_unit(mut self, unit_id: UnitId) -> Self {
        self.source_unit = Some(unit_id);
        self
    }

    pub fn with_target(mut self, target: Option<TargetRef>) -> Self {
        self.target = target;
        self
    }
}

#[derive(Default, Debug, Clone)]
pub struct EffectResolution {
    pub events: Vec<GameEvent>,
}

impl EffectResolution {
    pub fn extend(&mut self, mut other: EffectResolution) {
        self.events.append(&mut other.events);
    }
}
