//! 对战核心逻辑模块（卡牌目录、状态、效果、清理与规则引擎）。

pub mod catalog;
pub mod cleanup;
pub mod effects;
pub mod rules;
pub mod state;

pub use catalog::{
    catalog, Ability, CardCatalog, CardDefinition, CardId, CardKind, TavernMinion, Tribe,
    COIN_CARD_ID,
};
pub use cleanup::run_cleanup;
pub use effects::{
    CardEffect, EffectContext, EffectKind, EffectResolution, EffectTarget, SummonSpec,
};
pub use rules::{AttackAction, PlayCardAction, RuleEngine, RuleError, RuleResolution};
pub use state::{
    DuelOutcome, DuelState, DuelView, EntityRef, EventTarget, GameEvent, Hero, IntegrityError,
    Mana, SideId, SideState, SideView, TargetRef, UnitId, UnitInstance, Weapon, ZoneView,
    SIDE_COUNT,
};
