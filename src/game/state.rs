use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::catalog::{Ability, CardDefinition, CardId, CardKind};
use super::effects::{EffectKind, SummonSpec};
use crate::config::DuelConfig;

/// 对局中的座位编号，取值 `0` 或 `1`。
pub type SideId = u8;
/// 随从实例标识，在单局内唯一。
pub type UnitId = u32;

pub const SIDE_COUNT: usize = 2;

/// 玩家指定的目标：英雄或战场上的某个位置。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetRef {
    Hero,
    Unit { index: usize },
}

/// 已解析且当前有效的实体位置。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityRef {
    Hero { side: SideId },
    Unit { side: SideId, index: usize },
}

/// 事件流中使用的目标，不依赖战场位置。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventTarget {
    Hero { side: SideId },
    Unit { side: SideId, unit_id: UnitId },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hero {
    pub health: i16,
    #[serde(default)]
    pub armor: i16,
}

/// 法力水晶。`bonus` 为效果带来的一次性法力，优先于 `current` 消耗，
/// 在本方回合结束时清空。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mana {
    pub current: u8,
    pub max: u8,
    #[serde(default)]
    pub bonus: u8,
}

impl Mana {
    pub fn available(&self) -> u8 {
        self.current.saturating_add(self.bonus)
    }

    /// 调用前须确认 `available() >= cost`。
    fn spend(&mut self, cost: u8) {
        let from_bonus = cost.min(self.bonus);
        self.bonus -= from_bonus;
        self.current = self.current.saturating_sub(cost - from_bonus);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Weapon {
    pub card_id: CardId,
    pub name: String,
    pub attack: i16,
    pub durability: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitInstance {
    pub uid: UnitId,
    pub card_id: CardId,
    pub name: String,
    pub attack: i16,
    pub health: i16,
    pub max_health: i16,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub abilities: BTreeSet<Ability>,
    /// 已攻击过，或本回合入场且没有冲锋。
    #[serde(default)]
    pub acted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deathrattle: Option<EffectKind>,
}

impl UnitInstance {
    /// 由随从牌构造实例；法术和武器返回 `None`。
    pub fn from_definition(uid: UnitId, card: &CardDefinition) -> Option<Self> {
        let CardKind::Unit {
            attack,
            health,
            deathrattle,
            ..
        } = &card.kind
        else {
            return None;
        };
        Some(Self {
            uid,
            card_id: card.id.clone(),
            name: card.name.clone(),
            attack: *attack,
            health: *health,
            max_health: *health,
            abilities: card.abilities.clone(),
            acted: !card.has(Ability::Charge),
            deathrattle: deathrattle.as_ref().map(|effect| effect.kind.clone()),
        })
    }

    pub fn from_summon(uid: UnitId, spec: &SummonSpec) -> Self {
        Self {
            uid,
            card_id: spec.card_id.clone(),
            name: spec.name.clone(),
            attack: spec.attack,
            health: spec.health,
            max_health: spec.health,
            abilities: BTreeSet::new(),
            acted: true,
            deathrattle: None,
        }
    }

    pub fn has(&self, ability: Ability) -> bool {
        self.abilities.contains(&ability)
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SideState {
    /// 按抽牌顺序。
    #[serde(default)]
    pub hand: Vec<CardDefinition>,
    /// 按入场顺序。
    #[serde(default)]
    pub board: Vec<UnitInstance>,
    /// 向量首元素即牌库顶。
    #[serde(default)]
    pub deck: Vec<CardDefinition>,
    pub hero: Hero,
    pub mana: Mana,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon: Option<Weapon>,
    #[serde(default)]
    pub fatigue: u8,
}

impl SideState {
    pub fn new(deck: Vec<CardDefinition>, starting_health: i16) -> Self {
        Self {
            hand: Vec::new(),
            board: Vec::new(),
            deck,
            hero: Hero {
                health: starting_health,
                armor: 0,
            },
            mana: Mana {
                current: 1,
                max: 1,
                bonus: 0,
            },
            weapon: None,
            fatigue: 0,
        }
    }

    pub fn has_taunt(&self) -> bool {
        self.board.iter().any(|unit| unit.has(Ability::Taunt))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DuelOutcome {
    Winner { side: SideId },
    Draw,
}

impl DuelOutcome {
    pub fn winner(&self) -> Option<SideId> {
        match self {
            DuelOutcome::Winner { side } => Some(*side),
            DuelOutcome::Draw => None,
        }
    }
}

/// 游戏事件流，按发生顺序排列。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    TurnStarted {
        side: SideId,
        turn: u32,
    },
    CardDrawn {
        side: SideId,
        card_id: CardId,
    },
    CardBurned {
        side: SideId,
        card_id: CardId,
    },
    FatigueDamage {
        side: SideId,
        amount: i16,
    },
    CardPlayed {
        side: SideId,
        card_id: CardId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<TargetRef>,
    },
    UnitEntered {
        side: SideId,
        unit_id: UnitId,
        card_id: CardId,
    },
    WeaponEquipped {
        side: SideId,
        card_id: CardId,
    },
    AttackDeclared {
        side: SideId,
        attacker: UnitId,
        target: EventTarget,
    },
    DamageDealt {
        target: EventTarget,
        amount: i16,
    },
    ShieldPopped {
        side: SideId,
        unit_id: UnitId,
    },
    Healed {
        target: EventTarget,
        amount: i16,
    },
    Buffed {
        side: SideId,
        unit_id: UnitId,
        attack: i16,
        health: i16,
    },
    ManaGained {
        side: SideId,
        amount: u8,
    },
    UnitSummoned {
        side: SideId,
        unit_id: UnitId,
        card_id: CardId,
    },
    UnitDied {
        side: SideId,
        unit_id: UnitId,
        card_id: CardId,
    },
    TurnEnded {
        side: SideId,
    },
    DuelEnded {
        outcome: DuelOutcome,
    },
}

impl GameEvent {
    /// 对手的抽牌对该视角不可见，其余事件公开。
    pub fn is_visible_to(&self, viewer: SideId) -> bool {
        !matches!(self, GameEvent::CardDrawn { side, .. } if *side != viewer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntegrityError {
    ManaOutOfRange { side: SideId, current: u8, max: u8 },
    BoardOverflow { side: SideId, size: usize },
    HandOverflow { side: SideId, size: usize },
    DeadUnitOnBoard { side: SideId, unit_id: UnitId },
}

/// 可能对观察者隐藏内容的区域。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum ZoneView {
    Revealed { cards: Vec<CardDefinition> },
    Hidden { count: usize },
}

impl ZoneView {
    pub fn len(&self) -> usize {
        match self {
            ZoneView::Revealed { cards } => cards.len(),
            ZoneView::Hidden { count } => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SideView {
    pub hand: ZoneView,
    pub deck: ZoneView,
    pub board: Vec<UnitInstance>,
    pub hero: Hero,
    pub mana: Mana,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon: Option<Weapon>,
    pub fatigue: u8,
}

impl SideView {
    fn of(side: &SideState, revealed: bool) -> Self {
        let (hand, deck) = if revealed {
            (
                ZoneView::Revealed {
                    cards: side.hand.clone(),
                },
                ZoneView::Revealed {
                    cards: side.deck.clone(),
                },
            )
        } else {
            (
                ZoneView::Hidden {
                    count: side.hand.len(),
                },
                ZoneView::Hidden {
                    count: side.deck.len(),
                },
            )
        };
        Self {
            hand,
            deck,
            board: side.board.clone(),
            hero: side.hero.clone(),
            mana: side.mana.clone(),
            weapon: side.weapon.clone(),
            fatigue: side.fatigue,
        }
    }
}

/// 某一方可见的对局快照。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuelView {
    pub viewer: SideId,
    pub active_side: SideId,
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DuelOutcome>,
    pub sides: [SideView; SIDE_COUNT],
}

/// 单局对战的权威状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuelState {
    pub sides: [SideState; SIDE_COUNT],
    pub active_side: SideId,
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DuelOutcome>,
    #[serde(default)]
    pub next_unit_id: UnitId,
    #[serde(default)]
    pub config: DuelConfig,
}

impl DuelState {
    pub fn new(decks: [Vec<CardDefinition>; SIDE_COUNT], active_side: SideId, config: DuelConfig) -> Self {
        let health = config.starting_health;
        let [first, second] = decks;
        Self {
            sides: [SideState::new(first, health), SideState::new(second, health)],
            active_side,
            turn: 1,
            outcome: None,
            next_unit_id: 1,
            config,
        }
    }

    pub fn side(&self, side: SideId) -> &SideState {
        &self.sides[usize::from(side)]
    }

    pub fn side_mut(&mut self, side: SideId) -> &mut SideState {
        &mut self.sides[usize::from(side)]
    }

    pub fn opponent_of(&self, side: SideId) -> SideId {
        1 - side.min(1)
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn allocate_unit_id(&mut self) -> UnitId {
        let uid = self.next_unit_id;
        self.next_unit_id += 1;
        uid
    }

    fn event_target(&self, entity: EntityRef) -> Option<EventTarget> {
        match entity {
            EntityRef::Hero { side } => Some(EventTarget::Hero { side }),
            EntityRef::Unit { side, index } => self
                .side(side)
                .board
                .get(index)
                .map(|unit| EventTarget::Unit {
                    side,
                    unit_id: unit.uid,
                }),
        }
    }

    /// 从牌库顶抽一张牌。牌库为空时造成递增的疲劳伤害，手牌已满时该牌被烧毁。
    pub fn draw_card(&mut self, side: SideId) -> Vec<GameEvent> {
        let max_hand_size = self.config.max_hand_size;
        let state = self.side_mut(side);

        if state.deck.is_empty() {
            state.fatigue = state.fatigue.saturating_add(1);
            let amount = i16::from(state.fatigue);
            state.hero.health -= amount;
            return vec![GameEvent::FatigueDamage { side, amount }];
        }

        let card = state.deck.remove(0);
        let card_id = card.id.clone();
        if state.hand.len() >= max_hand_size {
            vec![GameEvent::CardBurned { side, card_id }]
        } else {
            state.hand.push(card);
            vec![GameEvent::CardDrawn { side, card_id }]
        }
    }

    pub fn damage_entity(&mut self, entity: EntityRef, amount: i16) -> Vec<GameEvent> {
        if amount <= 0 {
            return Vec::new();
        }
        let Some(target) = self.event_target(entity) else {
            return Vec::new();
        };

        match entity {
            EntityRef::Hero { side } => {
                let hero = &mut self.side_mut(side).hero;
                let absorbed = amount.min(hero.armor.max(0));
                hero.armor -= absorbed;
                hero.health -= amount - absorbed;
                vec![GameEvent::DamageDealt { target, amount }]
            }
            EntityRef::Unit { side, index } => {
                let Some(unit) = self.side_mut(side).board.get_mut(index) else {
                    return Vec::new();
                };
                if unit.abilities.remove(&Ability::DivineShield) {
                    return vec![GameEvent::ShieldPopped {
                        side,
                        unit_id: unit.uid,
                    }];
                }
                unit.health -= amount;
                vec![GameEvent::DamageDealt { target, amount }]
            }
        }
    }

    pub fn heal_entity(&mut self, entity: EntityRef, amount: i16) -> Option<GameEvent> {
        if amount <= 0 {
            return None;
        }
        let target = self.event_target(entity)?;
        let hero_cap = self.config.starting_health;

        let (health, cap) = match entity {
            EntityRef::Hero { side } => (&mut self.side_mut(side).hero.health, hero_cap),
            EntityRef::Unit { side, index } => {
                let unit = self.side_mut(side).board.get_mut(index)?;
                (&mut unit.health, unit.max_health)
            }
        };
        let before = *health;
        *health = health.saturating_add(amount).min(cap.max(before));
        let restored = *health - before;
        (restored > 0).then_some(GameEvent::Healed {
            target,
            amount: restored,
        })
    }

    pub fn buff_unit(
        &mut self,
        side: SideId,
        index: usize,
        attack: i16,
        health: i16,
    ) -> Option<GameEvent> {
        let unit = self.side_mut(side).board.get_mut(index)?;
        unit.attack += attack;
        unit.health += health;
        unit.max_health += health;
        Some(GameEvent::Buffed {
            side,
            unit_id: unit.uid,
            attack,
            health,
        })
    }

    /// 获得一次性法力，不提高上限，可用总量也不超过法力上限。
    pub fn gain_mana(&mut self, side: SideId, amount: u8) -> Option<GameEvent> {
        let ceiling = self.config.max_mana;
        let mana = &mut self.side_mut(side).mana;
        let room = ceiling.saturating_sub(mana.available());
        let gained = amount.min(room);
        if gained == 0 {
            return None;
        }
        mana.bonus += gained;
        Some(GameEvent::ManaGained {
            side,
            amount: gained,
        })
    }

    /// 将召唤的随从放到战场末尾；战场已满时返回 `None`。
    pub fn summon_unit(&mut self, side: SideId, spec: &SummonSpec) -> Option<GameEvent> {
        if self.side(side).board.len() >= self.config.max_board_size {
            return None;
        }
        let uid = self.allocate_unit_id();
        let unit = UnitInstance::from_summon(uid, spec);
        let card_id = unit.card_id.clone();
        self.side_mut(side).board.push(unit);
        Some(GameEvent::UnitSummoned {
            side,
            unit_id: uid,
            card_id,
        })
    }

    pub(crate) fn spend_mana(&mut self, side: SideId, cost: u8) {
        self.side_mut(side).mana.spend(cost);
    }

    /// 英雄阵亡后判定胜负，仅在首次确定结果时返回结束事件。
    pub fn evaluate_outcome(&mut self) -> Option<GameEvent> {
        if self.outcome.is_some() {
            return None;
        }
        let fallen: Vec<bool> = self.sides.iter().map(|s| s.hero.health <= 0).collect();
        let outcome = match (fallen[0], fallen[1]) {
            (true, true) => DuelOutcome::Draw,
            (true, false) => DuelOutcome::Winner { side: 1 },
            (false, true) => DuelOutcome::Winner { side: 0 },
            (false, false) => return None,
        };
        self.outcome = Some(outcome);
        Some(GameEvent::DuelEnded { outcome })
    }

    /// 判 `side` 认输（例如离开对局），另一方获胜。
    pub fn forfeit(&mut self, side: SideId) -> Option<GameEvent> {
        if self.outcome.is_some() {
            return None;
        }
        let outcome = DuelOutcome::Winner {
            side: self.opponent_of(side),
        };
        self.outcome = Some(outcome);
        Some(GameEvent::DuelEnded { outcome })
    }

    /// 对手的手牌和牌库只保留数量。
    pub fn view_for(&self, viewer: SideId) -> DuelView {
        let sides = [
            SideView::of(&self.sides[0], viewer == 0),
            SideView::of(&self.sides[1], viewer == 1),
        ];
        DuelView {
            viewer,
            active_side: self.active_side,
            turn: self.turn,
            outcome: self.outcome,
            sides,
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        for (index, state) in self.sides.iter().enumerate() {
            let side = index as SideId;
            let mana = &state.mana;
            if mana.current > mana.max || mana.max > self.config.max_mana {
                return Err(IntegrityError::ManaOutOfRange {
                    side,
                    current: mana.current,
                    max: mana.max,
                });
            }
            if state.board.len() > self.config.max_board_size {
                return Err(IntegrityError::BoardOverflow {
                    side,
                    size: state.board.len(),
                });
            }
            if state.hand.len() > self.config.max_hand_size {
                return Err(IntegrityError::HandOverflow {
                    side,
                    size: state.hand.len(),
                });
            }
            if let Some(unit) = state.board.iter().find(|unit| unit.is_dead()) {
                return Err(IntegrityError::DeadUnitOnBoard {
                    side,
                    unit_id: unit.uid,
                });
            }
        }
        Ok(())
    }
}
