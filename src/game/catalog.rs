//! 静态卡牌注册表，定义只构建一次且不再修改。

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::effects::{CardEffect, EffectTarget, SummonSpec};
use super::rules::RuleError;

pub type CardId = String;

/// 后手方获得的零费幸运币标识。
pub const COIN_CARD_ID: &str = "the_coin";

static CATALOG: Lazy<CardCatalog> = Lazy::new(CardCatalog::basic);

/// 进程级卡牌目录，所有会话只读共享。
pub fn catalog() -> &'static CardCatalog {
    &CATALOG
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Battlecry,
    Deathrattle,
    Charge,
    Taunt,
    DivineShield,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardKind {
    Unit {
        attack: i16,
        health: i16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        battlecry: Option<CardEffect>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deathrattle: Option<CardEffect>,
    },
    Spell {
        effect: CardEffect,
    },
    Weapon {
        attack: i16,
        durability: u8,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardDefinition {
    pub id: CardId,
    pub name: String,
    pub cost: u8,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub abilities: BTreeSet<Ability>,
    pub kind: CardKind,
}

impl CardDefinition {
    pub fn unit(id: &str, name: &str, cost: u8, attack: i16, health: i16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cost,
            abilities: BTreeSet::new(),
            kind: CardKind::Unit {
                attack,
                health,
                battlecry: None,
                deathrattle: None,
            },
        }
    }

    pub fn spell(id: &str, name: &str, cost: u8, effect: CardEffect) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cost,
            abilities: BTreeSet::new(),
            kind: CardKind::Spell { effect },
        }
    }

    pub fn weapon(id: &str, name: &str, cost: u8, attack: i16, durability: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cost,
            abilities: BTreeSet::new(),
            kind: CardKind::Weapon { attack, durability },
        }
    }

    pub fn with_ability(mut self, ability: Ability) -> Self {
        self.abilities.insert(ability);
        self
    }

    /// 为随从牌附加战吼，其他类型不受影响。
    pub fn with_battlecry(mut self, effect: CardEffect) -> Self {
        if let CardKind::Unit { battlecry, .. } = &mut self.kind {
            *battlecry = Some(effect);
            self.abilities.insert(Ability::Battlecry);
        }
        self
    }

    /// 为随从牌附加亡语，其他类型不受影响。
    pub fn with_deathrattle(mut self, effect: CardEffect) -> Self {
        if let CardKind::Unit { deathrattle, .. } = &mut self.kind {
            *deathrattle = Some(effect);
            self.abilities.insert(Ability::Deathrattle);
        }
        self
    }

    pub fn has(&self, ability: Ability) -> bool {
        self.abilities.contains(&ability)
    }

    pub fn is_unit(&self) -> bool {
        matches!(self.kind, CardKind::Unit { .. })
    }

    /// 打出时结算的效果（如有）。
    pub fn on_play_effect(&self) -> Option<&CardEffect> {
        match &self.kind {
            CardKind::Unit { battlecry, .. } => battlecry.as_ref(),
            CardKind::Spell { effect } => Some(effect),
            CardKind::Weapon { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tribe {
    Beast,
    Demon,
    Dragon,
    Mech,
    Murloc,
}

/// 酒馆提供的自走棋随从，`tier` 同时作为战斗伤害权重。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TavernMinion {
    pub id: CardId,
    pub name: String,
    pub attack: i16,
    pub health: i16,
    pub tier: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tribe: Option<Tribe>,
}

pub struct CardCatalog {
    cards: HashMap<CardId, CardDefinition>,
    tavern: Vec<TavernMinion>,
    presets: HashMap<&'static str, Vec<CardId>>,
}

impl CardCatalog {
    pub fn get(&self, id: &str) -> Option<&CardDefinition> {
        self.cards.get(id)
    }

    pub fn cards(&self) -> impl Iterator<Item = &CardDefinition> {
        self.cards.values()
    }

    /// 将有序的卡牌标识列表映射为卡牌定义，遇到未知标识立即返回错误。
    pub fn resolve_deck(&self, ids: &[CardId]) -> Result<Vec<CardDefinition>, RuleError> {
        ids.iter()
            .map(|id| {
                self.get(id).cloned().ok_or_else(|| RuleError::UnknownCard {
                    card_id: id.clone(),
                })
            })
            .collect()
    }

    pub fn coin(&self) -> CardDefinition {
        self.get(COIN_CARD_ID)
            .cloned()
            .unwrap_or_else(coin_definition)
    }

    pub fn preset_deck(&self, name: &str) -> Option<&[CardId]> {
        self.presets.get(name).map(Vec::as_slice)
    }

    pub fn tavern_minions(&self) -> &[TavernMinion] {
        &self.tavern
    }

    pub fn tavern_tier(&self, tier: u8) -> Vec<&TavernMinion> {
        self.tavern.iter().filter(|minion| minion.tier == tier).collect()
    }

    pub fn tavern_minion(&self, id: &str) -> Option<&TavernMinion> {
        self.tavern.iter().find(|minion| minion.id == id)
    }

    fn basic() -> Self {
        let definitions = vec![
            CardDefinition::unit("basic_minion_1", "Footman", 1, 1, 2).with_ability(Ability::Taunt),
            CardDefinition::unit("basic_minion_2", "Apprentice Mage", 2, 1, 3)
                .with_battlecry(CardEffect::damage(1, EffectTarget::ChosenEnemy)),
            CardDefinition::unit("basic_minion_3", "Charging Warrior", 3, 2, 2)
                .with_ability(Ability::Charge),
            CardDefinition::unit("basic_minion_4", "Squad Leader", 3, 2, 2),
            CardDefinition::unit("basic_minion_5", "Ghoul", 3, 2, 3)
                .with_deathrattle(CardEffect::draw(1)),
            CardDefinition::unit("basic_minion_6", "Stormwind Knight", 4, 2, 5)
                .with_ability(Ability::Taunt),
            CardDefinition::unit("basic_minion_7", "Explosive Engineer", 5, 3, 3)
                .with_deathrattle(CardEffect::aoe_damage(2)),
            CardDefinition::unit("basic_minion_8", "Field Commander", 6, 4, 5)
                .with_battlecry(CardEffect::buff(2, 2)),
            CardDefinition::unit("basic_minion_9", "Crypt Keeper", 4, 2, 2).with_deathrattle(
                CardEffect::summon(SummonSpec {
                    card_id: "risen_skeleton".into(),
                    name: "Risen Skeleton".into(),
                    attack: 2,
                    health: 2,
                }),
            ),
            CardDefinition::unit("basic_minion_10", "Argent Squire", 1, 1, 1)
                .with_ability(Ability::DivineShield),
            CardDefinition::spell(
                "basic_spell_1",
                "Fireball",
                4,
                CardEffect::damage(6, EffectTarget::ChosenEnemy),
            ),
            CardDefinition::spell(
                "basic_spell_2",
                "Healing Touch",
                3,
                CardEffect::heal(8, EffectTarget::ChosenFriendly),
            ),
            CardDefinition::spell("basic_spell_3", "Arcane Intellect", 3, CardEffect::draw(2)),
            CardDefinition::spell("basic_spell_4", "Flamestrike", 7, CardEffect::aoe_damage(4)),
            CardDefinition::weapon("basic_weapon_1", "Battle Axe", 3, 3, 2),
            CardDefinition::weapon("basic_weapon_2", "Light Dagger", 1, 1, 2),
            coin_definition(),
        ];

        let cards = definitions
            .into_iter()
            .map(|card| (card.id.clone(), card))
            .collect();

        let mut presets = HashMap::new();
        presets.insert(
            "warrior",
            expand_deck(&[
                ("basic_minion_1", 2),
                ("basic_minion_3", 2),
                ("basic_minion_4", 2),
                ("basic_minion_5", 2),
                ("basic_minion_6", 2),
                ("basic_minion_7", 2),
                ("basic_minion_8", 2),
                ("basic_weapon_1", 2),
                ("basic_spell_2", 2),
                ("basic_spell_3", 2),
            ]),
        );
        presets.insert(
            "mage",
            expand_deck(&[
                ("basic_minion_1", 2),
                ("basic_minion_2", 2),
                ("basic_minion_4", 2),
                ("basic_minion_5", 2),
                ("basic_minion_6", 2),
                ("basic_minion_7", 2),
                ("basic_minion_8", 1),
                ("basic_spell_1", 2),
                ("basic_spell_3", 2),
                ("basic_spell_4", 2),
            ]),
        );

        Self {
            cards,
            tavern: tavern_pool(),
            presets,
        }
    }
}

fn coin_definition() -> CardDefinition {
    CardDefinition::spell(COIN_CARD_ID, "The Coin", 0, CardEffect::gain_mana(1))
}

fn expand_deck(entries: &[(&str, usize)]) -> Vec<CardId> {
    entries
        .iter()
        .flat_map(|(id, copies)| std::iter::repeat(id.to_string()).take(*copies))
        .collect()
}

fn tavern_pool() -> Vec<TavernMinion> {
    let minion = |id: &str, name: &str, attack, health, tier, tribe| TavernMinion {
        id: id.into(),
        name: name.into(),
        attack,
        health,
        tier,
        tribe,
    };
    vec![
        minion("tavern_1", "Micro Bot", 1, 2, 1, Some(Tribe::Mech)),
        minion("tavern_2", "Mud Crawler", 1, 2, 1, Some(Tribe::Murloc)),
        minion("tavern_3", "Raging Worgen", 2, 2, 1, None),
        minion("tavern_4", "Stonepond Hunter", 2, 3, 1, Some(Tribe::Beast)),
        minion("tavern_5", "Flame Imp", 3, 2, 1, Some(Tribe::Demon)),
        minion("tavern_6", "Harvester", 2, 3, 2, Some(Tribe::Mech)),
        minion("tavern_7", "Tidehunter", 2, 3, 2, Some(Tribe::Murloc)),
        minion("tavern_8", "Bonegnaw Hyena", 2, 4, 2, Some(Tribe::Beast)),
        minion("tavern_9", "Demon Guard", 3, 4, 2, Some(Tribe::Demon)),
        minion("tavern_10", "Volcanic Whelp", 3, 3, 2, Some(Tribe::Dragon)),
        minion("tavern_11", "Ironclad Hound", 4, 4, 3, Some(Tribe::Mech)),
        minion("tavern_12", "Murloc Warleader", 3, 3, 3, Some(Tribe::Murloc)),
        minion("tavern_13", "Jungle Stalker", 4, 5, 3, Some(Tribe::Beast)),
        minion("tavern_14", "Abyssal Lord", 5, 4, 3, Some(Tribe::Demon)),
        minion("tavern_15", "Bronze Warden", 4, 5, 3, Some(Tribe::Dragon)),
    ]
}
