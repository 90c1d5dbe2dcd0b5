use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    catalog::{catalog, Ability, CardDefinition, CardKind},
    cleanup::run_cleanup,
    effects::{EffectContext, EffectTarget},
    state::{
        DuelState, EntityRef, EventTarget, GameEvent, SideId, TargetRef, UnitInstance, Weapon,
        SIDE_COUNT,
    },
};
use crate::config::DuelConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayCardAction {
    pub side: SideId,
    pub hand_index: usize,
    #[serde(default)]
    pub target: Option<TargetRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackAction {
    pub side: SideId,
    pub attacker_index: usize,
    pub target: TargetRef,
}

/// 对局状态及产生它的事件。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleResolution {
    pub state: DuelState,
    pub events: Vec<GameEvent>,
}

impl RuleResolution {
    pub fn new(state: DuelState, events: Vec<GameEvent>) -> Self {
        Self { state, events }
    }
}

/// 行动被拒绝的原因。被拒绝的行动不会改变对局。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("session {session_id} does not exist")]
    SessionNotFound { session_id: String },
    #[error("session {session_id} already has two participants")]
    SessionFull { session_id: String },
    #[error("illegal action: {reason}")]
    IllegalAction { reason: String },
    #[error("hand index {index} is out of range")]
    InvalidIndex { index: usize },
    #[error("invalid target: {reason}")]
    InvalidTarget { reason: String },
    #[error("board index {index} holds no unit that can attack")]
    InvalidAttacker { index: usize },
    #[error("card costs {required} mana but only {available} is available")]
    InsufficientMana { required: u8, available: u8 },
    #[error("unit at board index {index} has already acted this turn")]
    AlreadyActed { index: usize },
    #[error("board already holds the maximum of {capacity} units")]
    CapacityExceeded { capacity: usize },
    #[error("card {card_id} is not in the catalog")]
    UnknownCard { card_id: String },
}

impl RuleError {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleError::SessionNotFound { .. } => "SessionNotFound",
            RuleError::SessionFull { .. } => "SessionFull",
            RuleError::IllegalAction { .. } => "IllegalAction",
            RuleError::InvalidIndex { .. } => "InvalidIndex",
            RuleError::InvalidTarget { .. } => "InvalidTarget",
            RuleError::InvalidAttacker { .. } => "InvalidAttacker",
            RuleError::InsufficientMana { .. } => "InsufficientMana",
            RuleError::AlreadyActed { .. } => "AlreadyActed",
            RuleError::CapacityExceeded { .. } => "CapacityExceeded",
            RuleError::UnknownCard { .. } => "UnknownCard",
        }
    }

    pub(crate) fn illegal(reason: impl Into<String>) -> Self {
        RuleError::IllegalAction {
            reason: reason.into(),
        }
    }

    fn invalid_target(reason: impl Into<String>) -> Self {
        RuleError::InvalidTarget {
            reason: reason.into(),
        }
    }
}

/// 对 [`DuelState`] 的合法性校验与状态转换。
///
/// 每次转换先完整校验再修改状态，随后执行清理阶段，调用方只会看到稳定状态。
pub struct RuleEngine {
    rng: SmallRng,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
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

    /// 洗牌、随机决定先手并发起始手牌，后手方额外获得幸运币。
    pub fn start_duel(
        &mut self,
        decks: [Vec<CardDefinition>; SIDE_COUNT],
        config: DuelConfig,
    ) -> (DuelState, Vec<GameEvent>) {
        let mut decks = decks;
        for deck in decks.iter_mut() {
            deck.shuffle(&mut self.rng);
        }
        let first: SideId = self.rng.gen_range(0..SIDE_COUNT as SideId);
        let second = 1 - first;

        let mut state = DuelState::new(decks, first, config);
        let mut events = Vec::new();
        for _ in 0..state.config.first_hand_size {
            events.extend(state.draw_card(first));
        }
        for _ in 0..state.config.second_hand_size {
            events.extend(state.draw_card(second));
        }
        if state.side(second).hand.len() < state.config.max_hand_size {
            state.side_mut(second).hand.push(catalog().coin());
        }
        events.push(GameEvent::TurnStarted {
            side: first,
            turn: state.turn,
        });

        log::info!("duel started, side {first} moves first");
        (state, events)
    }

    fn ensure_in_progress(state: &DuelState) -> Result<(), RuleError> {
        if state.is_finished() {
            return Err(RuleError::illegal("the duel has already ended"));
        }
        Ok(())
    }

    fn ensure_turn_owner(state: &DuelState, side: SideId) -> Result<(), RuleError> {
        if usize::from(side) >= SIDE_COUNT {
            return Err(RuleError::illegal(format!("side {side} does not exist")));
        }
        if state.active_side != side {
            return Err(RuleError::illegal(format!("it is not side {side}'s turn")));
        }
        Ok(())
    }

    /// 按目标所在战场校验指定目标。需要目标的法术必须指定，战吼缺少目标则不生效。
    /// 友方战吼结算时随从已放到战场末尾，因此该位置也是合法目标。
    fn validate_play_target(
        state: &DuelState,
        side: SideId,
        card: &CardDefinition,
        target: Option<TargetRef>,
    ) -> Result<(), RuleError> {
        let Some(effect) = card.on_play_effect() else {
            return Ok(());
        };
        let effect_target = effect.kind.target();
        if !effect_target.is_chosen() {
            return Ok(());
        }

        match target {
            None if effect.target_required && !card.is_unit() => Err(RuleError::invalid_target(
                format!("{} needs a target", card.name),
            )),
            None | Some(TargetRef::Hero) => Ok(()),
            Some(TargetRef::Unit { index }) => {
                let board_side = match effect_target {
                    EffectTarget::ChosenEnemy => state.opponent_of(side),
                    _ => side,
                };
                let placed = usize::from(card.is_unit() && board_side == side);
                if index < state.side(board_side).board.len() + placed {
                    Ok(())
                } else {
                    Err(RuleError::invalid_target(format!(
                        "no unit at index {index} on side {board_side}"
                    )))
                }
            }
        }
    }

    pub fn play_card(
        &self,
        state: &mut DuelState,
        action: PlayCardAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_in_progress(state)?;
        Self::ensure_turn_owner(state, action.side)?;

        let side = action.side;
        let player = state.side(side);
        let card = player
            .hand
            .get(action.hand_index)
            .ok_or(RuleError::InvalidIndex {
                index: action.hand_index,
            })?;

        let available = player.mana.available();
        if card.cost > available {
            return Err(RuleError::InsufficientMana {
                required: card.cost,
                available,
            });
        }
        if card.is_unit() && player.board.len() >= state.config.max_board_size {
            return Err(RuleError::CapacityExceeded {
                capacity: state.config.max_board_size,
            });
        }
        Self::validate_play_target(state, side, card, action.target)?;

        let card = state.side_mut(side).hand.remove(action.hand_index);
        state.spend_mana(side, card.cost);

        let mut events = vec![GameEvent::CardPlayed {
            side,
            card_id: card.id.clone(),
            target: action.target,
        }];
        let ctx = EffectContext::new(side).with_target(action.target);

        match &card.kind {
            CardKind::Unit { battlecry, .. } => {
                let uid = state.allocate_unit_id();
                if let Some(unit) = UnitInstance::from_definition(uid, &card) {
                    state.side_mut(side).board.push(unit);
                    events.push(GameEvent::UnitEntered {
                        side,
                        unit_id: uid,
                        card_id: card.id.clone(),
                    });
                }
                if let Some(effect) = battlecry {
                    let ctx = ctx.with_source_unit(uid);
                    events.extend(effect.apply(&ctx, state).events);
                }
            }
            CardKind::Spell { effect } => {
                events.extend(effect.apply(&ctx, state).events);
            }
            CardKind::Weapon { attack, durability } => {
                state.side_mut(side).weapon = Some(Weapon {
                    card_id: card.id.clone(),
                    name: card.name.clone(),
                    attack: *attack,
                    durability: *durability,
                });
                events.push(GameEvent::WeaponEquipped {
                    side,
                    card_id: card.id.clone(),
                });
            }
        }

        events.extend(run_cleanup(state));
        Ok(events)
    }

    pub fn attack(
        &self,
        state: &mut DuelState,
        action: AttackAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_in_progress(state)?;
        Self::ensure_turn_owner(state, action.side)?;

        let side = action.side;
        let defender_side = state.opponent_of(side);
        let attacker = state
            .side(side)
            .board
            .get(action.attacker_index)
            .ok_or(RuleError::InvalidAttacker {
                index: action.attacker_index,
            })?;

        let defenders = &state.side(defender_side).board;
        let (entity, event_target, counter) = match action.target {
            TargetRef::Hero => (
                EntityRef::Hero {
                    side: defender_side,
                },
                EventTarget::Hero {
                    side: defender_side,
                },
                0,
            ),
            TargetRef::Unit { index } => {
                let defender = defenders.get(index).ok_or_else(|| {
                    RuleError::invalid_target(format!("no enemy unit at index {index}"))
                })?;
                (
                    EntityRef::Unit {
                        side: defender_side,
                        index,
                    },
                    EventTarget::Unit {
                        side: defender_side,
                        unit_id: defender.uid,
                    },
                    defender.attack,
                )
            }
        };

        if attacker.acted {
            return Err(RuleError::AlreadyActed {
                index: action.attacker_index,
            });
        }
        if attacker.attack <= 0 {
            return Err(RuleError::InvalidAttacker {
                index: action.attacker_index,
            });
        }
        let target_has_taunt = match action.target {
            TargetRef::Unit { index } => defenders[index].has(Ability::Taunt),
            TargetRef::Hero => false,
        };
        if !target_has_taunt && state.side(defender_side).has_taunt() {
            return Err(RuleError::invalid_target("a taunt unit must be attacked first"));
        }

        let damage = attacker.attack;
        let attacker_uid = attacker.uid;
        state.side_mut(side).board[action.attacker_index].acted = true;

        let mut events = vec![GameEvent::AttackDeclared {
            side,
            attacker: attacker_uid,
            target: event_target,
        }];
        events.extend(state.damage_entity(entity, damage));
        if matches!(action.target, TargetRef::Unit { .. }) {
            let attacker_ref = EntityRef::Unit {
                side,
                index: action.attacker_index,
            };
            events.extend(state.damage_entity(attacker_ref, counter));
        }

        events.extend(run_cleanup(state));
        Ok(events)
    }

    /// 结束回合：下一方获得一个法力水晶并回满、抽一张牌、重置随从攻击状态。
    pub fn end_turn(&self, state: &mut DuelState, side: SideId) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_in_progress(state)?;
        Self::ensure_turn_owner(state, side)?;

        state.side_mut(side).mana.bonus = 0;
        let mut events = vec![GameEvent::TurnEnded { side }];

        let next = state.opponent_of(side);
        state.active_side = next;
        state.turn += 1;
        events.push(GameEvent::TurnStarted {
            side: next,
            turn: state.turn,
        });

        let ceiling = state.config.max_mana;
        let mana = &mut state.side_mut(next).mana;
        mana.max = mana.max.saturating_add(1).min(ceiling);
        mana.current = mana.max;

        events.extend(state.draw_card(next));
        for unit in state.side_mut(next).board.iter_mut() {
            unit.acted = false;
        }

        events.extend(run_cleanup(state));
        Ok(events)
    }

    /// 离开对局的一方判负。
    pub fn forfeit(state: &mut DuelState, side: SideId) -> Result<Vec<GameEvent>, RuleError> {
        if usize::from(side) >= SIDE_COUNT {
            return Err(RuleError::illegal(format!("side {side} does not exist")));
        }
        Ok(state.forfeit(side).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::effects::CardEffect;
    use crate::game::state::test_support::{duel_with_boards, unit};
    use crate::game::state::DuelOutcome;

    fn charger() -> CardDefinition {
        CardDefinition::unit("charger", "Charger", 1, 2, 2).with_ability(Ability::Charge)
    }

    fn grunt() -> CardDefinition {
        CardDefinition::unit("grunt", "Grunt", 1, 1, 1)
    }

    fn play(side: SideId, hand_index: usize, target: Option<TargetRef>) -> PlayCardAction {
        PlayCardAction {
            side,
            hand_index,
            target,
        }
    }

    fn strike(side: SideId, attacker_index: usize, target: TargetRef) -> AttackAction {
        AttackAction {
            side,
            attacker_index,
            target,
        }
    }

    #[test]
    fn opening_deals_three_and_four_plus_coin() {
        let ids = catalog().preset_deck("warrior").expect("preset").to_vec();
        let deck = catalog().resolve_deck(&ids).expect("deck");
        let mut engine = RuleEngine::with_seed(7);
        let (state, _events) = engine.start_duel([deck.clone(), deck], DuelConfig::default());

        let first = state.active_side;
        let second = state.opponent_of(first);
        assert_eq!(state.side(first).hand.len(), 3);
        assert_eq!(state.side(second).hand.len(), 5);
        assert_eq!(
            state.side(second).hand.last().map(|card| card.id.as_str()),
            Some(crate::game::catalog::COIN_CARD_ID)
        );
        for side in [first, second] {
            assert_eq!(state.side(side).mana.current, 1);
            assert_eq!(state.side(side).mana.max, 1);
        }
    }

    #[test]
    fn charge_unit_attacks_the_hero_on_the_turn_it_is_played() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![]);
        state.side_mut(0).hand.push(charger());

        engine
            .play_card(&mut state, play(0, 0, None))
            .expect("charger is affordable");
        engine
            .attack(&mut state, strike(0, 0, TargetRef::Hero))
            .expect("charge allows an immediate attack");

        assert_eq!(state.side(1).hero.health, 28);
        assert!(state.side(0).board[0].acted);
        assert_eq!(state.side(0).mana.available(), 0);
    }

    #[test]
    fn unit_without_charge_cannot_attack_the_turn_it_is_played() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![]);
        state.side_mut(0).hand.push(grunt());
        engine
            .play_card(&mut state, play(0, 0, None))
            .expect("grunt is affordable");

        let error = engine
            .attack(&mut state, strike(0, 0, TargetRef::Hero))
            .expect_err("summoning sickness");
        assert_eq!(error, RuleError::AlreadyActed { index: 0 });
    }

    #[test]
    fn attacker_deathrattle_splashes_before_the_recheck() {
        let engine = RuleEngine::with_seed(1);
        let mut bomber = unit("bomber", 3, 1);
        bomber.deathrattle = Some(CardEffect::aoe_damage(2).kind);
        let mut state = duel_with_boards(
            vec![bomber],
            vec![unit("brute", 5, 5), unit("bystander", 1, 3)],
        );

        let events = engine
            .attack(&mut state, strike(0, 0, TargetRef::Unit { index: 0 }))
            .expect("attack is legal");

        assert!(state.side(0).board.is_empty(), "attacker took 5 and died");
        let survivors: Vec<(&str, i16)> = state
            .side(1)
            .board
            .iter()
            .map(|u| (u.card_id.as_str(), u.health))
            .collect();
        assert_eq!(survivors, vec![("bystander", 1)]);

        let deaths: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                GameEvent::UnitDied { card_id, .. } => Some(card_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deaths, vec!["bomber", "brute"]);
    }

    #[test]
    fn heroes_do_not_strike_back() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![unit("a", 4, 2)], vec![]);
        engine
            .attack(&mut state, strike(0, 0, TargetRef::Hero))
            .expect("attack is legal");
        assert_eq!(state.side(0).board[0].health, 2);
        assert_eq!(state.side(1).hero.health, 26);
    }

    #[test]
    fn lethal_attack_ends_the_duel() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![unit("a", 4, 2)], vec![]);
        state.side_mut(1).hero.health = 3;

        let events = engine
            .attack(&mut state, strike(0, 0, TargetRef::Hero))
            .expect("attack is legal");

        assert_eq!(state.outcome, Some(DuelOutcome::Winner { side: 0 }));
        assert!(matches!(events.last(), Some(GameEvent::DuelEnded { .. })));
        let error = engine
            .end_turn(&mut state, 0)
            .expect_err("duel is over");
        assert_eq!(error.kind(), "IllegalAction");
    }

    #[test]
    fn rejected_actions_leave_the_duel_untouched() {
        let engine = RuleEngine::with_seed(1);
        let mut acted = unit("tired", 2, 2);
        acted.acted = true;
        let mut state = duel_with_boards(vec![acted, unit("zero", 0, 3)], vec![unit("b", 1, 1)]);
        state.side_mut(0).hand.push(CardDefinition::unit("big", "Big", 5, 5, 5));
        let before = state.clone();

        let attempts: Vec<(Result<Vec<GameEvent>, RuleError>, &str)> = vec![
            (engine.play_card(&mut state, play(1, 0, None)), "IllegalAction"),
            (engine.play_card(&mut state, play(0, 3, None)), "InvalidIndex"),
            (engine.play_card(&mut state, play(0, 0, None)), "InsufficientMana"),
            (engine.attack(&mut state, strike(0, 9, TargetRef::Hero)), "InvalidAttacker"),
            (
                engine.attack(&mut state, strike(0, 0, TargetRef::Unit { index: 4 })),
                "InvalidTarget",
            ),
            (engine.attack(&mut state, strike(0, 0, TargetRef::Hero)), "AlreadyActed"),
            (engine.attack(&mut state, strike(0, 1, TargetRef::Hero)), "InvalidAttacker"),
            (engine.end_turn(&mut state, 1), "IllegalAction"),
            (engine.end_turn(&mut state, 5), "IllegalAction"),
        ];

        for (result, kind) in attempts {
            let error = result.expect_err("action should be rejected");
            assert_eq!(error.kind(), kind, "{error}");
        }
        assert_eq!(state, before);
    }

    #[test]
    fn full_board_rejects_another_unit() {
        let engine = RuleEngine::with_seed(1);
        let board = (0..7).map(|i| unit(&format!("u{i}"), 1, 1)).collect();
        let mut state = duel_with_boards(board, vec![]);
        state.side_mut(0).hand.push(grunt());

        let error = engine
            .play_card(&mut state, play(0, 0, None))
            .expect_err("board is full");
        assert_eq!(error, RuleError::CapacityExceeded { capacity: 7 });
        assert_eq!(state.side(0).hand.len(), 1);
    }

    #[test]
    fn targeted_spell_requires_a_valid_target() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![unit("b", 1, 1)]);
        state.side_mut(0).mana.current = 4;
        state.side_mut(0).mana.max = 4;
        let fireball = catalog().get("basic_spell_1").cloned().expect("fireball");
        state.side_mut(0).hand.push(fireball);

        let missing = engine.play_card(&mut state, play(0, 0, None));
        assert!(matches!(missing, Err(RuleError::InvalidTarget { .. })));
        let out_of_range = engine.play_card(&mut state, play(0, 0, Some(TargetRef::Unit { index: 1 })));
        assert!(matches!(out_of_range, Err(RuleError::InvalidTarget { .. })));

        engine
            .play_card(&mut state, play(0, 0, Some(TargetRef::Unit { index: 0 })))
            .expect("fireball on the enemy unit");
        assert!(state.side(1).board.is_empty());
        assert!(state.side(0).hand.is_empty());
    }

    #[test]
    fn battlecry_without_a_target_fizzles() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![]);
        state.side_mut(0).mana.current = 2;
        state.side_mut(0).mana.max = 2;
        let mage = catalog().get("basic_minion_2").cloned().expect("apprentice");
        state.side_mut(0).hand.push(mage);

        engine
            .play_card(&mut state, play(0, 0, None))
            .expect("battlecry target is optional");
        assert_eq!(state.side(0).board.len(), 1);
        assert_eq!(state.side(1).hero.health, 30);
    }

    #[test]
    fn battlecry_damage_hits_the_chosen_enemy() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![]);
        state.side_mut(0).mana.current = 2;
        state.side_mut(0).mana.max = 2;
        let mage = catalog().get("basic_minion_2").cloned().expect("apprentice");
        state.side_mut(0).hand.push(mage);

        engine
            .play_card(&mut state, play(0, 0, Some(TargetRef::Hero)))
            .expect("battlecry at the enemy hero");
        assert_eq!(state.side(1).hero.health, 29);
    }

    #[test]
    fn friendly_battlecry_may_target_the_slot_its_unit_takes() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![]);
        state.side_mut(0).mana.current = 6;
        state.side_mut(0).mana.max = 6;
        let commander = catalog().get("basic_minion_8").cloned().expect("field commander");
        state.side_mut(0).hand = vec![commander.clone(), commander];

        engine
            .play_card(&mut state, play(0, 0, Some(TargetRef::Unit { index: 0 })))
            .expect("the commander buffs itself");
        let placed = &state.side(0).board[0];
        assert_eq!((placed.attack, placed.health, placed.max_health), (6, 7, 7));
        assert_eq!(state.side(0).hand.len(), 1);

        state.side_mut(0).mana.current = 6;
        let beyond = engine.play_card(&mut state, play(0, 0, Some(TargetRef::Unit { index: 2 })));
        assert!(matches!(beyond, Err(RuleError::InvalidTarget { .. })));
    }

    #[test]
    fn coin_mana_is_spendable_this_turn_only() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![]);
        state.side_mut(0).hand = vec![
            catalog().coin(),
            CardDefinition::unit("two", "Two Drop", 2, 2, 2),
            catalog().coin(),
        ];

        engine
            .play_card(&mut state, play(0, 0, None))
            .expect("coin is free");
        assert_eq!(state.side(0).mana.current, 1);
        assert_eq!(state.side(0).mana.available(), 2);
        engine
            .play_card(&mut state, play(0, 0, None))
            .expect("two drop with the coin");
        assert_eq!(state.side(0).mana.available(), 0);

        engine
            .play_card(&mut state, play(0, 0, None))
            .expect("second coin");
        engine.end_turn(&mut state, 0).expect("side 0 passes");
        assert_eq!(state.side(0).mana.bonus, 0);
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn weapon_replaces_the_equipped_one() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![]);
        state.side_mut(0).mana.current = 4;
        state.side_mut(0).mana.max = 4;
        state.side_mut(0).hand = vec![
            catalog().get("basic_weapon_2").cloned().expect("dagger"),
            catalog().get("basic_weapon_1").cloned().expect("axe"),
        ];

        engine.play_card(&mut state, play(0, 0, None)).expect("dagger");
        engine.play_card(&mut state, play(0, 0, None)).expect("axe");
        let weapon = state.side(0).weapon.as_ref().expect("weapon equipped");
        assert_eq!((weapon.card_id.as_str(), weapon.attack), ("basic_weapon_1", 3));
        assert!(state.side(0).board.is_empty());
    }

    #[test]
    fn taunt_must_be_attacked_first() {
        let engine = RuleEngine::with_seed(1);
        let mut guard = unit("guard", 1, 2);
        guard.abilities.insert(Ability::Taunt);
        let mut state = duel_with_boards(vec![unit("a", 2, 2)], vec![unit("soft", 1, 1), guard]);

        let blocked = engine.attack(&mut state, strike(0, 0, TargetRef::Hero));
        assert!(matches!(blocked, Err(RuleError::InvalidTarget { .. })));
        let blocked = engine.attack(&mut state, strike(0, 0, TargetRef::Unit { index: 0 }));
        assert!(matches!(blocked, Err(RuleError::InvalidTarget { .. })));

        engine
            .attack(&mut state, strike(0, 0, TargetRef::Unit { index: 1 }))
            .expect("taunt unit is a legal target");
        assert_eq!(state.side(1).board.len(), 1);
    }

    #[test]
    fn end_turn_grows_mana_by_one_up_to_ten() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![]);
        let mut seen = [Vec::new(), Vec::new()];

        for _ in 0..24 {
            let side = state.active_side;
            engine.end_turn(&mut state, side).expect("turn passes");
            let next = state.active_side;
            let mana = &state.side(next).mana;
            assert_eq!(mana.current, mana.max);
            seen[usize::from(next)].push(mana.max);
            if state.is_finished() {
                break;
            }
        }

        for maxima in &seen {
            for pair in maxima.windows(2) {
                assert!(pair[1] == (pair[0] + 1).min(10));
            }
        }
        assert!(seen[1].starts_with(&[2, 3, 4]));
    }

    #[test]
    fn end_turn_readies_only_the_new_sides_units() {
        let engine = RuleEngine::with_seed(1);
        let mut mine = unit("mine", 1, 1);
        mine.acted = true;
        let mut theirs = unit("theirs", 1, 1);
        theirs.acted = true;
        let mut state = duel_with_boards(vec![mine], vec![theirs]);

        engine.end_turn(&mut state, 0).expect("side 0 passes");
        assert!(state.side(0).board[0].acted);
        assert!(!state.side(1).board[0].acted);
    }

    #[test]
    fn fatigue_from_end_turn_can_decide_the_duel() {
        let engine = RuleEngine::with_seed(1);
        let mut state = duel_with_boards(vec![], vec![]);
        state.side_mut(1).hero.health = 1;

        let events = engine.end_turn(&mut state, 0).expect("side 0 passes");
        assert!(events.contains(&GameEvent::FatigueDamage { side: 1, amount: 1 }));
        assert_eq!(state.outcome, Some(DuelOutcome::Winner { side: 0 }));
    }

    #[test]
    fn forfeit_awards_the_other_side() {
        let mut state = duel_with_boards(vec![], vec![]);
        let events = RuleEngine::forfeit(&mut state, 1).expect("side 1 exists");
        assert_eq!(state.outcome, Some(DuelOutcome::Winner { side: 0 }));
        assert_eq!(events.len(), 1);
        assert_eq!(RuleEngine::forfeit(&mut state, 0), Ok(Vec::new()));
    }

    #[test]
    fn forfeit_by_a_missing_seat_is_rejected() {
        let mut state = duel_with_boards(vec![], vec![]);
        let error = RuleEngine::forfeit(&mut state, 5).expect_err("there is no side 5");
        assert_eq!(error.kind(), "IllegalAction");
        assert_eq!(state.outcome, None);
    }

    #[test]
    fn random_play_keeps_every_invariant() {
        let ids = catalog().preset_deck("mage").expect("preset").to_vec();
        let deck = catalog().resolve_deck(&ids).expect("deck");
        let mut engine = RuleEngine::with_seed(42);
        let (mut state, _) = engine.start_duel([deck.clone(), deck], DuelConfig::default());
        let mut rng = SmallRng::seed_from_u64(99);

        for _ in 0..2_000 {
            if state.is_finished() {
                break;
            }
            let side = state.active_side;
            let target = if rng.gen_bool(0.3) {
                Some(TargetRef::Hero)
            } else {
                Some(TargetRef::Unit {
                    index: rng.gen_range(0..8),
                })
            };
            let _ = match rng.gen_range(0..10) {
                0..=4 => engine.play_card(
                    &mut state,
                    play(side, rng.gen_range(0..10), target),
                ),
                5..=8 => engine.attack(
                    &mut state,
                    strike(side, rng.gen_range(0..8), target.unwrap_or(TargetRef::Hero)),
                ),
                _ => engine.end_turn(&mut state, side),
            };
            state
                .integrity_check()
                .expect("invariants hold after every transition");
        }
    }
}
