pub mod battle;
pub mod config;
pub mod game;
pub mod logging;
pub mod session;

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::future::TimeoutFuture;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};
use web_sys::js_sys::{Date, Promise};

pub use battle::{
    generate_opponent_roster, BattleResult, CombatEvent, CombatReport, CombatResolver, CombatSide,
    CombatUnit,
};
pub use config::DuelConfig;
pub use game::{
    catalog, AttackAction, CardDefinition, CardEffect, CardKind, DuelOutcome, DuelState,
    DuelView, EffectKind, GameEvent, PlayCardAction, RuleEngine, RuleError, RuleResolution,
    SideId, TargetRef,
};
pub use session::{ClientMessage, Outbound, ServerMessage, SessionRegistry};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    if logging::init(log::LevelFilter::Info).is_err() {
        web_sys::console::warn_1(&"logger already installed".into());
    }
}

#[wasm_bindgen(js_name = "setLogLevel")]
pub fn set_log_level(level: &str) {
    log::set_max_level(logging::parse_level(level));
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn now_ms() -> u64 {
    Date::now().max(0.0) as u64
}

fn parse_config(config_json: Option<String>) -> Result<DuelConfig, JsValue> {
    match config_json {
        Some(json) => DuelConfig::from_json(&json).map_err(serde_to_js_error),
        None => Ok(DuelConfig::default()),
    }
}

fn preset(name: &str) -> Result<Vec<CardDefinition>, JsValue> {
    let ids = catalog()
        .preset_deck(name)
        .ok_or_else(|| JsValue::from_str(&format!("unknown preset deck: {name}")))?;
    catalog().resolve_deck(ids).map_err(to_js_error)
}

/// 在页面内进行的本地对战，不经过会话管理。
#[wasm_bindgen]
pub struct DuelEngine {
    state: DuelState,
    rules: RuleEngine,
}

#[wasm_bindgen]
impl DuelEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(
        first_deck: &str,
        second_deck: &str,
        config_json: Option<String>,
    ) -> Result<DuelEngine, JsValue> {
        let config = parse_config(config_json)?;
        let decks = [preset(first_deck)?, preset(second_deck)?];
        let mut rules = RuleEngine::new();
        let (state, _) = rules.start_duel(decks, config);
        Ok(DuelEngine { state, rules })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    pub fn view_json(&self, side: SideId) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.view_for(side)).map_err(serde_to_js_error)
    }

    pub fn play_card_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: PlayCardAction =
            serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let events = self
            .rules
            .play_card(&mut self.state, action)
            .map_err(to_js_error)?;
        self.resolution_json(events)
    }

    pub fn attack_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: AttackAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let events = self
            .rules
            .attack(&mut self.state, action)
            .map_err(to_js_error)?;
        self.resolution_json(events)
    }

    pub fn end_turn(&mut self) -> Result<String, JsValue> {
        let side = self.state.active_side;
        let events = self
            .rules
            .end_turn(&mut self.state, side)
            .map_err(to_js_error)?;
        self.resolution_json(events)
    }

    pub fn forfeit(&mut self, side: SideId) -> Result<String, JsValue> {
        let events = RuleEngine::forfeit(&mut self.state, side).map_err(to_js_error)?;
        self.resolution_json(events)
    }

    fn resolution_json(&self, events: Vec<GameEvent>) -> Result<String, JsValue> {
        let resolution = RuleResolution::new(self.state.clone(), events);
        serde_json::to_string(&resolution).map_err(serde_to_js_error)
    }
}

/// 供传输层使用的会话注册表，每次调用以 JSON 数组返回待投递的
/// `{ recipient, message }` 消息。
#[wasm_bindgen]
pub struct SessionHub {
    registry: Rc<RefCell<SessionRegistry>>,
}

#[wasm_bindgen]
impl SessionHub {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<SessionHub, JsValue> {
        let config = parse_config(config_json)?;
        Ok(SessionHub {
            registry: Rc::new(RefCell::new(SessionRegistry::new(config))),
        })
    }

    #[wasm_bindgen(js_name = "createSession")]
    pub fn create_session(&self) -> String {
        self.registry.borrow_mut().create_session()
    }

    #[wasm_bindgen(js_name = "handleMessage")]
    pub fn handle_message(&self, participant: &str, message_json: &str) -> Result<String, JsValue> {
        let message: ClientMessage =
            serde_json::from_str(message_json).map_err(serde_to_js_error)?;
        let outbound = self
            .registry
            .borrow_mut()
            .dispatch(participant, message, now_ms());
        self.schedule_purge(&outbound);
        serde_json::to_string(&outbound).map_err(serde_to_js_error)
    }

    pub fn disconnect(&self, participant: &str) -> Result<String, JsValue> {
        let outbound = self.registry.borrow_mut().disconnect(participant, now_ms());
        self.schedule_purge(&outbound);
        serde_json::to_string(&outbound).map_err(serde_to_js_error)
    }

    /// 立即清除过期会话并返回其标识。
    pub fn sweep(&self) -> Result<JsValue, JsValue> {
        let purged = self.registry.borrow_mut().sweep(now_ms());
        to_value(&purged).map_err(JsValue::from)
    }

    /// 等待 `delay_ms` 后清除过期会话，Promise 结果为被清除的标识。
    #[wasm_bindgen(js_name = "sweepAfter")]
    pub fn sweep_after(&self, delay_ms: u32) -> Promise {
        let registry = Rc::clone(&self.registry);
        future_to_promise(async move {
            TimeoutFuture::new(delay_ms).await;
            let purged = registry.borrow_mut().sweep(now_ms());
            to_value(&purged).map_err(JsValue::from)
        })
    }

    #[wasm_bindgen(js_name = "sessionCount")]
    pub fn session_count(&self) -> usize {
        self.registry.borrow().session_count()
    }

    #[wasm_bindgen(js_name = "sessionView")]
    pub fn session_view(&self, session_id: &str, side: SideId) -> Result<JsValue, JsValue> {
        let registry = self.registry.borrow();
        let session = registry.session(session_id).ok_or_else(|| {
            to_js_error(RuleError::SessionNotFound {
                session_id: session_id.to_string(),
            })
        })?;
        let view = session.duel.as_ref().map(|duel| duel.view_for(side));
        to_value(&view).map_err(JsValue::from)
    }

    fn schedule_purge(&self, outbound: &[Outbound]) {
        let ended = outbound
            .iter()
            .any(|item| matches!(item.message, ServerMessage::SessionEnded { .. }));
        if !ended {
            return;
        }
        let registry = Rc::clone(&self.registry);
        let delay = registry.borrow().config().grace_period_ms;
        spawn_local(async move {
            TimeoutFuture::new(u32::try_from(delay).unwrap_or(u32::MAX)).await;
            let purged = registry.borrow_mut().sweep(now_ms());
            if !purged.is_empty() {
                log::debug!("purged {} ended sessions", purged.len());
            }
        });
    }
}

/// 对两份阵容快照进行一次自走棋战斗。
#[wasm_bindgen(js_name = "simulateCombat")]
pub fn simulate_combat(round: u32, player: JsValue, opponent: JsValue) -> Result<JsValue, JsValue> {
    let player: Vec<CombatUnit> = from_value(player).map_err(JsValue::from)?;
    let opponent: Vec<CombatUnit> = from_value(opponent).map_err(JsValue::from)?;
    let report = CombatResolver::new().resolve(round, &player, &opponent);
    to_value(&report).map_err(JsValue::from)
}

/// 为 `round` 生成对手阵容并与玩家阵容战斗。
#[wasm_bindgen(js_name = "simulateRound")]
pub fn simulate_round(round: u32, player: JsValue) -> Result<JsValue, JsValue> {
    let player: Vec<CombatUnit> = from_value(player).map_err(JsValue::from)?;
    let report = CombatResolver::new().resolve_against_generated(round, &player);
    to_value(&report).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "generateOpponentRoster")]
pub fn generate_opponent_roster_js(round: u32) -> Result<JsValue, JsValue> {
    let roster = generate_opponent_roster(round, &mut SmallRng::from_entropy());
    to_value(&roster).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "cardCatalog")]
pub fn card_catalog() -> Result<JsValue, JsValue> {
    let mut cards: Vec<&CardDefinition> = catalog().cards().collect();
    cards.sort_by(|a, b| a.id.cmp(&b.id));
    to_value(&cards).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "tavernPool")]
pub fn tavern_pool() -> Result<JsValue, JsValue> {
    to_value(catalog().tavern_minions()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "presetDeck")]
pub fn preset_deck(name: &str) -> Result<JsValue, JsValue> {
    let ids = catalog()
        .preset_deck(name)
        .ok_or_else(|| JsValue::from_str(&format!("unknown preset deck: {name}")))?;
    to_value(ids).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: DuelState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_value(&error).unwrap_or_else(|e| JsValue::from_str(&e.to_string())))
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
