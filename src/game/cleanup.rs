//! 移除阵亡随从、触发亡语并判定对局结果。

use super::effects::EffectContext;
use super::state::{DuelState, GameEvent, SideId};

/// 反复清扫双方战场，直到一整轮没有随从被移除，再检查英雄。
///
/// 先清扫当前行动方；同一战场内按入场顺序处理。亡语在随从移除时立即结算，
/// 由此阵亡的随从留给下一轮处理。
pub fn run_cleanup(state: &mut DuelState) -> Vec<GameEvent> {
    let mut events = Vec::new();
    let limit = state.config.cleanup_iteration_limit.max(1);
    let order = [state.active_side, state.opponent_of(state.active_side)];

    let mut passes = 0;
    let mut settled = false;
    while passes < limit {
        passes += 1;
        let mut removed = false;
        for side in order {
            removed |= sweep_side(state, side, &mut events);
        }
        if !removed {
            settled = true;
            break;
        }
    }

    if !settled {
        log::warn!("cleanup stopped after {passes} passes; discarding remaining dead units");
        for side in order {
            discard_dead(state, side, &mut events);
        }
    }

    events.extend(state.evaluate_outcome());
    events
}

fn sweep_side(state: &mut DuelState, side: SideId, events: &mut Vec<GameEvent>) -> bool {
    let mut removed = false;
    let mut index = 0;
    while index < state.side(side).board.len() {
        if !state.side(side).board[index].is_dead() {
            index += 1;
            continue;
        }

        let unit = state.side_mut(side).board.remove(index);
        removed = true;
        log::debug!("side {side}: {} ({}) died", unit.name, unit.uid);
        events.push(GameEvent::UnitDied {
            side,
            unit_id: unit.uid,
            card_id: unit.card_id.clone(),
        });

        if let Some(deathrattle) = &unit.deathrattle {
            let ctx = EffectContext::new(side).with_source_unit(unit.uid);
            events.extend(deathrattle.apply(&ctx, state).events);
        }
    }
    removed
}

fn discard_dead(state: &mut DuelState, side: SideId, events: &mut Vec<GameEvent>) {
    let board = &mut state.side_mut(side).board;
    let (dead, alive): (Vec<_>, Vec<_>) = board.drain(..).partition(|unit| unit.is_dead());
    *board = alive;
    events.extend(dead.into_iter().map(|unit| GameEvent::UnitDied {
        side,
        unit_id: unit.uid,
        card_id: unit.card_id,
    }));
}
