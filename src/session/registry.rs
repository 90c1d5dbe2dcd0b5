use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use super::messages::{ClientMessage, Outbound, ParticipantId, ServerMessage, SessionId};
use crate::config::DuelConfig;
use crate::game::{
    catalog, AttackAction, CardDefinition, CardId, DuelState, PlayCardAction, RuleEngine,
    RuleError, SideId, TargetRef, SIDE_COUNT,
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Waiting,
    Active,
    Ended,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub side: SideId,
    deck: Vec<CardDefinition>,
}

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub lifecycle: Lifecycle,
    pub participants: Vec<Participant>,
    pub duel: Option<DuelState>,
    /// 进入 `Ended` 时的毫秒时间戳。
    pub ended_at: Option<u64>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            lifecycle: Lifecycle::Waiting,
            participants: Vec::with_capacity(SIDE_COUNT),
            duel: None,
            ended_at: None,
        }
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|participant| participant.id == id)
    }

    fn end(&mut self, now_ms: u64) {
        self.lifecycle = Lifecycle::Ended;
        self.ended_at.get_or_insert(now_ms);
    }

    fn ended_messages(&self) -> Vec<Outbound> {
        let outcome = self.duel.as_ref().and_then(|duel| duel.outcome);
        self.participants
            .iter()
            .map(|participant| {
                Outbound::to(
                    &participant.id,
                    ServerMessage::SessionEnded {
                        session_id: self.id.clone(),
                        outcome,
                        winner: outcome.and_then(|outcome| outcome.winner()),
                        state: self.duel.as_ref().map(|duel| duel.view_for(participant.side)),
                    },
                )
            })
            .collect()
    }
}

enum DuelAction {
    PlayCard {
        hand_index: usize,
        target: Option<TargetRef>,
    },
    Attack {
        attacker_index: usize,
        target: TargetRef,
    },
    EndTurn,
}

/// 持有所有会话及参与者到会话的映射。
///
/// 每次调用完整执行后才处理下一次；跨线程共享时调用方需自行串行化访问。
pub struct SessionRegistry {
    config: DuelConfig,
    engine: RuleEngine,
    sessions: HashMap<SessionId, Session>,
    memberships: HashMap<ParticipantId, SessionId>,
}

impl SessionRegistry {
    pub fn new(config: DuelConfig) -> Self {
        Self::with_engine(config, RuleEngine::new())
    }

    pub fn with_engine(config: DuelConfig, engine: RuleEngine) -> Self {
        Self {
            config,
            engine,
            sessions: HashMap::new(),
            memberships: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DuelConfig {
        &self.config
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_of(&self, participant: &str) -> Option<&SessionId> {
        self.memberships.get(participant)
    }

    pub fn create_session(&mut self) -> SessionId {
        let session_id = Uuid::new_v4().to_string();
        self.sessions
            .insert(session_id.clone(), Session::new(session_id.clone()));
        log::info!("session {session_id} created");
        session_id
    }

    /// 分发一条客户端消息。被拒绝的行动只向发送方回复一条拒绝消息。
    pub fn dispatch(
        &mut self,
        participant: &str,
        message: ClientMessage,
        now_ms: u64,
    ) -> Vec<Outbound> {
        let result = match message {
            ClientMessage::CreateSession => {
                let session_id = self.create_session();
                Ok(vec![Outbound::to(
                    participant,
                    ServerMessage::SessionCreated { session_id },
                )])
            }
            ClientMessage::JoinSession {
                session_id,
                display_name,
                deck,
            } => self.join_session(participant, &session_id, &display_name, &deck),
            ClientMessage::PlayCard {
                session_id,
                hand_index,
                target,
            } => self.apply(
                participant,
                &session_id,
                DuelAction::PlayCard { hand_index, target },
                now_ms,
            ),
            ClientMessage::Attack {
                session_id,
                attacker_index,
                target,
            } => self.apply(
                participant,
                &session_id,
                DuelAction::Attack {
                    attacker_index,
                    target,
                },
                now_ms,
            ),
            ClientMessage::EndTurn { session_id } => {
                self.apply(participant, &session_id, DuelAction::EndTurn, now_ms)
            }
        };

        result.unwrap_or_else(|error| {
            log::warn!("rejected message from {participant}: {error}");
            vec![Outbound::to(participant, ServerMessage::rejected(&error))]
        })
    }

    /// 为参与者分配座位，第二个座位入座后开始对局。
    pub fn join_session(
        &mut self,
        participant: &str,
        session_id: &str,
        display_name: &str,
        deck_ids: &[CardId],
    ) -> Result<Vec<Outbound>, RuleError> {
        let seated_elsewhere = self
            .memberships
            .get(participant)
            .and_then(|current| self.sessions.get(current))
            .is_some_and(|current| current.lifecycle != Lifecycle::Ended);
        if seated_elsewhere {
            return Err(RuleError::illegal(
                "participant is already seated in another session",
            ));
        }

        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RuleError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        if session.lifecycle != Lifecycle::Waiting || session.participants.len() >= SIDE_COUNT {
            return Err(RuleError::SessionFull {
                session_id: session_id.to_string(),
            });
        }
        let deck = catalog().resolve_deck(deck_ids)?;

        let side = session.participants.len() as SideId;
        session.participants.push(Participant {
            id: participant.to_string(),
            display_name: display_name.to_string(),
            side,
            deck,
        });
        self.memberships
            .insert(participant.to_string(), session_id.to_string());
        log::info!("{display_name} joined session {session_id} as side {side}");

        let mut outbound = vec![Outbound::to(
            participant,
            ServerMessage::SessionJoined {
                session_id: session_id.to_string(),
                side,
            },
        )];
        if session.participants.len() == SIDE_COUNT {
            outbound.extend(start_session(&mut self.engine, &self.config, session));
        }
        Ok(outbound)
    }

    fn apply(
        &mut self,
        participant: &str,
        session_id: &str,
        action: DuelAction,
        now_ms: u64,
    ) -> Result<Vec<Outbound>, RuleError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RuleError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        let side = session
            .participant(participant)
            .map(|seat| seat.side)
            .ok_or_else(|| RuleError::illegal("not a participant of this session"))?;
        let duel = session
            .duel
            .as_mut()
            .ok_or_else(|| RuleError::illegal("the session has not started"))?;

        let events = match action {
            DuelAction::PlayCard { hand_index, target } => self.engine.play_card(
                duel,
                PlayCardAction {
                    side,
                    hand_index,
                    target,
                },
            )?,
            DuelAction::Attack {
                attacker_index,
                target,
            } => self.engine.attack(
                duel,
                AttackAction {
                    side,
                    attacker_index,
                    target,
                },
            )?,
            DuelAction::EndTurn => self.engine.end_turn(duel, side)?,
        };

        if let Err(violation) = duel.integrity_check() {
            log::error!("session {session_id}: integrity check failed: {violation:?}");
        }

        let mut outbound: Vec<Outbound> = session
            .participants
            .iter()
            .map(|seat| {
                Outbound::to(
                    &seat.id,
                    ServerMessage::StateUpdated {
                        session_id: session_id.to_string(),
                        state: duel.view_for(seat.side),
                        events: events
                            .iter()
                            .filter(|event| event.is_visible_to(seat.side))
                            .cloned()
                            .collect(),
                    },
                )
            })
            .collect();

        if duel.is_finished() {
            session.end(now_ms);
            log::info!("session {session_id} ended");
            outbound.extend(session.ended_messages());
        }
        Ok(outbound)
    }

    /// 离开的一方判负，并通知留下的参与者会话已结束。
    pub fn disconnect(&mut self, participant: &str, now_ms: u64) -> Vec<Outbound> {
        let Some(session_id) = self.memberships.remove(participant) else {
            return Vec::new();
        };
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return Vec::new();
        };
        let Some(side) = session.participant(participant).map(|seat| seat.side) else {
            return Vec::new();
        };
        if session.lifecycle == Lifecycle::Ended {
            return Vec::new();
        }

        if let Some(duel) = session.duel.as_mut() {
            if let Err(error) = RuleEngine::forfeit(duel, side) {
                log::warn!("forfeit for side {side} in session {session_id} refused: {error}");
            }
        }
        session.end(now_ms);
        log::info!("side {side} left session {session_id}; session ended");

        let mut outbound: Vec<Outbound> = session
            .participants
            .iter()
            .filter(|seat| seat.id != participant)
            .map(|seat| {
                Outbound::to(
                    &seat.id,
                    ServerMessage::ParticipantLeft {
                        session_id: session_id.clone(),
                        side,
                    },
                )
            })
            .collect();
        outbound.extend(
            session
                .ended_messages()
                .into_iter()
                .filter(|message| message.recipient != participant),
        );
        outbound
    }

    /// 销毁宽限期已过的会话，返回其标识。
    pub fn sweep(&mut self, now_ms: u64) -> Vec<SessionId> {
        let grace = self.config.grace_period_ms;
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|session| {
                session
                    .ended_at
                    .is_some_and(|ended_at| now_ms.saturating_sub(ended_at) >= grace)
            })
            .map(|session| session.id.clone())
            .collect();

        for session_id in &expired {
            self.sessions.remove(session_id);
            log::debug!("session {session_id} purged");
        }
        let sessions = &self.sessions;
        self.memberships
            .retain(|_, session_id| sessions.contains_key(session_id));
        expired
    }
}

fn start_session(
    engine: &mut RuleEngine,
    config: &DuelConfig,
    session: &mut Session,
) -> Vec<Outbound> {
    let [first, second] = &session.participants[..] else {
        return Vec::new();
    };
    let (duel, _) = engine.start_duel([first.deck.clone(), second.deck.clone()], config.clone());
    let first_side = duel.active_side;

    let outbound = session
        .participants
        .iter()
        .map(|seat| {
            Outbound::to(
                &seat.id,
                ServerMessage::SessionStarted {
                    session_id: session.id.clone(),
                    first_side,
                    state: duel.view_for(seat.side),
                },
            )
        })
        .collect();

    session.duel = Some(duel);
    session.lifecycle = Lifecycle::Active;
    log::info!("session {} started, side {first_side} moves first", session.id);
    outbound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{DuelOutcome, GameEvent, ZoneView};
    use crate::game::state::test_support::unit;

    fn warrior_deck() -> Vec<CardId> {
        catalog()
            .preset_deck("warrior")
            .expect("warrior preset")
            .to_vec()
    }

    fn join(session_id: &str, name: &str) -> ClientMessage {
        ClientMessage::JoinSession {
            session_id: session_id.to_string(),
            display_name: name.to_string(),
            deck: warrior_deck(),
        }
    }

    fn started() -> (SessionRegistry, SessionId) {
        let mut registry =
            SessionRegistry::with_engine(DuelConfig::default(), RuleEngine::with_seed(17));
        let session_id = registry.create_session();
        registry.dispatch("p1", join(&session_id, "Alice"), 0);
        registry.dispatch("p2", join(&session_id, "Bob"), 0);
        (registry, session_id)
    }

    fn seat_to_move(registry: &SessionRegistry, session_id: &str) -> (&'static str, &'static str) {
        let duel = registry
            .session(session_id)
            .and_then(|session| session.duel.as_ref())
            .expect("duel running");
        if duel.active_side == 0 {
            ("p1", "p2")
        } else {
            ("p2", "p1")
        }
    }

    #[test]
    fn second_join_starts_the_duel_with_redacted_views() {
        let mut registry = SessionRegistry::new(DuelConfig::default());
        let session_id = registry.create_session();

        let first = registry.dispatch("p1", join(&session_id, "Alice"), 0);
        assert_eq!(
            first,
            vec![Outbound::to(
                "p1",
                ServerMessage::SessionJoined {
                    session_id: session_id.clone(),
                    side: 0
                }
            )]
        );

        let second = registry.dispatch("p2", join(&session_id, "Bob"), 0);
        assert_eq!(second.len(), 3);
        let session = registry.session(&session_id).expect("session exists");
        assert_eq!(session.lifecycle, Lifecycle::Active);

        for outbound in &second[1..] {
            let ServerMessage::SessionStarted { state, .. } = &outbound.message else {
                panic!("expected a start message, got {:?}", outbound.message);
            };
            let viewer = usize::from(state.viewer);
            let other = 1 - viewer;
            assert!(matches!(state.sides[viewer].hand, ZoneView::Revealed { .. }));
            assert!(matches!(state.sides[other].hand, ZoneView::Hidden { .. }));
            assert!(matches!(state.sides[other].deck, ZoneView::Hidden { .. }));
        }
    }

    #[test]
    fn join_errors_are_reported_to_the_sender_only() {
        let (mut registry, session_id) = started();

        let full = registry.dispatch("p3", join(&session_id, "Eve"), 0);
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].recipient, "p3");
        assert!(matches!(
            &full[0].message,
            ServerMessage::ActionRejected { kind, .. } if kind == "SessionFull"
        ));

        let missing = registry.dispatch("p3", join("nope", "Eve"), 0);
        assert!(matches!(
            &missing[0].message,
            ServerMessage::ActionRejected { kind, .. } if kind == "SessionNotFound"
        ));
    }

    #[test]
    fn unknown_card_keeps_the_seat_open() {
        let mut registry = SessionRegistry::new(DuelConfig::default());
        let session_id = registry.create_session();
        let bad = ClientMessage::JoinSession {
            session_id: session_id.clone(),
            display_name: "Mallory".into(),
            deck: vec!["basic_minion_1".into(), "forged_card".into()],
        };

        let replies = registry.dispatch("p1", bad, 0);
        assert!(matches!(
            &replies[0].message,
            ServerMessage::ActionRejected { kind, .. } if kind == "UnknownCard"
        ));
        let session = registry.session(&session_id).expect("session exists");
        assert!(session.participants.is_empty());
        assert!(registry.session_of("p1").is_none());
    }

    #[test]
    fn out_of_turn_action_is_rejected_without_touching_the_duel() {
        let (mut registry, session_id) = started();
        let (_, waiting) = seat_to_move(&registry, &session_id);
        let before = registry
            .session(&session_id)
            .and_then(|session| session.duel.clone());

        let replies = registry.dispatch(
            waiting,
            ClientMessage::EndTurn {
                session_id: session_id.clone(),
            },
            10,
        );

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].recipient, waiting);
        assert!(matches!(
            &replies[0].message,
            ServerMessage::ActionRejected { kind, .. } if kind == "IllegalAction"
        ));
        let after = registry
            .session(&session_id)
            .and_then(|session| session.duel.clone());
        assert_eq!(before, after);
    }

    #[test]
    fn end_turn_broadcasts_and_hides_the_opponents_draw() {
        let (mut registry, session_id) = started();
        let (mover, waiting) = seat_to_move(&registry, &session_id);

        let replies = registry.dispatch(
            mover,
            ClientMessage::EndTurn {
                session_id: session_id.clone(),
            },
            10,
        );
        assert_eq!(replies.len(), 2);

        let drawn_by = |recipient: &str| -> usize {
            let reply = replies
                .iter()
                .find(|outbound| outbound.recipient == recipient)
                .expect("both seats are updated");
            let ServerMessage::StateUpdated { events, .. } = &reply.message else {
                panic!("expected a state update");
            };
            events
                .iter()
                .filter(|event| matches!(event, GameEvent::CardDrawn { .. }))
                .count()
        };
        assert_eq!(drawn_by(waiting), 1, "the new active side sees its draw");
        assert_eq!(drawn_by(mover), 0);
    }

    #[test]
    fn lethal_attack_ends_the_session_and_names_the_winner() {
        let (mut registry, session_id) = started();
        let (mover, _) = seat_to_move(&registry, &session_id);
        {
            let duel = registry
                .sessions
                .get_mut(&session_id)
                .and_then(|session| session.duel.as_mut())
                .expect("duel running");
            let active = duel.active_side;
            let defender = duel.opponent_of(active);
            duel.side_mut(defender).hero.health = 2;
            duel.side_mut(defender).board.clear();
            let mut striker = unit("striker", 3, 3);
            striker.uid = duel.allocate_unit_id();
            duel.side_mut(active).board.push(striker);
        }

        let replies = registry.dispatch(
            mover,
            ClientMessage::Attack {
                session_id: session_id.clone(),
                attacker_index: 0,
                target: TargetRef::Hero,
            },
            500,
        );

        let ended: Vec<&Outbound> = replies
            .iter()
            .filter(|outbound| matches!(outbound.message, ServerMessage::SessionEnded { .. }))
            .collect();
        assert_eq!(ended.len(), 2);
        let session = registry.session(&session_id).expect("kept until purge");
        assert_eq!(session.lifecycle, Lifecycle::Ended);
        assert_eq!(session.ended_at, Some(500));
        let winner = session
            .duel
            .as_ref()
            .and_then(|duel| duel.outcome)
            .and_then(|outcome| outcome.winner());
        let mover_side = session.participant(mover).map(|seat| seat.side);
        assert_eq!(winner, mover_side);

        let again = registry.dispatch(mover, ClientMessage::EndTurn { session_id }, 600);
        assert!(matches!(
            &again[0].message,
            ServerMessage::ActionRejected { kind, .. } if kind == "IllegalAction"
        ));
    }

    #[test]
    fn disconnect_forfeits_and_the_session_is_purged_after_the_grace_period() {
        let (mut registry, session_id) = started();

        let replies = registry.disconnect("p1", 1_000);
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|outbound| outbound.recipient == "p2"));
        assert!(replies.iter().any(|outbound| matches!(
            outbound.message,
            ServerMessage::SessionEnded {
                outcome: Some(DuelOutcome::Winner { side: 1 }),
                winner: Some(1),
                ..
            }
        )));
        assert!(registry.disconnect("p1", 1_001).is_empty());

        assert!(registry.sweep(1_000 + 59_999).is_empty());
        assert_eq!(registry.sweep(1_000 + 60_000), vec![session_id.clone()]);
        assert!(registry.session(&session_id).is_none());
        assert!(registry.session_of("p2").is_none());
    }

    #[test]
    fn leaving_a_waiting_session_ends_it_without_a_winner() {
        let mut registry = SessionRegistry::new(DuelConfig::default());
        let session_id = registry.create_session();
        registry.dispatch("p1", join(&session_id, "Alice"), 0);

        assert!(registry.disconnect("p1", 5).is_empty());
        let session = registry.session(&session_id).expect("kept until purge");
        assert_eq!(session.lifecycle, Lifecycle::Ended);
        assert!(session.duel.is_none());

        let late = registry.dispatch("p2", join(&session_id, "Bob"), 6);
        assert!(matches!(
            &late[0].message,
            ServerMessage::ActionRejected { kind, .. } if kind == "SessionFull"
        ));
    }

    #[test]
    fn create_message_returns_a_fresh_identifier() {
        let mut registry = SessionRegistry::new(DuelConfig::default());
        let replies = registry.dispatch("p1", ClientMessage::CreateSession, 0);
        let ServerMessage::SessionCreated { session_id } = &replies[0].message else {
            panic!("expected a created message");
        };
        assert!(registry.session(session_id).is_some());
        assert_eq!(Uuid::parse_str(session_id).map(|id| id.get_version_num()).ok(), Some(4));
    }
}
