use serde::{Deserialize, Serialize};

use crate::game::{CardId, DuelOutcome, DuelView, GameEvent, RuleError, SideId, TargetRef};

pub type SessionId = String;
/// 传输层分配的连接标识。
pub type ParticipantId = String;

/// 客户端请求，每个行动一条。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateSession,
    JoinSession {
        session_id: SessionId,
        display_name: String,
        deck: Vec<CardId>,
    },
    PlayCard {
        session_id: SessionId,
        hand_index: usize,
        #[serde(default)]
        target: Option<TargetRef>,
    },
    Attack {
        session_id: SessionId,
        attacker_index: usize,
        target: TargetRef,
    },
    EndTurn {
        session_id: SessionId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionCreated {
        session_id: SessionId,
    },
    SessionJoined {
        session_id: SessionId,
        side: SideId,
    },
    SessionStarted {
        session_id: SessionId,
        first_side: SideId,
        state: DuelView,
    },
    StateUpdated {
        session_id: SessionId,
        state: DuelView,
        events: Vec<GameEvent>,
    },
    ParticipantLeft {
        session_id: SessionId,
        side: SideId,
    },
    SessionEnded {
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<DuelOutcome>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<SideId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<DuelView>,
    },
    ActionRejected {
        kind: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn rejected(error: &RuleError) -> Self {
        ServerMessage::ActionRejected {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// 发给单个参与者的消息。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outbound {
    pub recipient: ParticipantId,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn to(recipient: &str, message: ServerMessage) -> Self {
        Self {
            recipient: recipient.to_string(),
            message,
        }
    }
}
